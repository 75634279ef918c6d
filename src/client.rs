//! The cluster RPC client and its resilient call engine.
//!
//! [`Client`] is the main entry point. Every call goes through one engine
//! that obtains a session (logging in on demand), injects it as the first
//! parameter, follows master redirects, retries transient failures with
//! Fibonacci backoff, and renews the session when the server rejects it.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::backoff::{Backoff, BackoffConfig};
use crate::endpoint::Endpoint;
use crate::envelope;
use crate::error::{Error, Result};
use crate::session::{SessionGate, SessionManager};
use crate::transport::{HttpTransport, Transport, TransportFactory};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

const LOGIN_METHOD: &str = "session.login_with_password";

/// A resilient client for a session-authenticated cluster API.
///
/// The client is cheap to clone and safe to share; all clones route through
/// the same connection, session and login gate. Construction performs no
/// I/O: the first call (or an explicit [`Client::connect`]) logs in.
///
/// What a call survives without the caller noticing:
///
/// * no session yet, or a session the server has expired
/// * the contacted host having lost a master election
/// * connection resets, refusals and unreachable hosts
/// * hosts that are still booting
///
/// # Examples
///
/// ```no_run
/// use limpet::Client;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), limpet::Error> {
/// let client = Client::builder()
///     .host("pool-master.example")
///     .credentials("root", "secret")
///     .build()?;
///
/// let vms = client.call("VM.get_all_records", vec![]).await?;
/// println!("{vms:#}");
///
/// let started = client
///     .call("VM.start", vec![json!("OpaqueRef:1"), json!(false), json!(false)])
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    connection: RwLock<Connection>,
    sessions: SessionManager,
    factory: Box<dyn TransportFactory>,
    backoff: BackoffConfig,
}

struct Connection {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    generation: u64,
}

/// A method call frozen at submission time. Replays reuse these exact
/// params, so the session a call was issued under never changes mid-flight.
struct PendingCall {
    method: String,
    params: Vec<Value>,
}

impl PendingCall {
    fn new(method: &str, params: Vec<Value>) -> Self {
        PendingCall {
            method: method.to_string(),
            params,
        }
    }

    fn with_session(method: &str, session: &str, args: &[Value]) -> Self {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(Value::String(session.to_string()));
        params.extend_from_slice(args);
        PendingCall {
            method: method.to_string(),
            params,
        }
    }
}

impl Client {
    /// Creates a new [`ClientBuilder`] for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The endpoint calls are currently routed to.
    ///
    /// Starts as the configured host and follows master redirects as the
    /// client learns about them.
    pub fn endpoint(&self) -> Endpoint {
        self.inner.connection.read().endpoint.clone()
    }

    /// Logs in eagerly instead of waiting for the first call.
    ///
    /// Useful to surface bad credentials or an unreachable pool at startup.
    /// Calling it is optional and calling it twice is harmless; a cached
    /// session is reused.
    pub async fn connect(&self) -> Result<()> {
        let mut backoff = Backoff::new(self.inner.backoff);
        self.obtain_session(&mut backoff).await?;
        Ok(())
    }

    /// Invokes `method` with the current session injected as the first
    /// parameter.
    ///
    /// The engine logs in when no session exists, replays the call after a
    /// session rejection or master redirect, and retries transient failures
    /// with Fibonacci backoff. Retries share one budget per `call`
    /// invocation, re-armed by any success along the way; when the budget
    /// runs out, the error that surfaces is the one from the final attempt,
    /// not a synthetic retry wrapper.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use limpet::Client;
    /// use serde_json::json;
    ///
    /// # async fn example() -> Result<(), limpet::Error> {
    /// # let client = Client::builder().host("h").build()?;
    /// let host = client.call("pool.get_master", vec![]).await?;
    /// let record = client.call("host.get_record", vec![host]).await?;
    /// println!("master: {}", record["hostname"]);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let mut backoff = Backoff::new(self.inner.backoff);
        loop {
            let session = self.obtain_session(&mut backoff).await?;
            let call = PendingCall::with_session(method, &session, &args);
            match self.invoke_with_retry(&call, &mut backoff).await {
                Err(error) if error.is_session_invalid() => {
                    tracing::info!(method, "Session rejected, renewing and replaying");
                    self.inner.sessions.invalidate(&session);
                }
                outcome => return outcome,
            }
        }
    }

    /// Like [`Client::call`], but deserializes the result into `T`.
    ///
    /// On a shape mismatch the raw result is preserved in
    /// [`Error::Deserialize`] for debugging.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use limpet::Client;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct PoolPatch {
    ///     uuid: String,
    ///     name_label: String,
    /// }
    ///
    /// # async fn example() -> Result<(), limpet::Error> {
    /// # let client = Client::builder().host("h").build()?;
    /// let patches: Vec<PoolPatch> = client.call_as("pool_patch.get_all", vec![]).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call_as<T>(&self, method: &str, args: Vec<Value>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let value = self.call(method, args).await?;
        match T::deserialize(&value) {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::error!(
                    method,
                    error = %e,
                    "Failed to deserialize call result"
                );
                Err(Error::Deserialize {
                    raw_value: value.to_string(),
                    serde_error: e.to_string(),
                })
            }
        }
    }

    /// Returns a usable session, logging in if nobody has yet.
    ///
    /// Only one login runs at a time; every other caller waits on its
    /// outcome. A login failure therefore reaches all of them at once.
    async fn obtain_session(&self, backoff: &mut Backoff) -> Result<String> {
        loop {
            match self.inner.sessions.gate() {
                SessionGate::Ready(session) => return Ok(session),
                SessionGate::Wait(mut rx) => match rx.recv().await {
                    Ok(outcome) => return outcome,
                    // The leader went away without an outcome; take another
                    // turn through the gate.
                    Err(_) => continue,
                },
                SessionGate::Lead(lead) => {
                    let outcome = self.login(backoff).await;
                    lead.finish(&outcome);
                    return outcome;
                }
            }
        }
    }

    /// Runs the login call. It goes through the same invoke path as any
    /// other call, so redirects and transient network failures are handled,
    /// while a rejection of the credentials comes back as a plain fatal
    /// error.
    async fn login(&self, backoff: &mut Backoff) -> Result<String> {
        let (username, password) = self.inner.sessions.credentials();
        tracing::info!(username, "Logging in");

        let call = PendingCall::new(
            LOGIN_METHOD,
            vec![
                Value::String(username.to_string()),
                Value::String(password.to_string()),
            ],
        );
        match self.invoke_with_retry(&call, backoff).await? {
            Value::String(session) => Ok(session),
            other => Err(Error::MalformedResponse(format!(
                "login returned a non-string session handle: {other}"
            ))),
        }
    }

    /// One call against whatever endpoint is current, looping on redirects
    /// and transient failures until the response is terminal or the backoff
    /// budget runs out.
    async fn invoke_with_retry(&self, call: &PendingCall, backoff: &mut Backoff) -> Result<Value> {
        loop {
            let (transport, generation) = self.connection_snapshot();

            let outcome = match transport.invoke(&call.method, &call.params).await {
                Ok(raw) => envelope::unwrap_response(raw),
                Err(error) => Err(error),
            };

            match outcome {
                Ok(value) => {
                    backoff.reset();
                    return Ok(value);
                }
                Err(error) => {
                    if let Some(master) = error.redirect_target() {
                        tracing::info!(
                            method = %call.method,
                            master,
                            "Contacted host is not the master, following redirect"
                        );
                        self.follow_redirect(master, generation)?;
                        continue;
                    }
                    if error.is_transient() {
                        tracing::warn!(
                            method = %call.method,
                            error = %error,
                            "Call failed, backing off"
                        );
                        backoff.backoff(error).await?;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    fn connection_snapshot(&self) -> (Arc<dyn Transport>, u64) {
        let connection = self.inner.connection.read();
        (Arc::clone(&connection.transport), connection.generation)
    }

    /// Points the connection at `master`. Concurrent calls that observed
    /// the same redirect collapse into one rebuild: whoever writes first
    /// bumps the generation, and everyone holding a stale snapshot simply
    /// retries against the rebuilt connection.
    ///
    /// The session is left untouched; pool members honor sessions issued by
    /// their peers.
    fn follow_redirect(&self, master: &str, seen_generation: u64) -> Result<()> {
        let mut connection = self.inner.connection.write();
        if connection.generation != seen_generation {
            tracing::debug!(master, "Connection already rebuilt, retrying against it");
            return Ok(());
        }

        let target = Endpoint::parse(master, connection.endpoint.tls_insecure)?;
        tracing::info!(
            from = %connection.endpoint,
            to = %target,
            "Reconnecting to the reported master"
        );
        connection.transport = self.inner.factory.create(&target)?;
        connection.endpoint = target;
        connection.generation += 1;
        Ok(())
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use limpet::{BackoffConfig, ClientBuilder};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), limpet::Error> {
/// let client = ClientBuilder::new()
///     .host("10.1.2.3:8443")
///     .credentials("root", "secret")
///     .backoff(BackoffConfig {
///         max_attempts: 5,
///         max_delay: Duration::from_secs(2),
///         ..BackoffConfig::default()
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    host: Option<String>,
    username: String,
    password: String,
    backoff: BackoffConfig,
    tls_insecure: bool,
    factory: Option<Box<dyn TransportFactory>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            host: None,
            username: String::new(),
            password: String::new(),
            backoff: BackoffConfig::default(),
            tls_insecure: true,
            factory: None,
        }
    }

    /// Sets the cluster member to contact first. Accepts `host`,
    /// `host:port` or a full `https://` URL; the port defaults to 443.
    ///
    /// Required. If the host turns out to be a replica, the client follows
    /// its redirect to the master on the first call.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the credentials used to open sessions.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Replaces the default backoff schedule.
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = config;
        self
    }

    /// Controls whether TLS certificate verification is skipped.
    ///
    /// Defaults to `true` (verification skipped): cluster members typically
    /// serve self-signed certificates. Pass `false` to require valid
    /// certificates.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.tls_insecure = accept;
        self
    }

    /// Replaces the wire layer.
    ///
    /// The factory is invoked at build time for the configured host and
    /// again for every master redirect. The default factory creates an
    /// [`HttpTransport`] per endpoint.
    pub fn transport<F>(mut self, factory: F) -> Self
    where
        F: TransportFactory + 'static,
    {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Builds the configured [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an error if no host was provided, if the host string cannot
    /// be parsed, or if the transport cannot be constructed.
    pub fn build(self) -> Result<Client> {
        let host = self
            .host
            .ok_or_else(|| Error::Configuration("Host is required".to_string()))?;
        let endpoint = Endpoint::parse(&host, self.tls_insecure)?;

        let factory: Box<dyn TransportFactory> = self.factory.unwrap_or_else(|| {
            Box::new(|endpoint: &Endpoint| {
                Ok(Arc::new(HttpTransport::new(endpoint)?) as Arc<dyn Transport>)
            })
        });

        let transport = factory.create(&endpoint)?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                connection: RwLock::new(Connection {
                    endpoint,
                    transport,
                    generation: 0,
                }),
                sessions: SessionManager::new(self.username, self.password),
                factory,
                backoff: self.backoff,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
