#![allow(dead_code)]

//! A scripted in-memory cluster for exercising the call engine without a
//! network.
//!
//! Each [`FakeHost`] is a [`Transport`] that answers from per-method reply
//! queues. Session handling mimics the real thing: hosts share one session
//! registry (pool members honor sessions issued by their peers), logins are
//! answered automatically unless a test scripts them, and a call bearing an
//! expired session gets a `SESSION_INVALID` failure without consuming the
//! scripted reply.

use async_trait::async_trait;
use limpet::{BackoffConfig, Client, Endpoint, Error, Result, Transport, TransportCode, TransportError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const LOGIN: &str = "session.login_with_password";

/// One scripted reply, consumed in FIFO order per method.
pub struct Step {
    delay: Duration,
    reply: Reply,
}

enum Reply {
    /// Success envelope around the value.
    Value(Value),
    /// Raw body returned without an envelope.
    Plain(Value),
    /// Failure envelope with the given description.
    Fail(Vec<String>),
    /// Transport-level failure.
    Refuse(TransportCode),
}

impl Step {
    pub fn value(value: Value) -> Self {
        Step {
            delay: Duration::ZERO,
            reply: Reply::Value(value),
        }
    }

    pub fn plain(value: Value) -> Self {
        Step {
            delay: Duration::ZERO,
            reply: Reply::Plain(value),
        }
    }

    pub fn fail(description: &[&str]) -> Self {
        Step {
            delay: Duration::ZERO,
            reply: Reply::Fail(description.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn refuse(code: TransportCode) -> Self {
        Step {
            delay: Duration::ZERO,
            reply: Reply::Refuse(code),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Sessions are pool-wide, not per-host.
pub struct SessionRegistry {
    counter: AtomicUsize,
    valid: Mutex<HashSet<String>>,
}

impl SessionRegistry {
    fn new() -> Self {
        SessionRegistry {
            counter: AtomicUsize::new(0),
            valid: Mutex::new(HashSet::new()),
        }
    }

    fn issue(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let session = format!("session-{n}");
        self.valid.lock().insert(session.clone());
        session
    }

    fn register(&self, session: &str) {
        self.valid.lock().insert(session.to_string());
    }

    fn is_valid(&self, session: &str) -> bool {
        self.valid.lock().contains(session)
    }

    pub fn expire_all(&self) {
        self.valid.lock().clear();
    }
}

#[derive(Clone, Debug)]
pub struct Invocation {
    pub method: String,
    pub params: Vec<Value>,
    pub at: Instant,
}

pub struct FakeHost {
    name: String,
    registry: Arc<SessionRegistry>,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    invocations: Mutex<Vec<Invocation>>,
    login_delay: Mutex<Duration>,
    login_count: AtomicUsize,
    logins_in_flight: AtomicUsize,
    max_logins_in_flight: AtomicUsize,
}

impl FakeHost {
    fn new(name: &str, registry: Arc<SessionRegistry>) -> Arc<Self> {
        Arc::new(FakeHost {
            name: name.to_string(),
            registry,
            scripts: Mutex::new(HashMap::new()),
            invocations: Mutex::new(Vec::new()),
            login_delay: Mutex::new(Duration::ZERO),
            login_count: AtomicUsize::new(0),
            logins_in_flight: AtomicUsize::new(0),
            max_logins_in_flight: AtomicUsize::new(0),
        })
    }

    /// Appends replies to the method's queue.
    pub fn script(&self, method: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .entry(method.to_string())
            .or_default()
            .extend(steps);
    }

    /// Makes automatic login replies take this long.
    pub fn delay_logins(&self, delay: Duration) {
        *self.login_delay.lock() = delay;
    }

    pub fn login_count(&self) -> usize {
        self.login_count.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_logins(&self) -> usize {
        self.max_logins_in_flight.load(Ordering::SeqCst)
    }

    pub fn invocations_of(&self, method: &str) -> Vec<Invocation> {
        self.invocations
            .lock()
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    pub fn invocation_count(&self, method: &str) -> usize {
        self.invocations_of(method).len()
    }

    async fn respond(&self, method: &str, params: &[Value]) -> Result<Value> {
        self.invocations.lock().push(Invocation {
            method: method.to_string(),
            params: params.to_vec(),
            at: Instant::now(),
        });

        let is_login = method == LOGIN;
        if is_login {
            self.login_count.fetch_add(1, Ordering::SeqCst);
            let in_flight = self.logins_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_logins_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        } else {
            // Session enforcement: a call under an expired session fails with
            // SESSION_INVALID without consuming the scripted reply.
            let session = params.first().and_then(Value::as_str).unwrap_or_default();
            if !self.registry.is_valid(session) {
                return Ok(json!({
                    "Status": "Failure",
                    "ErrorDescription": ["SESSION_INVALID", session]
                }));
            }
        }

        let step = self
            .scripts
            .lock()
            .get_mut(method)
            .and_then(VecDeque::pop_front);

        let result = match step {
            Some(step) => {
                if !step.delay.is_zero() {
                    tokio::time::sleep(step.delay).await;
                }
                match step.reply {
                    Reply::Value(value) => {
                        // A scripted login success must mint a session the
                        // rest of the pool accepts.
                        if is_login {
                            if let Value::String(session) = &value {
                                self.registry.register(session);
                            }
                        }
                        Ok(json!({"Status": "Success", "Value": value}))
                    }
                    Reply::Plain(value) => Ok(value),
                    Reply::Fail(description) => Ok(json!({
                        "Status": "Failure",
                        "ErrorDescription": description
                    })),
                    Reply::Refuse(code) => Err(Error::Transport(TransportError::new(
                        code,
                        format!("{} refused {method}", self.name),
                    ))),
                }
            }
            None if is_login => {
                let delay = *self.login_delay.lock();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(json!({"Status": "Success", "Value": self.registry.issue()}))
            }
            None => panic!("no scripted reply for {method:?} on host {:?}", self.name),
        };

        if is_login {
            self.logins_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }
}

#[async_trait]
impl Transport for FakeHost {
    async fn invoke(&self, method: &str, params: &[Value]) -> Result<Value> {
        self.respond(method, params).await
    }
}

pub struct FakeCluster {
    registry: Arc<SessionRegistry>,
    hosts: Mutex<HashMap<String, Arc<FakeHost>>>,
    creations: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeCluster {
            registry: Arc::new(SessionRegistry::new()),
            hosts: Mutex::new(HashMap::new()),
            creations: Mutex::new(Vec::new()),
        })
    }

    /// Returns the named host, creating it on first use.
    pub fn host(&self, name: &str) -> Arc<FakeHost> {
        let mut hosts = self.hosts.lock();
        if let Some(host) = hosts.get(name) {
            return Arc::clone(host);
        }
        let host = FakeHost::new(name, Arc::clone(&self.registry));
        hosts.insert(name.to_string(), Arc::clone(&host));
        host
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.registry
    }

    /// How many transports the client built for this host.
    pub fn creations_of(&self, name: &str) -> usize {
        self.creations
            .lock()
            .iter()
            .filter(|host| host.as_str() == name)
            .count()
    }

    pub fn factory(
        self: &Arc<Self>,
    ) -> impl Fn(&Endpoint) -> Result<Arc<dyn Transport>> + Send + Sync + 'static {
        let cluster = Arc::clone(self);
        move |endpoint: &Endpoint| -> Result<Arc<dyn Transport>> {
            cluster.creations.lock().push(endpoint.host.clone());
            let host: Arc<dyn Transport> = cluster.host(&endpoint.host);
            Ok(host)
        }
    }
}

pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        max_attempts: 10,
        jitter: false,
    }
}

pub fn client(cluster: &Arc<FakeCluster>, host: &str) -> Client {
    client_with(cluster, host, fast_backoff())
}

pub fn client_with(cluster: &Arc<FakeCluster>, host: &str, backoff: BackoffConfig) -> Client {
    Client::builder()
        .host(host)
        .credentials("root", "secret")
        .backoff(backoff)
        .transport(cluster.factory())
        .build()
        .unwrap()
}
