//! The pluggable wire layer.
//!
//! [`Transport`] is the seam between the call engine and the network: one
//! async method that ships `{method, params}` to the current endpoint and
//! hands back the raw JSON reply, envelope and all. The bundled
//! [`HttpTransport`] speaks JSON-RPC over HTTPS via reqwest. Tests and
//! embedders can substitute their own wire layer through
//! [`TransportFactory`].

use crate::endpoint::Endpoint;
use crate::error::{Error, Result, TransportCode, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const RPC_PATH: &str = "/jsonrpc";

/// A connection to one cluster member.
///
/// Implementations ship a method call and return the raw response value
/// without interpreting it; envelope unwrapping and retry decisions happen
/// above this layer. Network-level failures must be reported as
/// [`Error::Transport`] with the most precise [`TransportCode`] available,
/// since that classification drives retry behavior.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use limpet::{Result, Transport};
/// use serde_json::{json, Value};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Transport for Echo {
///     async fn invoke(&self, method: &str, _params: &[Value]) -> Result<Value> {
///         Ok(json!({ "Status": "Success", "Value": method }))
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one method call and returns the raw response value.
    async fn invoke(&self, method: &str, params: &[Value]) -> Result<Value>;
}

/// Builds a [`Transport`] for an endpoint.
///
/// The client calls this once at construction and again on every master
/// redirect, so the factory is the single place deciding how the crate
/// reaches the network. Any `Fn(&Endpoint) -> Result<Arc<dyn Transport>>`
/// qualifies.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use limpet::{Client, Endpoint, HttpTransport, Transport};
///
/// # fn main() -> Result<(), limpet::Error> {
/// let client = Client::builder()
///     .host("pool-a.example")
///     .credentials("root", "secret")
///     .transport(|endpoint: &Endpoint| {
///         Ok(Arc::new(HttpTransport::new(endpoint)?) as Arc<dyn Transport>)
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub trait TransportFactory: Send + Sync {
    /// Creates a transport pointed at `endpoint`.
    fn create(&self, endpoint: &Endpoint) -> Result<Arc<dyn Transport>>;
}

impl<F> TransportFactory for F
where
    F: Fn(&Endpoint) -> Result<Arc<dyn Transport>> + Send + Sync,
{
    fn create(&self, endpoint: &Endpoint) -> Result<Arc<dyn Transport>> {
        self(endpoint)
    }
}

/// JSON-RPC over HTTPS, the default wire layer.
///
/// Requests are POSTed to `/jsonrpc` as `{"method": ..., "params": [...]}`
/// and the response body is returned as-is for the layers above to unwrap.
#[derive(Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    url: reqwest::Url,
}

impl HttpTransport {
    /// Creates a transport for a cluster endpoint.
    ///
    /// Certificate verification is skipped when the endpoint carries
    /// [`Endpoint::tls_insecure`]; pool members commonly serve self-signed
    /// certificates.
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(endpoint.tls_insecure)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {e}")))?;

        let url = reqwest::Url::parse(&format!(
            "https://{}:{}{}",
            endpoint.host, endpoint.port, RPC_PATH
        ))
        .map_err(|e| Error::InvalidHost {
            host: endpoint.host.clone(),
            reason: e.to_string(),
        })?;

        Ok(HttpTransport { http, url })
    }

    /// Creates a transport for an explicit base URL.
    ///
    /// Useful when the RPC endpoint sits behind a reverse proxy or tunnel
    /// and cannot be derived from a host name. A URL without a path gets the
    /// default `/jsonrpc`; an explicit path is kept.
    pub fn with_base_url(url: impl AsRef<str>) -> Result<Self> {
        let mut url = reqwest::Url::parse(url.as_ref()).map_err(|e| Error::InvalidHost {
            host: url.as_ref().to_string(),
            reason: e.to_string(),
        })?;
        if url.path() == "/" || url.path().is_empty() {
            url.set_path(RPC_PATH);
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(HttpTransport { http, url })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(&self, method: &str, params: &[Value]) -> Result<Value> {
        let body = serde_json::json!({ "method": method, "params": params });

        tracing::debug!(method, url = %self.url, "Sending RPC request");

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let raw_response = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                response = %raw_response,
                "RPC endpoint answered with an HTTP error"
            );
            return Err(TransportError::new(
                TransportCode::Other,
                format!("unexpected HTTP status {status}: {raw_response}"),
            )
            .into());
        }

        response.json::<Value>().await.map_err(classify)
    }
}

/// Maps a reqwest failure onto a [`TransportCode`].
///
/// The interesting codes live on the `std::io::Error` buried in the source
/// chain, so this walks the chain until it finds one.
fn classify(error: reqwest::Error) -> Error {
    let code = if error.is_timeout() {
        TransportCode::Timeout
    } else {
        io_error_code(&error).unwrap_or(TransportCode::Other)
    };
    TransportError::new(code, describe(&error)).into()
}

fn io_error_code(error: &reqwest::Error) -> Option<TransportCode> {
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return match io.kind() {
                std::io::ErrorKind::ConnectionReset => Some(TransportCode::ConnectionReset),
                std::io::ErrorKind::ConnectionRefused => Some(TransportCode::ConnectionRefused),
                std::io::ErrorKind::HostUnreachable => Some(TransportCode::HostUnreachable),
                std::io::ErrorKind::TimedOut => Some(TransportCode::Timeout),
                _ => None,
            };
        }
        source = cause.source();
    }
    None
}

/// Flattens an error and its source chain into one message, since the chain
/// cannot be carried across a `Clone`.
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
