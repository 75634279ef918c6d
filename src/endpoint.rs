//! Parsing and display of cluster host addresses.

use crate::error::{Error, Result};
use std::fmt;
use url::Url;

/// The resolved address of one cluster member.
///
/// An endpoint is where the wire layer points its requests. Redirects swap
/// the whole endpoint for a new one; the TLS relaxation flag survives the
/// swap because it is a property of the deployment, not of a single host.
///
/// # Examples
///
/// ```
/// use limpet::Endpoint;
///
/// let ep = Endpoint::parse("pool-a.example", false).unwrap();
/// assert_eq!(ep.host, "pool-a.example");
/// assert_eq!(ep.port, 443);
///
/// let ep = Endpoint::parse("10.1.2.3:8443", false).unwrap();
/// assert_eq!(ep.port, 8443);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address, without port.
    pub host: String,
    /// TCP port, defaulting to [`Endpoint::DEFAULT_PORT`].
    pub port: u16,
    /// Whether the wire layer should skip TLS certificate verification.
    pub tls_insecure: bool,
}

impl Endpoint {
    /// Port assumed when the host string does not name one.
    pub const DEFAULT_PORT: u16 = 443;

    /// Parses a host string into an endpoint.
    ///
    /// Accepts a bare host (`"pool-a.example"`), a host with port
    /// (`"pool-a.example:8443"`), or a full `https://` URL. Anything beyond
    /// the authority (path, query) is ignored. Schemes other than `https`
    /// are rejected.
    pub fn parse(input: &str, tls_insecure: bool) -> Result<Self> {
        let candidate = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{input}")
        };

        let url = Url::parse(&candidate).map_err(|e| Error::InvalidHost {
            host: input.to_string(),
            reason: e.to_string(),
        })?;

        if url.scheme() != "https" {
            return Err(Error::InvalidHost {
                host: input.to_string(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }

        let host = url.host_str().ok_or_else(|| Error::InvalidHost {
            host: input.to_string(),
            reason: "missing host".to_string(),
        })?;

        Ok(Endpoint {
            host: host.to_string(),
            port: url.port().unwrap_or(Self::DEFAULT_PORT),
            tls_insecure,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
