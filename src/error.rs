//! Error types for cluster RPC calls.
//!
//! Every failure a call can hit is folded into [`Error`], together with the
//! classification helpers the retry engine relies on: [`Error::is_transient`],
//! [`Error::is_session_invalid`] and [`Error::redirect_target`]. Errors are
//! `Clone` so a single login outcome can be fanned out to every caller that
//! was waiting on it.

use std::fmt;

/// Well-known server error codes, as carried in the first element of a
/// failure envelope's `ErrorDescription` array.
pub mod codes {
    /// The session handle was rejected and a fresh login is required.
    pub const SESSION_INVALID: &str = "SESSION_INVALID";
    /// The addressed host is a replica; the first error parameter names the
    /// current master.
    pub const HOST_IS_SLAVE: &str = "HOST_IS_SLAVE";
    /// The host has not finished booting and cannot serve calls yet.
    pub const HOST_STILL_BOOTING: &str = "HOST_STILL_BOOTING";
    /// The host has no management interface configured yet.
    pub const HOST_HAS_NO_MANAGEMENT_IP: &str = "HOST_HAS_NO_MANAGEMENT_IP";
}

/// Coarse classification of a network-level failure.
///
/// The wire layer maps whatever its HTTP stack reports onto these codes so
/// the retry engine can make decisions without inspecting backend-specific
/// error types. Connection-level codes (`ConnectionReset`,
/// `ConnectionRefused`, `HostUnreachable`) are the ones treated as transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCode {
    /// The peer reset an established connection.
    ConnectionReset,
    /// The peer actively refused the connection.
    ConnectionRefused,
    /// No route to the host.
    HostUnreachable,
    /// The request timed out.
    Timeout,
    /// Any other network or protocol failure. Details live in the
    /// accompanying [`TransportError::message`].
    Other,
}

impl TransportCode {
    /// Returns the errno-style name for this code (`"ECONNRESET"` and
    /// friends). [`TransportCode::Other`] renders as `"EUNKNOWN"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportCode::ConnectionReset => "ECONNRESET",
            TransportCode::ConnectionRefused => "ECONNREFUSED",
            TransportCode::HostUnreachable => "EHOSTUNREACH",
            TransportCode::Timeout => "ETIMEDOUT",
            TransportCode::Other => "EUNKNOWN",
        }
    }
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network-level failure, classified and stripped down to what the retry
/// engine and callers need.
///
/// The originating backend error is flattened into `message` rather than kept
/// as a source, so the value stays `Clone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// Classification used by [`Error::is_transient`].
    pub code: TransportCode,
    /// Human-readable description of the underlying failure.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error from a code and message.
    pub fn new(code: TransportCode, message: impl Into<String>) -> Self {
        TransportError {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for TransportError {}

/// A failure reported by the server inside a response envelope.
///
/// The envelope carries a non-empty `ErrorDescription` array whose first
/// element is a symbolic code and whose remaining elements are parameters.
///
/// # Examples
///
/// ```
/// use limpet::{codes, ApiError};
///
/// let err = ApiError::new(vec![
///     codes::HOST_IS_SLAVE.to_string(),
///     "192.0.2.10".to_string(),
/// ]);
///
/// assert_eq!(err.code(), "HOST_IS_SLAVE");
/// assert_eq!(err.params(), ["192.0.2.10"]);
/// assert_eq!(err.to_string(), "HOST_IS_SLAVE(192.0.2.10)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    description: Vec<String>,
}

impl ApiError {
    /// Creates a server error from a decoded `ErrorDescription` array.
    pub fn new(description: Vec<String>) -> Self {
        ApiError { description }
    }

    /// The symbolic error code (first element of the description).
    pub fn code(&self) -> &str {
        self.description.first().map(String::as_str).unwrap_or("")
    }

    /// The error parameters (everything after the code).
    pub fn params(&self) -> &[String] {
        self.description.get(1..).unwrap_or(&[])
    }

    /// The full description array as received.
    pub fn description(&self) -> &[String] {
        &self.description
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())?;
        if !self.params().is_empty() {
            write!(f, "({})", self.params().join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// The main error type for cluster RPC calls.
///
/// All variants are `Clone`able: when several concurrent calls wait on the
/// same in-flight login, each of them receives its own copy of the outcome.
///
/// # Examples
///
/// ```
/// use limpet::{codes, ApiError, Error};
///
/// fn describe(err: &Error) -> String {
///     match err {
///         Error::Api(api) if api.code() == codes::SESSION_INVALID => {
///             "session expired".to_string()
///         }
///         Error::Transport(t) => format!("network trouble: {}", t.code),
///         other => other.to_string(),
///     }
/// }
///
/// let err = Error::from(ApiError::new(vec![codes::SESSION_INVALID.to_string()]));
/// assert_eq!(describe(&err), "session expired");
/// ```
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// A network-level error occurred (connection reset, refused, no route,
    /// timeout, or any other failure below the RPC protocol).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a failure envelope.
    ///
    /// The symbolic code is available through [`ApiError::code`]; positional
    /// parameters through [`ApiError::params`].
    #[error("Server error: {0}")]
    Api(#[from] ApiError),

    /// The server answered with a response envelope that does not follow the
    /// protocol, such as a failure status without an error description.
    #[error("Malformed response envelope: {0}")]
    MalformedResponse(String),

    /// A host string could not be parsed into an endpoint.
    #[error("Invalid host {host:?}: {reason}")]
    InvalidHost {
        /// The host string as provided.
        host: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A call succeeded but its result could not be deserialized into the
    /// requested type.
    ///
    /// The raw result is preserved for debugging.
    #[error("Failed to deserialize call result: {serde_error}")]
    Deserialize {
        /// The raw result value, rendered as JSON.
        raw_value: String,
        /// The serde error message.
        serde_error: String,
    },

    /// Invalid configuration was provided, such as a missing host.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Returns the symbolic code for this error, if it has one.
    ///
    /// For server errors this is the first element of the error description;
    /// for classified transport errors it is the errno-style name. Returns
    /// `None` for unclassified transport failures and for local errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Transport(e) => match e.code {
                TransportCode::Other => None,
                code => Some(code.as_str()),
            },
            Error::Api(e) => Some(e.code()),
            _ => None,
        }
    }

    /// Returns `true` if this error is worth retrying after a backoff delay.
    ///
    /// Transient errors are connection-level transport failures (reset,
    /// refused, unreachable) and the server codes that describe a host still
    /// coming up ([`codes::HOST_STILL_BOOTING`],
    /// [`codes::HOST_HAS_NO_MANAGEMENT_IP`]). Everything else, including
    /// timeouts and HTTP-level failures, is treated as fatal.
    ///
    /// # Examples
    ///
    /// ```
    /// use limpet::{codes, ApiError, Error, TransportCode, TransportError};
    ///
    /// let reset = Error::from(TransportError::new(
    ///     TransportCode::ConnectionReset,
    ///     "connection reset by peer",
    /// ));
    /// assert!(reset.is_transient());
    ///
    /// let booting = Error::from(ApiError::new(vec![codes::HOST_STILL_BOOTING.to_string()]));
    /// assert!(booting.is_transient());
    ///
    /// let denied = Error::from(ApiError::new(vec!["PERMISSION_DENIED".to_string()]));
    /// assert!(!denied.is_transient());
    /// ```
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(e) => matches!(
                e.code,
                TransportCode::ConnectionReset
                    | TransportCode::ConnectionRefused
                    | TransportCode::HostUnreachable
            ),
            Error::Api(e) => {
                e.code() == codes::HOST_STILL_BOOTING
                    || e.code() == codes::HOST_HAS_NO_MANAGEMENT_IP
            }
            _ => false,
        }
    }

    /// Returns `true` if the server rejected the session handle.
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, Error::Api(e) if e.code() == codes::SESSION_INVALID)
    }

    /// Returns the master host named by a [`codes::HOST_IS_SLAVE`] rejection.
    ///
    /// Returns `None` for every other error, and for a `HOST_IS_SLAVE` reply
    /// that carries no master parameter.
    ///
    /// # Examples
    ///
    /// ```
    /// use limpet::{codes, ApiError, Error};
    ///
    /// let err = Error::from(ApiError::new(vec![
    ///     codes::HOST_IS_SLAVE.to_string(),
    ///     "pool-master.example".to_string(),
    /// ]));
    /// assert_eq!(err.redirect_target(), Some("pool-master.example"));
    /// ```
    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            Error::Api(e) if e.code() == codes::HOST_IS_SLAVE => {
                e.params().first().map(String::as_str)
            }
            _ => None,
        }
    }
}

/// A specialized `Result` type for cluster RPC calls.
///
/// This is a convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api(description: &[&str]) -> Error {
        Error::Api(ApiError::new(
            description.iter().map(|s| s.to_string()).collect(),
        ))
    }

    #[test]
    fn test_connection_codes_are_transient_but_timeout_is_not() {
        for code in [
            TransportCode::ConnectionReset,
            TransportCode::ConnectionRefused,
            TransportCode::HostUnreachable,
        ] {
            let err = Error::Transport(TransportError::new(code, "boom"));
            assert!(err.is_transient(), "{code} should be transient");
        }

        let timeout = Error::Transport(TransportError::new(TransportCode::Timeout, "slow"));
        assert!(!timeout.is_transient());
        let other = Error::Transport(TransportError::new(TransportCode::Other, "http 503"));
        assert!(!other.is_transient());
    }

    #[test]
    fn test_local_errors_are_never_transient() {
        assert!(!Error::MalformedResponse("no description".to_string()).is_transient());
        assert!(!Error::Configuration("no host".to_string()).is_transient());
    }

    #[test]
    fn test_session_invalid_detection() {
        assert!(api(&[codes::SESSION_INVALID, "OpaqueRef:1"]).is_session_invalid());
        assert!(!api(&[codes::HOST_IS_SLAVE, "10.0.0.2"]).is_session_invalid());
        let reset = Error::Transport(TransportError::new(TransportCode::ConnectionReset, "boom"));
        assert!(!reset.is_session_invalid());
    }

    #[test]
    fn test_redirect_target_requires_a_master_parameter() {
        assert_eq!(
            api(&[codes::HOST_IS_SLAVE, "10.0.0.2"]).redirect_target(),
            Some("10.0.0.2")
        );
        assert_eq!(api(&[codes::HOST_IS_SLAVE]).redirect_target(), None);
        assert_eq!(api(&["VM_BAD_POWER_STATE"]).redirect_target(), None);
    }

    #[test]
    fn test_code_uses_errno_names_for_classified_transport_errors() {
        let refused =
            Error::Transport(TransportError::new(TransportCode::ConnectionRefused, "no"));
        assert_eq!(refused.code(), Some("ECONNREFUSED"));

        let other = Error::Transport(TransportError::new(TransportCode::Other, "tls"));
        assert_eq!(other.code(), None);

        assert_eq!(api(&["HOST_STILL_BOOTING"]).code(), Some("HOST_STILL_BOOTING"));
        assert_eq!(Error::Configuration("bad".to_string()).code(), None);
    }
}
