//! # Limpet - a resilient client for clustered control-plane APIs
//!
//! Limpet talks to session-authenticated cluster APIs in which one member is
//! the master and the others redirect you to it. It is built for the
//! unglamorous realities of such clusters: sessions expire behind your back,
//! masters move during upgrades and elections, and freshly booted hosts
//! answer before they are ready. Calls ride through all of that and either
//! return the real result or the real error.
//!
//! ## Quick Start
//!
//! ```no_run
//! use limpet::Client;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), limpet::Error> {
//!     let client = Client::builder()
//!         .host("pool-master.example")
//!         .credentials("root", "secret")
//!         .build()?;
//!
//!     // Optional: fail fast on bad credentials or an unreachable pool.
//!     // Otherwise the first call logs in on demand.
//!     client.connect().await?;
//!
//!     let hosts = client.call("host.get_all", vec![]).await?;
//!     println!("hosts: {hosts}");
//!
//!     client
//!         .call(
//!             "VM.start",
//!             vec![json!("OpaqueRef:e5a8..."), json!(false), json!(false)],
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Transparent sessions** - logs in on first use, injects the session
//!   into every call, and renews it when the server rejects it
//! - **Single-flight login** - concurrent calls share one login; a burst of
//!   session rejections triggers exactly one re-login
//! - **Master redirects** - `HOST_IS_SLAVE` answers repoint the client at
//!   the reported master and replay the call, session intact
//! - **Fibonacci backoff** - transient failures (connection reset/refused,
//!   unreachable or still-booting hosts) retry on a bounded budget, and
//!   exhaustion surfaces the original error rather than a retry wrapper
//! - **Envelope unwrapping** - `{Status, Value, ErrorDescription}` replies
//!   are reduced to their value or a typed [`ApiError`]
//! - **Pluggable transport** - swap the reqwest-based wire layer for your
//!   own via [`TransportFactory`]
//! - **Structured logging** - every login, redirect and retry is traced via
//!   `tracing`
//!
//! ## Error Handling
//!
//! Server-side failures keep their symbolic code and parameters:
//!
//! ```no_run
//! use limpet::{Client, Error};
//! use serde_json::json;
//!
//! # async fn example(client: &Client) -> Result<(), Error> {
//! match client.call("VM.start", vec![json!("OpaqueRef:1")]).await {
//!     Ok(result) => println!("{result}"),
//!     Err(Error::Api(api)) if api.code() == "VM_BAD_POWER_STATE" => {
//!         eprintln!("not startable: {:?}", api.params());
//!     }
//!     Err(Error::Transport(t)) => eprintln!("network trouble: {t}"),
//!     Err(e) => eprintln!("call failed: {e}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retry Behavior
//!
//! Each top-level call carries one retry budget, shared with any login it
//! triggers and re-armed by any success along the way:
//!
//! ```no_run
//! use limpet::{BackoffConfig, Client};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), limpet::Error> {
//! let client = Client::builder()
//!     .host("pool-master.example")
//!     .credentials("root", "secret")
//!     .backoff(BackoffConfig {
//!         initial_delay: Duration::from_millis(100),
//!         max_delay: Duration::from_secs(10),
//!         max_attempts: 10,
//!         jitter: true,
//!     })
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod client;
pub mod collection;
mod endpoint;
mod envelope;
mod error;
mod session;
mod transport;

pub use backoff::BackoffConfig;
pub use client::{Client, ClientBuilder};
pub use collection::Collection;
pub use endpoint::Endpoint;
pub use error::{codes, ApiError, Error, Result, TransportCode, TransportError};
pub use transport::{HttpTransport, Transport, TransportFactory};
