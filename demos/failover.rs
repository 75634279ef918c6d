//! Example demonstrating survival across master elections and host restarts.
//!
//! This example shows how to:
//! - Tune the retry budget for a long-lived watcher
//! - Keep calling through transient outages
//! - Observe the endpoint moving as master redirects are followed
//!
//! Run with: `cargo run --example failover -- <host> <username> <password>`
//!
//! Then trigger a failover (or reboot the master) and watch the client
//! reconnect on its own.

use limpet::{BackoffConfig, Client, Error};
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("limpet=info,failover=info")
        .init();

    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let username = args.next().unwrap_or_else(|| "root".to_string());
    let password = args.next().unwrap_or_default();

    // A watcher would rather wait than fail, so give it a generous budget.
    let client = Client::builder()
        .host(host)
        .credentials(username, password)
        .backoff(BackoffConfig {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            max_attempts: 20,
            jitter: true,
        })
        .build()?;

    println!("Polling the pool; trigger a master failover to watch the client follow it.");
    for round in 1.. {
        match client.call("pool.get_all", vec![]).await {
            Ok(pools) => {
                println!("[round {round}] {} answered: {pools}", client.endpoint());
            }
            Err(Error::Api(e)) => {
                // Server-side refusals are worth seeing but not worth dying for.
                println!("[round {round}] API error: {e}");
            }
            Err(e) => {
                println!("[round {round}] retry budget exhausted: {e}");
                return Err(e);
            }
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    Ok(())
}
