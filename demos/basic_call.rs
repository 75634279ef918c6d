//! Basic example demonstrating a login and a few pool queries.
//!
//! This example shows how to:
//! - Build a client for a pool member
//! - Establish a session up front with `connect`
//! - Make calls that transparently reuse the session
//! - Deserialize call results into typed values
//!
//! Run with: `cargo run --example basic_call -- <host> <username> <password>`

use limpet::{Client, Error};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct PoolRecord {
    uuid: String,
    name_label: String,
    master: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("limpet=debug,basic_call=info")
        .init();

    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let username = args.next().unwrap_or_else(|| "root".to_string());
    let password = args.next().unwrap_or_default();

    let client = Client::builder()
        .host(host)
        .credentials(username, password)
        .build()?;

    println!("=== Connecting ===");
    client.connect().await?;
    println!("Connected to {}", client.endpoint());
    println!();

    println!("=== Listing hosts ===");
    let hosts = client.call("host.get_all", vec![]).await?;
    println!("Hosts: {hosts}");
    println!();

    println!("=== Typed results ===");
    let pools: Vec<String> = client.call_as("pool.get_all", vec![]).await?;
    for pool in pools {
        let record: PoolRecord = client
            .call_as("pool.get_record", vec![pool.clone().into()])
            .await?;
        println!("Pool {pool}:");
        println!("  Name: {}", record.name_label);
        println!("  Master: {}", record.master);
    }

    Ok(())
}
