//! Example demonstrating the indexed record store.
//!
//! This example shows how to:
//! - Mirror API objects into an indexed collection
//! - Query by indexed fields, alone and combined
//! - Replace records as the mirrored state changes
//!
//! Run with: `cargo run --example collection`

use limpet::collection::{Collection, Record};
use serde_json::{json, Value};

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn main() {
    println!("=== Building a VM inventory ===");
    let vms = Collection::new(["power_state", "resident_on"]);
    for vm in [
        json!({"id": "vm-web", "power_state": "Running", "resident_on": "host-1"}),
        json!({"id": "vm-db", "power_state": "Running", "resident_on": "host-2"}),
        json!({"id": "vm-batch", "power_state": "Halted", "resident_on": "host-1"}),
    ] {
        let stored = vms.add(record(vm)).unwrap();
        println!("Stored {}", stored["id"]);
    }
    println!("Inventory size: {}", vms.len());
    println!();

    println!("=== Querying by index ===");
    let running = vms.get(&record(json!({"power_state": "Running"}))).unwrap();
    println!("Running VMs: {}", running.len());
    for vm in &running {
        println!("  {} on {}", vm["id"], vm["resident_on"]);
    }

    let on_host_1 = vms
        .get(&record(
            json!({"power_state": "Running", "resident_on": "host-1"}),
        ))
        .unwrap();
    println!("Running on host-1: {}", on_host_1.len());
    println!();

    println!("=== Records without an id get one assigned ===");
    let stored = vms
        .add(record(
            json!({"power_state": "Halted", "resident_on": "host-2"}),
        ))
        .unwrap();
    println!("Assigned id: {}", stored["id"]);
    println!();

    println!("=== Updating a mirrored record ===");
    // vm-batch migrated and started up; replace its record wholesale.
    vms.update(record(
        json!({"id": "vm-batch", "power_state": "Running", "resident_on": "host-2"}),
    ))
    .unwrap();
    let on_host_2 = vms
        .get(&record(
            json!({"power_state": "Running", "resident_on": "host-2"}),
        ))
        .unwrap();
    println!("Running on host-2: {}", on_host_2.len());
    println!();

    println!("=== Filters must stay on indexed fields ===");
    match vms.get(&record(json!({"name_label": "web"}))) {
        Err(e) => println!("Rejected as expected: {e}"),
        Ok(_) => println!("Unexpectedly allowed"),
    }

    println!();
    println!("=== Removing records ===");
    let removed = vms.remove(&[json!("vm-web"), json!("vm-db")]).unwrap();
    println!("Removed {removed} records, {} left", vms.len());
}
