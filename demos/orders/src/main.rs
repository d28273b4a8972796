//! Orders Demo
//!
//! Wires a small order-processing graph through the container and places a
//! few orders:
//!
//! - `OrderService` takes its repository as a constructor parameter, resolved
//!   through the interface's default implementation
//! - confirmation mails go through `Proxy<EmailNotifier>` on the `mail` pool
//! - `AuditLog` listens synchronously, `Inventory` on the `application` pool
//!
//! # Usage
//!
//! ```bash
//! cd demos/orders
//! cargo run -- --count 3 --item widget
//! TRELLIS_PROPERTIES__ORDERS__CURRENCY=USD cargo run -- -p orders.max_quantity=2 --quantity 5
//! ```

mod components;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use trellis::prelude::*;

use components::{AuditLog, EmailNotifier, Inventory, OrderService};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file; defaults to searching for trellis.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile (also read from TRELLIS_PROFILE)
    #[arg(long)]
    profile: Option<String>,

    /// Property override as key=value, may be repeated
    #[arg(short = 'p', long = "property", value_parser = parse_key_value)]
    properties: Vec<(String, String)>,

    /// Number of orders to place
    #[arg(short = 'n', long, default_value_t = 3)]
    count: u32,

    /// Ordered item
    #[arg(long, default_value = "widget")]
    item: String,

    /// Quantity per order
    #[arg(short, long, default_value_t = 1)]
    quantity: u32,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = Application::builder();
    if let Some(path) = cli.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &cli.profile {
        builder = builder.profile(profile);
    }
    for (key, value) in cli.properties {
        builder = builder.property(&key, value);
    }
    let app = builder.build()?;
    let container = app.container();

    components::register(container)?;
    // Listeners subscribe when their component is first resolved.
    container.get::<AuditLog>()?;
    // Inventory has an async listener, so it is only reachable through its proxy.
    let inventory = container.proxy::<Inventory>()?;

    let service = container.get::<OrderService>()?;
    for _ in 0..cli.count {
        if let Err(e) = service.place(&cli.item, cli.quantity) {
            error!(error = %e, "Order rejected");
        }
    }

    // Waits for queued mails and inventory updates.
    app.shutdown(Duration::from_secs(5));

    info!(
        stored = service.stored(),
        currency = service.currency(),
        mails = container.proxy::<EmailNotifier>()?.call("sent", EmailNotifier::sent),
        reserved = ?inventory.call("reserved", Inventory::reserved),
        "Run finished"
    );
    for entry in service.audit_trail()? {
        info!(entry = %entry, "Audit");
    }

    Ok(())
}
