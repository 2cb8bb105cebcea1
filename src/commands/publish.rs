//! `fleet-top publish` — send a JSON records file as one machine snapshot.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::client::FleetTopClient;
use crate::config;
use crate::ingest::{self, IngestMessage};

pub fn run(node: Option<&str>, file: &Path, machine: Option<String>) -> Result<()> {
    let value =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let key = match machine {
        Some(m) => m,
        None => hostname::get()
            .context("reading hostname")?
            .to_string_lossy()
            .into_owned(),
    };
    let message = IngestMessage { key, value };

    // Validate locally so a bad file fails before touching the network
    let (machine, records) = ingest::decode(&message)?;

    let cfg = config::load()?;
    let client = FleetTopClient::from_node(node, &cfg.nodes)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(client.ingest(&message))?;

    println!(
        "{} published {} processes for {}",
        "ok".green().bold(),
        records.len(),
        machine.bold()
    );
    Ok(())
}
