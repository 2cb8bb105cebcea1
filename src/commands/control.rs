//! `fleet-top filter` / `sort` / `select` / `status` — drive a daemon's view.

use anyhow::Result;
use colored::Colorize;

use crate::client::FleetTopClient;
use crate::config;
use crate::domain::filter::FilterInput;

fn client(node: Option<&str>) -> Result<FleetTopClient> {
    let cfg = config::load()?;
    FleetTopClient::from_node(node, &cfg.nodes)
}

pub fn filter(node: Option<&str>, name: &str, machine: &str, regex: bool) -> Result<()> {
    let input = FilterInput {
        name_filter_text: name.to_string(),
        machine_filter_text: machine.to_string(),
        is_regex: regex,
    };
    let client = client(node)?;
    let rt = tokio::runtime::Runtime::new()?;
    let active = rt.block_on(client.set_filter(&input))?.filter;

    println!(
        "{} filter: name={:?} machine={:?}{}",
        "ok".green().bold(),
        active.name_filter_text,
        active.machine_filter_text,
        if active.is_regex { " (regex)" } else { "" }
    );
    Ok(())
}

pub fn sort(node: Option<&str>, column: &str, descending: bool) -> Result<()> {
    let client = client(node)?;
    let rt = tokio::runtime::Runtime::new()?;
    let view = rt.block_on(client.set_sort(column, !descending))?;

    let label = view
        .columns
        .get(view.sort.column)
        .map(|c| c.label.as_str())
        .unwrap_or("?");
    println!(
        "{} sorted by {} ({})",
        "ok".green().bold(),
        label.bold(),
        if view.sort.ascending {
            "ascending"
        } else {
            "descending"
        }
    );
    Ok(())
}

pub fn select(node: Option<&str>, node_name: Option<&str>) -> Result<()> {
    let client = client(node)?;
    let rt = tokio::runtime::Runtime::new()?;

    match node_name {
        Some(name) => {
            rt.block_on(client.select(name))?;
            println!("{} selected {}", "ok".green().bold(), name.bold());
        }
        None => {
            rt.block_on(client.clear_selection())?;
            println!("{} selection cleared", "ok".green().bold());
        }
    }
    Ok(())
}

pub fn status(node: Option<&str>) -> Result<()> {
    let client = client(node)?;
    let rt = tokio::runtime::Runtime::new()?;
    let health = rt.block_on(client.health())?;
    let machines = rt.block_on(client.machines())?;

    println!("{}", "fleet-top status".bold());
    println!("  version:   {}", health.version);
    println!("  uptime:    {}s", health.uptime_secs);
    println!("  processes: {}", health.records);
    if machines.is_empty() {
        println!("  machines:  {}", "none reporting".yellow());
    } else {
        println!("  machines:");
        for m in machines {
            println!("    {} ({} processes)", m.machine.bold(), m.processes);
        }
    }
    Ok(())
}
