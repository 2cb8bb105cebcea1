//! `fleet-top top` — print the daemon's current process table.

use std::time::Duration;

use anyhow::Result;
use colored::Colorize;

use crate::client::FleetTopClient;
use crate::config;
use crate::domain::view_model::{RebuildOutcome, TableView};

pub fn run(node: Option<&str>, format: &str, all: bool, watch: bool) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(node, format, all, watch))
}

async fn run_async(node: Option<&str>, format: &str, all: bool, watch: bool) -> Result<()> {
    let cfg = config::load()?;
    let client = FleetTopClient::from_node(node, &cfg.nodes)?;

    if !watch {
        let view = client.view().await?;
        return print_view(format, &view, all);
    }

    let mut interval = tokio::time::interval(cfg.view.refresh_interval().max(Duration::from_millis(100)));
    loop {
        interval.tick().await;
        let view = client.view().await?;
        // Clear screen, cursor home
        print!("\x1B[2J\x1B[H");
        print_view(format, &view, all)?;
    }
}

fn print_view(format: &str, view: &TableView, all: bool) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(view)?),
        _ => {
            for line in render_table(view, all) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

/// Render the view as aligned text lines: status, header, then rows.
/// Hidden rows are omitted unless `all` is set.
pub fn render_table(view: &TableView, all: bool) -> Vec<String> {
    let mut lines = Vec::new();

    match view.status {
        Some(RebuildOutcome::NoData) | None => {
            lines.push(format!("{} No machines reporting", "::".blue().bold()));
            return lines;
        }
        Some(RebuildOutcome::Rebuilt {
            machines,
            rows,
            visible,
            skipped,
        }) => {
            let mut status = format!(
                "{} machines, {} processes, {} shown",
                machines, rows, visible
            );
            if skipped > 0 {
                status.push_str(&format!(", {} skipped", skipped));
            }
            lines.push(status.dimmed().to_string());
        }
    }

    let rows: Vec<_> = view.rows.iter().filter(|r| all || r.visible).collect();

    let mut widths: Vec<usize> = view.columns.iter().map(|c| c.label.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.cells.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let header: Vec<String> = view
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let label = if i == view.sort.column {
                format!("{}{}", c.label, if view.sort.ascending { "^" } else { "v" })
            } else {
                c.label.clone()
            };
            pad(&label, widths[i] + 1)
        })
        .collect();
    lines.push(format!("  {}", header.join(" ")).bold().to_string());

    for row in rows {
        let cells: Vec<String> = row
            .cells
            .iter()
            .enumerate()
            .map(|(i, cell)| pad(cell, widths.get(i).copied().unwrap_or(0) + 1))
            .collect();
        let marker = if row.selected { ">" } else { " " };
        let line = format!("{} {}", marker, cells.join(" "));
        let line = if row.selected {
            line.green().bold().to_string()
        } else if !row.visible {
            line.dimmed().to_string()
        } else {
            line
        };
        lines.push(line.trim_end().to_string());
    }

    lines
}

fn pad(text: &str, width: usize) -> String {
    format!("{:<width$}", text, width = width)
}
