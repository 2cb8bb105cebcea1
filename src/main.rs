mod api;
mod client;
mod commands;
mod config;
mod domain;
mod ingest;
mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "fleet-top",
    version,
    about = "Live process table aggregated from many machines"
)]
struct Cli {
    /// Target daemon name (from config nodes map; defaults to localhost)
    #[arg(long, global = true)]
    node: Option<String>,

    /// Output format (table or json)
    #[arg(long, global = true, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the aggregator daemon (ingestion + REST view API)
    Serve {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,

        /// Refresh interval in milliseconds (overrides config)
        #[arg(long)]
        refresh_ms: Option<u64>,

        /// Path to config file (default: ~/.config/fleet-top/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Print the current process table
    Top {
        /// Show rows hidden by the active filter
        #[arg(long)]
        all: bool,

        /// Redraw on every refresh interval
        #[arg(long)]
        watch: bool,
    },

    /// Set the name/machine filter
    Filter {
        /// Process name filter
        #[arg(long, default_value = "")]
        name: String,

        /// Machine name filter
        #[arg(long, default_value = "")]
        machine: String,

        /// Treat filters as regular expressions
        #[arg(long)]
        regex: bool,
    },

    /// Sort the table by a column (index, field name, or label)
    Sort {
        column: String,

        #[arg(long)]
        descending: bool,
    },

    /// Select a row by node name; omit the name to clear the selection
    Select { node_name: Option<String> },

    /// Daemon health and reporting machines
    Status,

    /// Send a JSON list of process records as one machine's snapshot
    Publish {
        /// File containing the JSON records
        file: PathBuf,

        /// Machine name (defaults to this host's name)
        #[arg(long)]
        machine: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let node = cli.node.as_deref();

    match cli.command {
        Commands::Serve {
            http_addr,
            log_level,
            refresh_ms,
            config,
        } => commands::serve::run(http_addr, log_level, refresh_ms, config),
        Commands::Top { all, watch } => commands::top::run(node, &cli.format, all, watch),
        Commands::Filter {
            name,
            machine,
            regex,
        } => commands::control::filter(node, &name, &machine, regex),
        Commands::Sort { column, descending } => {
            commands::control::sort(node, &column, descending)
        }
        Commands::Select { node_name } => commands::control::select(node, node_name.as_deref()),
        Commands::Status => commands::control::status(node),
        Commands::Publish { file, machine } => commands::publish::run(node, &file, machine),
    }
}
