use std::path::Path;

use anyhow::Result;

use crate::config;

pub fn run(
    http_addr: Option<String>,
    log_level: Option<String>,
    refresh_ms: Option<u64>,
    config_path: Option<String>,
) -> Result<()> {
    // Load config from file (custom path or default)
    let mut cfg = match config_path {
        Some(path) => config::load_from(Path::new(&path))?,
        None => config::load()?,
    };

    // CLI flags override config values
    if let Some(addr) = http_addr {
        cfg.daemon.http_addr = addr;
    }
    if let Some(level) = log_level {
        cfg.daemon.log_level = level;
    }
    if let Some(ms) = refresh_ms {
        cfg.view.refresh_interval_ms = ms;
    }

    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::server::run(cfg))
}
