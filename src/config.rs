use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_DB_PATH: &str = "cc_optimizer.db";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Database location, shared by the CLI and the backend.
#[derive(Debug, Clone, Args)]
pub struct DbArgs {
    /// Path to the SQLite database file
    #[arg(long = "db", env = "CC_OPTIMIZER_DB", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Address the HTTP backend listens on
    #[arg(long, env = "CC_OPTIMIZER_BIND", default_value = DEFAULT_BIND_ADDR)]
    pub bind: SocketAddr,
}

/// Installs the global tracing subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
