use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::registry::RegistryOptions;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authoritative server for two-player snake rooms")]
pub struct ServerConfig {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: String,
    /// Used when RUST_LOG is not set.
    #[arg(long, env = "LOG_FILTER", default_value = "info")]
    pub log_filter: String,
    /// Fixes room codes and engine seeds, for reproducing a session.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions { seed: self.seed }
    }
}

pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
