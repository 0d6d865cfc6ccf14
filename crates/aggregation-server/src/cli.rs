//! CLI argument wiring, following the shape of the teacher's
//! `ProductOperatorRun` (bind address, cache backend, telemetry flags).

use std::net::SocketAddr;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use partitioned_query::CacheBackend;

pub const AUTHOR: &str = "Aggregation Layer Contributors";

#[derive(clap::Parser, Debug)]
#[command(name = "aggregation-server", author = AUTHOR, version, about = "Kubernetes-aware aggregation layer")]
pub struct Opts {
    #[command(flatten)]
    pub run: RunOptions,
}

#[derive(clap::Args, Debug)]
pub struct RunOptions {
    /// Address the HTTP surface binds to.
    #[arg(long, env, default_value = "0.0.0.0:8080")]
    pub bind_address: SocketAddr,

    /// Overrides `CATTLE_STEVE_CACHE_BACKEND` for this process.
    #[arg(long, env = "CATTLE_STEVE_CACHE_BACKEND", value_enum)]
    pub cache_backend: Option<CliCacheBackend>,

    /// Enables console (stdout) logging.
    #[arg(long, default_value_t = true)]
    pub console_log: bool,

    /// Minimum level for console logging.
    #[arg(long, default_value = "info")]
    pub console_log_level: String,

    /// Enables OTLP trace export.
    #[arg(long, default_value_t = false)]
    pub otlp_traces: bool,

    /// Enables OTLP log export.
    #[arg(long, default_value_t = false)]
    pub otlp_logs: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum CliCacheBackend {
    Expiring,
    Lru,
}

impl From<CliCacheBackend> for CacheBackend {
    fn from(value: CliCacheBackend) -> Self {
        match value {
            CliCacheBackend::Expiring => CacheBackend::ExpiringOnly,
            CliCacheBackend::Lru => CacheBackend::LruWithExpiry,
        }
    }
}

impl RunOptions {
    pub fn console_level_filter(&self) -> LevelFilter {
        self.console_log_level.parse().unwrap_or(LevelFilter::INFO)
    }

    pub fn parse_args() -> RunOptions {
        Opts::parse().run
    }
}
