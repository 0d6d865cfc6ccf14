use std::sync::Arc;

use tracing::level_filters::LevelFilter;

use access_control::{AccessStore, StaticRbacIndex};
use aggregation_server::cli::RunOptions;
use aggregation_server::routes::{router, AppState};
use aggregation_server::widgets::InMemoryWidgetBackend;
use resource_delegate::ResourceDelegate;
use stackable_telemetry::tracing::Tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = RunOptions::parse_args();

    let mut builder = Tracing::builder().service_name("aggregation-server");
    if opts.console_log {
        builder = builder.with_console_output(opts.console_level_filter());
    }
    if opts.otlp_logs {
        builder = builder.with_otlp_log_exporter(LevelFilter::INFO);
    }
    if opts.otlp_traces {
        builder = builder.with_otlp_trace_exporter(LevelFilter::INFO);
    }
    let _tracing_guard = builder.build().init()?;

    if let Some(cache_backend) = opts.cache_backend {
        // SAFETY: set once at startup, before any reader spawns.
        unsafe {
            std::env::set_var(
                "CATTLE_STEVE_CACHE_BACKEND",
                match cache_backend {
                    aggregation_server::cli::CliCacheBackend::Lru => "LRU",
                    aggregation_server::cli::CliCacheBackend::Expiring => "",
                },
            );
        }
    }

    let access_store = Arc::new(AccessStore::new(StaticRbacIndex::new()));
    let widgets = Arc::new(ResourceDelegate::new(Box::new(InMemoryWidgetBackend::default())));

    let state = AppState {
        access_store,
        widgets,
    };
    let app = router(state);

    tracing::info!(bind_address = %opts.bind_address, "starting aggregation-server");
    let listener = tokio::net::TcpListener::bind(opts.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
