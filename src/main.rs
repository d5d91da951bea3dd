//! Binary entry point: loads configuration, opens the store, seeds the
//! wrapper roster, spawns the control loops, and serves the Request API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use llm_registry::domain::{Wrapper, WrapperStatus};
use llm_registry::worker::RemoteWorkerAdapter;
use llm_registry::{Config, Registry, Store};

#[derive(Parser, Debug)]
#[command(name = "llm-registryd", about = "Registry and dispatcher for remote LLM wrapper hosts")]
struct Cli {
    /// Path to the INI configuration file.
    #[arg(long, default_value = "registry.ini")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config).wrap_err_with(|| format!("failed to load config from {}", cli.config.display()))?;

    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))).init();

    info!(db_name = %config.db_name, bind_address = %config.bind_address, "starting registry");

    let store = Arc::new(Store::open(&config.db_name).wrap_err("failed to open state store")?);
    if config.reset_on_boot {
        store.reset().wrap_err("failed to reset state store")?;
    }

    seed_wrapper_roster(&store, &config)?;

    let adapter: Arc<dyn llm_registry::worker::WorkerAdapter> = Arc::new(RemoteWorkerAdapter::new());
    let registry = Registry::spawn(store, adapter);

    // Reuse the Registry's own `RequestApi` rather than building a second
    // one: it's wired to the same work-notify handle the dispatch loop
    // actually waits on, so an HTTP submit/release wakes dispatch immediately
    // instead of waiting out the current backoff interval.
    let request_api = registry.request_api.clone();
    let app = llm_registry::server::router(request_api);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await.wrap_err_with(|| format!("failed to bind {}", config.bind_address))?;
    info!(bind_address = %config.bind_address, "listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    serve.await.wrap_err("http server failed")?;

    registry.shutdown().await;
    Ok(())
}

/// Wrappers are seeded `not_installed` on first sight; re-running against an
/// existing store leaves already-known addresses untouched (§3).
fn seed_wrapper_roster(store: &Store, config: &Config) -> Result<()> {
    for machine in &config.llm_wrapper_machines {
        if store.get_wrapper_by_address(&machine.ip_address)?.is_some() {
            continue;
        }
        let wrapper = Wrapper::seed("", &machine.ip_address, &machine.user, &machine.password, WrapperStatus::NotInstalled);
        let id = store.add_wrapper(&wrapper.llm, &wrapper.address, &wrapper.username, &wrapper.password, wrapper.status)?;
        info!(wrapper_id = id, address = %machine.ip_address, "seeded wrapper");
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
