//! testdeck -- run orchestration daemon for browser-driven UI test suites.
//!
//! Launches external test-execution processes, streams and records their
//! output, force-terminates hung runs, and fires deferred runs at their
//! scheduled wall-clock time. The HTTP API is the surface a dashboard
//! front-end consumes; the test executables themselves are opaque external
//! collaborators.

pub mod api;
pub mod config;
pub mod durations;
pub mod error;
pub mod run;
pub mod scheduler;

use anyhow::Result;

use crate::config::Config;
use crate::durations::DurationStore;
use crate::run::registry::Registry;
use crate::run::supervisor::Supervisor;
use crate::scheduler::Scheduler;

/// Start the testdeck daemon: duration store, run registry, scheduler, and
/// the API server.
pub async fn serve(bind: &str, config: Config) -> Result<()> {
    let durations = DurationStore::load(&config.store.durations_file);
    let registry = Registry::new();
    let supervisor = Supervisor::new(registry.clone(), durations.clone(), &config);
    let scheduler = Scheduler::new(supervisor.clone(), config.scheduler.clone());
    scheduler.start_engine();

    let state = api::state::AppState {
        registry,
        supervisor,
        scheduler,
        durations,
    };
    let app = api::router(state);

    let addr: std::net::SocketAddr = bind.parse()?;
    tracing::info!(%addr, "testdeck listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
