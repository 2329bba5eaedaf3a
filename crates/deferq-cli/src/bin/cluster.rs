//! Producer and consumers in one process, sharing one store.
//!
//! Prints the statistics table on exit and fails when the run was not
//! clean.

use deferq_core::app::ShutdownSignal;
use deferq_core::ports::TaskStore;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    deferq_cli::init_tracing()?;
    let settings = deferq_cli::load_settings()?;
    let store = deferq_cli::connect_store(&settings)?;

    let shutdown = ShutdownSignal::new();
    deferq_cli::stop_on_enter(shutdown.clone(), "cluster");

    let stats = deferq_cli::run_cluster(&settings, store.clone(), &shutdown).await?;

    info!(remaining = store.len().await?, "cluster exiting");
    deferq_cli::ensure_clean(deferq_cli::print_stats(&stats))
}
