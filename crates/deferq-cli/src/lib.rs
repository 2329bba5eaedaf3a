//! Wiring for the `deferq-cluster` binary.
//!
//! The store is process-local, so the producer and every consumer run in
//! the one process that owns it.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use deferq_core::app::{
    ClaimOptions, ConsumerCluster, ConsumerStats, Producer, ShutdownSignal, SimulatedProcessor,
    StatsReport,
};
use deferq_core::config::Settings;
use deferq_core::impls::InMemoryTaskStore;
use deferq_core::ports::{SystemClock, TaskStore, UlidGenerator};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the fmt subscriber. Logs go to stderr so the stats table on
/// stdout stays readable.
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter())
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("tracing init failed: {e}"))
}

/// Built-in settings, validated. Any violation is a setup failure.
pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = Settings::default();
    settings.validate().context("invalid settings")?;
    info!(
        store = %settings.store.redacted_target(),
        consumers = settings.consumer.consumers,
        max_count = settings.producer.max_count,
        terminate_when_drained = settings.consumer.terminate_when_drained,
        "settings loaded"
    );
    debug!(settings = %serde_json::to_string(&settings)?, "effective settings");
    Ok(settings)
}

pub fn connect_store(settings: &Settings) -> anyhow::Result<Arc<InMemoryTaskStore>> {
    let store = InMemoryTaskStore::connect(&settings.store).context("store connection failed")?;
    Ok(Arc::new(store))
}

/// Stop `signal` when the operator presses Enter.
///
/// Runs on a plain thread: a blocking stdin read must not hold the runtime
/// open at exit. End of input is not a stop request.
pub fn stop_on_enter(signal: ShutdownSignal, what: &'static str) {
    eprintln!("press Enter to stop the {what}");
    let spawned = std::thread::Builder::new()
        .name("stop-on-enter".into())
        .spawn(move || {
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) => {}
                Ok(_) => {
                    info!("stop requested from stdin");
                    signal.stop();
                }
                Err(err) => warn!(error = %err, "stdin unreadable, Enter-to-stop disabled"),
            }
        });
    if let Err(err) = spawned {
        warn!(error = %err, "could not start stdin watcher");
    }
}

/// Run the producer and `settings.consumer.consumers` claim loops over
/// `store` and hand back every loop's stats.
///
/// With `terminate_when_drained` the producer finishes first, the last task
/// becomes due, then the consumers drain the store. Otherwise both run side
/// by side until `shutdown` fires.
pub async fn run_cluster(
    settings: &Settings,
    store: Arc<dyn TaskStore>,
    shutdown: &ShutdownSignal,
) -> anyhow::Result<Vec<ConsumerStats>> {
    let producer = Producer::new(
        Arc::clone(&store),
        Arc::new(UlidGenerator::new(SystemClock)),
        Arc::new(SystemClock),
        settings.producer.clone(),
    )?;
    let processor = Arc::new(SimulatedProcessor::from_settings(&settings.consumer));
    let options = ClaimOptions::from_settings(&settings.consumer);
    let consumers = settings.consumer.consumers;

    if settings.consumer.terminate_when_drained {
        let report = producer.run(shutdown.listener()).await;
        info!(inserted = report.inserted, failed = report.failed, "producer done, draining");
        tokio::time::sleep(settings.producer.lead_time).await;

        let cluster = ConsumerCluster::spawn(consumers, Arc::clone(&store), processor, options)?;
        let forward = {
            let cluster_stop = cluster.shutdown_signal();
            let mut stop = shutdown.listener();
            tokio::spawn(async move {
                stop.stopped().await;
                cluster_stop.stop();
            })
        };
        let stats = cluster.join().await?;
        forward.abort();
        Ok(stats)
    } else {
        let cluster = ConsumerCluster::spawn(consumers, Arc::clone(&store), processor, options)?;
        let producing = {
            let stop = shutdown.listener();
            tokio::spawn(async move { producer.run(stop).await })
        };
        shutdown.listener().stopped().await;
        let report = producing.await?;
        info!(inserted = report.inserted, failed = report.failed, "producer stopped");
        Ok(cluster.stop_and_join().await?)
    }
}

/// Print the aggregate report to stdout. Returns whether it was clean.
pub fn print_stats(stats: &[ConsumerStats]) -> bool {
    let report = StatsReport::aggregate(stats);
    println!("{report}");
    match serde_json::to_string(&report) {
        Ok(json) => debug!(report = %json, "stats report"),
        Err(err) => warn!(error = %err, "stats report not serializable"),
    }
    if !report.is_clean() {
        warn!(
            duplicate_task_ids = report.duplicate_task_ids,
            duplicate_executions = report.duplicate_executions,
            "duplicate executions detected"
        );
    }
    report.is_clean()
}

/// Turn the report verdict into the process result.
pub fn ensure_clean(clean: bool) -> anyhow::Result<()> {
    if !clean {
        anyhow::bail!("run was not clean: a task ran twice or may run again");
    }
    Ok(())
}
