//! ConsumerCluster - 1つの共有ストア上で N 本の ClaimLoop を動かす
//!
//! - `request_stop()`: 全ループに次のイテレーション先頭での停止を要求
//! - `join()`: 全ループの完了を待ち、それぞれの統計を返す
//!
//! 統計は join を通してのみ受け渡されるため、集計側がループの書き込み中の
//! `ConsumerStats` を読むことはない。

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tracing::info;

use super::consumer_loop::{ClaimLoop, ClaimOptions};
use super::processor::TaskProcessor;
use super::shutdown::ShutdownSignal;
use super::stats::ConsumerStats;
use crate::config::ConfigError;
use crate::ports::TaskStore;

/// ConsumerCluster は ClaimLoop 群とその停止シグナルを束ねる
///
/// # 設計原則
/// - ループ同士は通信せず、協調はすべてストアのロック経由
/// - 停止要求は冪等。全ループ終了後に呼んでも何も起きない
pub struct ConsumerCluster {
    shutdown: ShutdownSignal,
    joins: Vec<JoinHandle<ConsumerStats>>,
}

impl ConsumerCluster {
    /// Spawn `consumers` claim loops.
    pub fn spawn(
        consumers: usize,
        store: Arc<dyn TaskStore>,
        processor: Arc<dyn TaskProcessor>,
        options: ClaimOptions,
    ) -> Result<Self, ConfigError> {
        if consumers == 0 {
            return Err(ConfigError::NoConsumers);
        }
        let shutdown = ShutdownSignal::new();

        // build every loop first so a bad option spawns nothing
        let loops = (0..consumers)
            .map(|consumer| {
                ClaimLoop::new(
                    consumer,
                    Arc::clone(&store),
                    Arc::clone(&processor),
                    options.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let joins = loops
            .into_iter()
            .map(|claim| tokio::spawn(claim.run(shutdown.listener())))
            .collect();

        info!(consumers, batch_size = options.batch_size, "consumer cluster started");
        Ok(Self { shutdown, joins })
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Stop trigger that outlives the cluster handle (e.g. for a stdin task).
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Ask every loop to stop. Idempotent; a no-op once loops have exited.
    pub fn request_stop(&self) {
        self.shutdown.stop();
    }

    /// Wait for every loop to finish, in consumer order.
    pub async fn join(self) -> Result<Vec<ConsumerStats>, JoinError> {
        let mut all = Vec::with_capacity(self.joins.len());
        for join in self.joins {
            all.push(join.await?);
        }
        Ok(all)
    }

    pub async fn stop_and_join(self) -> Result<Vec<ConsumerStats>, JoinError> {
        self.request_stop();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::SimulatedProcessor;
    use crate::domain::{Task, TaskId};
    use crate::impls::InMemoryTaskStore;
    use crate::ports::SystemClock;
    use chrono::Utc;
    use std::time::Duration;
    use ulid::Ulid;

    fn store() -> Arc<InMemoryTaskStore> {
        Arc::new(InMemoryTaskStore::new(Arc::new(SystemClock), Duration::from_secs(15)))
    }

    fn polling(batch_size: usize) -> ClaimOptions {
        ClaimOptions {
            batch_size,
            terminate_when_drained: false,
            idle_pause: Duration::from_millis(2),
        }
    }

    fn processor() -> Arc<SimulatedProcessor> {
        Arc::new(SimulatedProcessor::new(Duration::from_millis(1), 0.0))
    }

    #[tokio::test]
    async fn zero_consumers_is_rejected() {
        let result = ConsumerCluster::spawn(0, store(), processor(), polling(1));
        assert!(matches!(result, Err(ConfigError::NoConsumers)));
    }

    #[tokio::test]
    async fn zero_batch_spawns_nothing() {
        let result = ConsumerCluster::spawn(2, store(), processor(), polling(0));
        assert!(matches!(result, Err(ConfigError::InvalidBatchSize)));
    }

    #[tokio::test]
    async fn stop_and_join_returns_one_stats_per_consumer() {
        let cluster = ConsumerCluster::spawn(4, store(), processor(), polling(4)).unwrap();
        assert_eq!(cluster.len(), 4);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let stats = cluster.stop_and_join().await.unwrap();
        let consumers: Vec<usize> = stats.iter().map(ConsumerStats::consumer).collect();
        assert_eq!(consumers, vec![0, 1, 2, 3]);
        assert!(stats.iter().all(|s| s.processed() == 0));
    }

    #[tokio::test]
    async fn repeated_stop_requests_do_not_hang() {
        let cluster = ConsumerCluster::spawn(3, store(), processor(), polling(3)).unwrap();
        let signal = cluster.shutdown_signal();
        signal.stop();
        cluster.request_stop();
        cluster.request_stop();

        let stats = tokio::time::timeout(Duration::from_secs(5), cluster.join())
            .await
            .expect("cluster did not stop")
            .unwrap();
        assert_eq!(stats.len(), 3);

        // stopping after every loop exited is harmless too
        signal.stop();
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn drain_mode_exits_on_its_own() {
        let store = store();
        for n in 0..5 {
            let at = Utc::now() - chrono::Duration::seconds(1);
            let task = Task::new(TaskId::from_ulid(Ulid::new()), at, format!("t{n}")).unwrap();
            store.insert(task).await.unwrap();
        }
        let options = ClaimOptions {
            terminate_when_drained: true,
            ..polling(2)
        };

        let cluster = ConsumerCluster::spawn(2, store.clone(), processor(), options).unwrap();
        let stats = tokio::time::timeout(Duration::from_secs(5), cluster.join())
            .await
            .expect("drained cluster did not exit")
            .unwrap();

        let processed: u64 = stats.iter().map(ConsumerStats::processed).sum();
        assert_eq!(processed, 5);
        assert!(store.is_empty().await.unwrap());
    }
}
