//! Producer - 作成から `lead_time` 後に期限が来るタスクを投入
//!
//! ベストエフォート：タスク生成や insert の失敗はログとカウントのみで、
//! ループは次のタスクへ進む。

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::shutdown::StopListener;
use crate::config::{ConfigError, ProducerSettings};
use crate::domain::{StoreError, Task, TaskError, TaskId};
use crate::ports::{Clock, IdGenerator, TaskStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
/// 投入結果。失敗は生成失敗と insert 失敗の合計。
pub struct ProducerReport {
    pub inserted: u64,
    pub failed: u64,
}

/// Producer は `interval` ごとにタスクを1件投入
///
/// # フロー
/// 1. 先頭で停止要求を確認
/// 2. `execute_at = now + lead_time`、内容 `"Task n. {k}"` の Task を生成
/// 3. `TaskStore::insert`
/// 4. 最後のタスク以外は `interval` だけ sleep
pub struct Producer {
    store: Arc<dyn TaskStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    settings: ProducerSettings,
    lead_time: chrono::Duration,
}

impl Producer {
    pub fn new(
        store: Arc<dyn TaskStore>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        settings: ProducerSettings,
    ) -> Result<Self, ConfigError> {
        if settings.max_count == 0 {
            return Err(ConfigError::NoTasksToProduce);
        }
        let lead_time = chrono::Duration::from_std(settings.lead_time)
            .map_err(|_| ConfigError::LeadTimeOutOfRange(settings.lead_time))?;
        Ok(Self {
            store,
            ids,
            clock,
            settings,
            lead_time,
        })
    }

    /// Insert up to `max_count` tasks, one every `interval`.
    pub async fn run(&self, stop: StopListener) -> ProducerReport {
        let mut report = ProducerReport::default();
        let mut counter: u64 = 0;

        while counter < self.settings.max_count {
            if stop.is_stopped() {
                info!(produced = counter, "stop requested");
                break;
            }
            counter += 1;

            match self.produce_one(counter).await {
                Ok(id) => {
                    report.inserted += 1;
                    info!(task_id = %id, n = counter, "inserted task");
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(n = counter, error = %err, kind = ?err.kind(), "failed to produce task");
                }
            }

            if counter < self.settings.max_count {
                tokio::time::sleep(self.settings.interval).await;
            }
        }

        info!(inserted = report.inserted, failed = report.failed, "producer finished");
        report
    }

    async fn produce_one(&self, counter: u64) -> Result<TaskId, StoreError> {
        let task = self.next_task(counter)?;
        let id = task.id();
        self.store.insert(task).await?;
        Ok(id)
    }

    fn next_task(&self, counter: u64) -> Result<Task, TaskError> {
        let execute_at = self
            .clock
            .now()
            .checked_add_signed(self.lead_time)
            .ok_or(TaskError::ExecuteAtOutOfRange)?;
        Task::new(
            self.ids.generate_task_id(),
            execute_at,
            format!("Task n. {counter}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ShutdownSignal;
    use crate::domain::LockToken;
    use crate::impls::InMemoryTaskStore;
    use crate::ports::{ManualClock, SystemClock, UlidGenerator};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn settings(max_count: u64) -> ProducerSettings {
        ProducerSettings {
            interval: Duration::from_millis(1),
            lead_time: Duration::from_millis(500),
            max_count,
        }
    }

    #[tokio::test]
    async fn inserts_max_count_tasks_due_after_lead_time() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemoryTaskStore::new(clock.clone(), Duration::from_secs(15)));
        let producer = Producer::new(
            store.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock.clone(),
            settings(5),
        )
        .unwrap();

        let report = producer.run(StopListener::never()).await;
        assert_eq!(report, ProducerReport { inserted: 5, failed: 0 });
        assert_eq!(store.len().await.unwrap(), 5);

        // nothing is due before the lead time has passed
        assert!(store.query_due_unlocked(10).await.unwrap().is_empty());
        clock.advance(chrono::Duration::milliseconds(500));
        assert_eq!(store.query_due_unlocked(10).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn content_is_numbered_from_one() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemoryTaskStore::new(clock.clone(), Duration::from_secs(15)));
        let producer = Producer::new(
            store.clone(),
            Arc::new(UlidGenerator::new(SystemClock)),
            clock.clone(),
            settings(3),
        )
        .unwrap();
        producer.run(StopListener::never()).await;

        clock.advance(chrono::Duration::seconds(1));
        let mut contents = Vec::new();
        for id in store.query_due_unlocked(10).await.unwrap() {
            let (task, _) = store.lock_and_fetch(&id).await.unwrap();
            contents.push(task.content().to_string());
        }
        contents.sort();
        assert_eq!(contents, vec!["Task n. 1", "Task n. 2", "Task n. 3"]);
    }

    #[tokio::test]
    async fn stop_is_observed_at_loop_top() {
        let store = Arc::new(InMemoryTaskStore::new(Arc::new(SystemClock), Duration::from_secs(15)));
        let signal = ShutdownSignal::new();
        signal.stop();

        let producer = Producer::new(
            store.clone(),
            Arc::new(UlidGenerator::new(SystemClock)),
            Arc::new(SystemClock),
            settings(100),
        )
        .unwrap();
        let report = producer.run(signal.listener()).await;

        assert_eq!(report, ProducerReport::default());
        assert!(store.is_empty().await.unwrap());
    }

    /// Rejects every insert.
    struct Refusing;

    #[async_trait]
    impl TaskStore for Refusing {
        async fn insert(&self, task: Task) -> Result<(), StoreError> {
            Err(StoreError::AlreadyExists(task.id()))
        }

        async fn query_due_unlocked(&self, _limit: usize) -> Result<Vec<TaskId>, StoreError> {
            Ok(Vec::new())
        }

        async fn lock_and_fetch(&self, id: &TaskId) -> Result<(Task, LockToken), StoreError> {
            Err(StoreError::NotFound(*id))
        }

        async fn remove_if_token_valid(
            &self,
            id: &TaskId,
            _token: LockToken,
        ) -> Result<(), StoreError> {
            Err(StoreError::NotFound(*id))
        }

        async fn len(&self) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn insert_failures_do_not_halt_the_loop() {
        let producer = Producer::new(
            Arc::new(Refusing),
            Arc::new(UlidGenerator::new(SystemClock)),
            Arc::new(SystemClock),
            settings(4),
        )
        .unwrap();

        let report = producer.run(StopListener::never()).await;
        assert_eq!(report, ProducerReport { inserted: 0, failed: 4 });
    }

    #[tokio::test]
    async fn unrepresentable_due_time_is_counted_as_failed() {
        // any lead time overflows from the last representable instant
        let clock = Arc::new(ManualClock::new(chrono::DateTime::<Utc>::MAX_UTC));
        let store = Arc::new(InMemoryTaskStore::new(clock.clone(), Duration::from_secs(15)));
        let producer = Producer::new(
            store.clone(),
            Arc::new(UlidGenerator::new(SystemClock)),
            clock,
            settings(2),
        )
        .unwrap();

        let report = producer.run(StopListener::never()).await;
        assert_eq!(report, ProducerReport { inserted: 0, failed: 2 });
        assert!(store.is_empty().await.unwrap());
    }

    #[test]
    fn zero_max_count_is_rejected() {
        let result = Producer::new(
            Arc::new(Refusing),
            Arc::new(UlidGenerator::new(SystemClock)),
            Arc::new(SystemClock),
            settings(0),
        );
        assert!(matches!(result, Err(ConfigError::NoTasksToProduce)));
    }
}
