//! ClaimLoop - タスク取得・実行ループ
//!
//! # フロー
//! 1. `query_due_unlocked(batch_size)` で候補 id を取得（期限の古い順）
//! 2. 候補を順に `lock_and_fetch`、最初に取れたものを採用
//! 3. 取得したタスクを処理
//! 4. 2 で得た token で `remove_if_token_valid`
//!
//! consumer 同士は通信しない。同じタスクの二重実行を防ぐのはストアのロック
//! だけなので、ロックに失敗した候補は読み飛ばし、次の discovery まで再試行
//! しない。

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, error, info, info_span, warn};

use super::processor::TaskProcessor;
use super::shutdown::StopListener;
use super::stats::ConsumerStats;
use crate::config::{ConfigError, ConsumerSettings, DEFAULT_IDLE_PAUSE};
use crate::domain::{ErrorKind, LockToken, StoreError, Task, TaskId};
use crate::ports::TaskStore;

#[derive(Debug, Clone)]
pub struct ClaimOptions {
    /// Candidates asked for per discovery pass. Sized to the number of
    /// concurrent consumers so that each has a fair chance to find an
    /// unlocked task in its batch.
    pub batch_size: usize,
    /// Exit when discovery finds nothing instead of polling forever.
    pub terminate_when_drained: bool,
    /// Fixed pause after an empty or failed discovery pass.
    pub idle_pause: Duration,
}

impl ClaimOptions {
    pub fn from_settings(settings: &ConsumerSettings) -> Self {
        Self {
            batch_size: settings.consumers,
            terminate_when_drained: settings.terminate_when_drained,
            idle_pause: settings.idle_pause,
        }
    }
}

impl Default for ClaimOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            terminate_when_drained: true,
            idle_pause: DEFAULT_IDLE_PAUSE,
        }
    }
}

/// ClaimLoop は1 consumer 分の claim プロトコルを実行
///
/// # 終了条件
/// - イテレーション先頭で停止要求を観測
/// - `terminate_when_drained` のとき discovery が空
///
/// `run` の完了がループの唯一の完了通知で、返した統計はもう触らない。
pub struct ClaimLoop {
    consumer: usize,
    store: Arc<dyn TaskStore>,
    processor: Arc<dyn TaskProcessor>,
    options: ClaimOptions,
}

impl ClaimLoop {
    pub fn new(
        consumer: usize,
        store: Arc<dyn TaskStore>,
        processor: Arc<dyn TaskProcessor>,
        options: ClaimOptions,
    ) -> Result<Self, ConfigError> {
        if options.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        Ok(Self {
            consumer,
            store,
            processor,
            options,
        })
    }

    /// Run until stopped (or drained, when configured).
    ///
    /// Resolving is the loop's one completion signal; the returned stats are
    /// never touched by the loop again.
    pub async fn run(self, stop: StopListener) -> ConsumerStats {
        let span = info_span!("consumer", consumer = self.consumer);
        self.run_inner(stop).instrument(span).await
    }

    async fn run_inner(self, stop: StopListener) -> ConsumerStats {
        let mut stats = ConsumerStats::new(self.consumer);

        loop {
            if stop.is_stopped() {
                info!("stop requested");
                break;
            }

            let candidates = match self.store.query_due_unlocked(self.options.batch_size).await {
                Ok(ids) => ids,
                Err(err) => {
                    warn!(error = %err, kind = ?err.kind(), "discovery failed");
                    tokio::time::sleep(self.options.idle_pause).await;
                    continue;
                }
            };

            if candidates.is_empty() {
                stats.record_empty_discovery();
                info!("no tasks found");
                if self.options.terminate_when_drained {
                    break;
                }
                tokio::time::sleep(self.options.idle_pause).await;
                continue;
            }
            stats.record_candidates(candidates.len());

            let Some((task, token)) = self.claim_first(&candidates, &mut stats).await else {
                stats.record_could_not_lock_any();
                info!(candidates = candidates.len(), "could not lock any task");
                continue;
            };

            self.processor.process(&task).await;

            match self.store.remove_if_token_valid(&task.id(), token).await {
                Ok(()) => {
                    stats.record_processed(task.id());
                    info!(task_id = %task.id(), "removed task");
                }
                Err(err) => Self::record_removal_error(&task, &err, &mut stats),
            }
        }

        stats
    }

    /// Nothing is retried: the task stays in the store and becomes claimable
    /// again when its lock expires.
    fn record_removal_error(task: &Task, err: &StoreError, stats: &mut ConsumerStats) {
        match err.kind() {
            // stale token or task already gone: the lock expired during
            // processing and another consumer may run this task too
            ErrorKind::Contention => {
                stats.record_removal_failure();
                error!(task_id = %task.id(), error = %err, "lock lost before removal");
            }
            ErrorKind::Infrastructure | ErrorKind::Validation => {
                stats.record_removal_error();
                warn!(task_id = %task.id(), error = %err, "failed to remove task");
            }
        }
    }

    /// Try the candidates in discovery order; first lock wins.
    async fn claim_first(
        &self,
        candidates: &[TaskId],
        stats: &mut ConsumerStats,
    ) -> Option<(Task, LockToken)> {
        for (locked_before, id) in candidates.iter().enumerate() {
            match self.store.lock_and_fetch(id).await {
                Ok(claimed) => {
                    debug!(task_id = %id, locked_before, "locked task");
                    return Some(claimed);
                }
                Err(err) => {
                    stats.record_already_locked();
                    debug!(task_id = %id, error = %err, "could not lock task");
                }
            }
        }
        None
    }
}
