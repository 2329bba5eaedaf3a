//! TaskProcessor - ClaimLoop が保護する「処理」そのもの
//!
//! プロトコルから見ると処理はブラックボックスで、必ず完了する前提。

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{ConsumerSettings, scaled};
use crate::domain::Task;

#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, task: &Task);
}

/// Simulated work: sleeps `base + rand() * base * jitter_multiplier`.
#[derive(Debug, Clone)]
pub struct SimulatedProcessor {
    base: Duration,
    jitter_multiplier: f64,
}

impl SimulatedProcessor {
    /// A negative or non-finite multiplier means no jitter.
    pub fn new(base: Duration, jitter_multiplier: f64) -> Self {
        let jitter_multiplier = if jitter_multiplier.is_finite() {
            jitter_multiplier.max(0.0)
        } else {
            0.0
        };
        Self {
            base,
            jitter_multiplier,
        }
    }

    pub fn from_settings(settings: &ConsumerSettings) -> Self {
        Self::new(settings.processing_time, settings.jitter_multiplier)
    }

    fn delay(&self) -> Duration {
        let jitter = rand::random::<f64>() * self.jitter_multiplier;
        scaled(self.base, 1.0 + jitter).unwrap_or(Duration::MAX)
    }
}

#[async_trait]
impl TaskProcessor for SimulatedProcessor {
    async fn process(&self, task: &Task) {
        tokio::time::sleep(self.delay()).await;
        info!(task_id = %task.id(), content = task.content(), "processed task");
    }
}
