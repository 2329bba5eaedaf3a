//! Static configuration.
//!
//! There is no dynamic reconfiguration: binaries build `Settings::default()`
//! and validate it once at startup. A failed validation is a setup failure.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Maximum time the store keeps a lock when the caller asks for the default.
pub const DEFAULT_MAX_LOCK_DURATION: Duration = Duration::from_secs(15);

/// Pause after an empty or failed discovery pass.
pub const DEFAULT_IDLE_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("consumer count must be at least 1")]
    NoConsumers,

    #[error("producer max count must be at least 1")]
    NoTasksToProduce,

    #[error("jitter multiplier must be a finite, non-negative number (got {0})")]
    InvalidJitter(f64),

    #[error(
        "lock duration {lock:?} must exceed the maximum processing time {processing:?}, \
         otherwise a lock can expire mid-task and the task runs twice"
    )]
    LockShorterThanProcessing { lock: Duration, processing: Duration },

    #[error("discovery batch size must be at least 1")]
    InvalidBatchSize,

    #[error("processing time {processing:?} with jitter {jitter} is out of range")]
    ProcessingTimeOutOfRange { processing: Duration, jitter: f64 },

    #[error("producer lead time {0:?} is out of range")]
    LeadTimeOutOfRange(Duration),

    #[error("store {0} must not be empty")]
    MissingStoreField(&'static str),
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreSettings {
    pub host: String,
    pub bucket: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub max_lock_duration: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            bucket: "timed_tasks".to_string(),
            username: "timed_tasks".to_string(),
            password: "timed_tasks_pwd".to_string(),
            max_lock_duration: DEFAULT_MAX_LOCK_DURATION,
        }
    }
}

impl StoreSettings {
    /// Connection string with credentials masked, for logging.
    pub fn redacted_target(&self) -> String {
        format!("couchbase://{}:***@{}/{}", self.username, self.host, self.bucket)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProducerSettings {
    /// Pause between two inserts.
    pub interval: Duration,
    /// How far in the future each task becomes due.
    pub lead_time: Duration,
    pub max_count: u64,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(20),
            lead_time: Duration::from_millis(500),
            max_count: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumerSettings {
    /// Number of claim loops running in parallel. Also the discovery batch
    /// size.
    pub consumers: usize,
    /// Base duration of the simulated work.
    pub processing_time: Duration,
    /// Processing takes `base + rand() * base * jitter_multiplier`.
    pub jitter_multiplier: f64,
    /// Stop a loop as soon as discovery comes back empty.
    pub terminate_when_drained: bool,
    pub idle_pause: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            consumers: 10,
            processing_time: Duration::from_millis(200),
            jitter_multiplier: 0.25,
            terminate_when_drained: true,
            idle_pause: DEFAULT_IDLE_PAUSE,
        }
    }
}

impl ConsumerSettings {
    /// Upper bound of the simulated processing time, `None` when
    /// `base * (1 + jitter)` is not a representable duration.
    pub fn max_processing_time(&self) -> Option<Duration> {
        scaled(self.processing_time, 1.0 + self.jitter_multiplier)
    }
}

/// `base * factor`, or `None` for a negative, non-finite or overflowing
/// result.
pub(crate) fn scaled(base: Duration, factor: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(base.as_secs_f64() * factor).ok()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    pub store: StoreSettings,
    pub producer: ProducerSettings,
    pub consumer: ConsumerSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.host.is_empty() {
            return Err(ConfigError::MissingStoreField("host"));
        }
        if self.store.bucket.is_empty() {
            return Err(ConfigError::MissingStoreField("bucket"));
        }
        if self.consumer.consumers == 0 {
            return Err(ConfigError::NoConsumers);
        }
        if self.producer.max_count == 0 {
            return Err(ConfigError::NoTasksToProduce);
        }
        let jitter = self.consumer.jitter_multiplier;
        if !jitter.is_finite() || jitter < 0.0 {
            return Err(ConfigError::InvalidJitter(jitter));
        }
        let processing = self.consumer.max_processing_time().ok_or(
            ConfigError::ProcessingTimeOutOfRange {
                processing: self.consumer.processing_time,
                jitter,
            },
        )?;
        if processing >= self.store.max_lock_duration {
            return Err(ConfigError::LockShorterThanProcessing {
                lock: self.store.max_lock_duration,
                processing,
            });
        }
        Ok(())
    }
}
