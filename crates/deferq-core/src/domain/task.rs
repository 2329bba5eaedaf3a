use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::TaskError;
use super::ids::TaskId;

/// One unit of deferred work.
///
/// Immutable after construction: there are no setters, and the lock state
/// lives in the store rather than on the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,

    /// Earliest time at which the task may be claimed.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    execute_at: DateTime<Utc>,

    content: String,
}

impl Task {
    pub fn new(
        id: TaskId,
        execute_at: DateTime<Utc>,
        content: impl Into<String>,
    ) -> Result<Self, TaskError> {
        if execute_at.timestamp_millis() == 0 {
            return Err(TaskError::ZeroExecuteAt);
        }
        Ok(Self {
            id,
            execute_at,
            content: content.into(),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn execute_at(&self) -> DateTime<Utc> {
        self.execute_at
    }

    /// Due time as milliseconds since the epoch (the stored representation).
    pub fn execute_at_millis(&self) -> i64 {
        self.execute_at.timestamp_millis()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Is the task eligible for claiming at `now`?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.execute_at_millis() <= now.timestamp_millis()
    }
}
