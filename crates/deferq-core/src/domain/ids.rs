//! Domain identifiers
//!
//! タスク ID は ULID：producer 間の協調なしに一意で、作成時刻順に
//! 辞書順ソートできる。
//!
//! `LockToken` はロック所有の証明。ClaimLoop にとっては不透明な値で、
//! 解釈できるのは発行したストアだけ。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use super::errors::TaskError;

/// Identifier of a Task (the store's primary key).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Ulid);

impl TaskId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Parse an id coming from outside the process (store rows, logs).
    ///
    /// Empty and malformed ids are rejected here so that store operations
    /// never see them.
    pub fn parse(value: &str) -> Result<Self, TaskError> {
        if value.is_empty() {
            return Err(TaskError::InvalidId("task id must not be empty".to_string()));
        }
        Ulid::from_string(value)
            .map(Self)
            .map_err(|e| TaskError::InvalidId(format!("{value}: {e}")))
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl FromStr for TaskId {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque proof of ownership of a task's lock.
///
/// A token is only meaningful for the task it was issued for, and only until
/// the lock expires or is superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(u64);

impl LockToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cas-{}", self.0)
    }
}
