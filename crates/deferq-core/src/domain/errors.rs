//! エラー型と運用上の分類

use thiserror::Error;

use super::ids::TaskId;

/// ErrorKind は失敗を ClaimLoop がどう扱うかを決める
///
/// - Contention: 並行実行では想定内（ロック競合、古い token）。カウントのみで
///   致命的ではない
/// - Infrastructure: ストアの異常・到達不能。ログを出して一定時間待つ
/// - Validation: 呼び出し側の引数が不正。即座に呼び出し元へ返す
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Contention,
    Infrastructure,
    Validation,
}

/// Task construction errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("execute_at must not be the zero time")]
    ZeroExecuteAt,

    #[error("execute_at is outside the representable time range")]
    ExecuteAtOutOfRange,

    #[error("invalid task id: {0}")]
    InvalidId(String),
}

/// Failures reported by a `TaskStore`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("task {0} already exists")]
    AlreadyExists(TaskId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("task {0} is locked by another holder")]
    AlreadyLocked(TaskId),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("lock token for task {0} is no longer valid")]
    TokenInvalid(TaskId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::AlreadyLocked(_)
            | StoreError::TokenInvalid(_)
            | StoreError::NotFound(_) => ErrorKind::Contention,
            StoreError::AlreadyExists(_) | StoreError::InvalidArgument(_) => ErrorKind::Validation,
            StoreError::Unavailable(_) => ErrorKind::Infrastructure,
        }
    }
}

impl From<TaskError> for StoreError {
    fn from(err: TaskError) -> Self {
        StoreError::InvalidArgument(err.to_string())
    }
}
