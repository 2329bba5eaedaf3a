//! TaskStore port - producer と全 consumer が共有するストア
//!
//! consumer 間の唯一の協調点。ClaimLoop の正しさは、実装が下記の契約を
//! 守る範囲でのみ成り立つ。
//!
//! # 契約
//! - 各操作は並行呼び出しに対してアトミック
//! - ロック取得は線形化可能：ある id について有効な `LockToken` を持つのは
//!   任意の時点で高々1者
//! - token が無効化された後（失効・上書き）の条件付き削除は決して成功しない
//! - `query_due_unlocked` は read-your-writes：呼び出し前に確定した書き込みは
//!   すべて見える
//!
//! CAS 付き get-and-lock を持つドキュメントストア、バージョン検査付き書き込み
//! の KVS、`SELECT ... FOR UPDATE SKIP LOCKED` を使う RDB のいずれでも実装できる。

use async_trait::async_trait;

use crate::domain::{LockToken, StoreError, Task, TaskId};

/// TaskStore はタスクの正本であり、ロックの権威
///
/// # 設計原則
/// - ロック token を発行・検証できるのはストアだけ
/// - consumer 側はロック状態を持たない（Task にもロック情報はない）
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new, unlocked task.
    ///
    /// Fails with `AlreadyExists` when the id collides.
    async fn insert(&self, task: Task) -> Result<(), StoreError>;

    /// Ids of up to `limit` unlocked tasks whose due time has passed,
    /// oldest due time first.
    ///
    /// Fails with `InvalidArgument` when `limit` is zero.
    async fn query_due_unlocked(&self, limit: usize) -> Result<Vec<TaskId>, StoreError>;

    /// Lock the task for the store's maximum lock duration and return its
    /// body with the token proving ownership.
    ///
    /// Fails with `AlreadyLocked` while another holder owns a live lock and
    /// `NotFound` when the task is gone.
    async fn lock_and_fetch(&self, id: &TaskId) -> Result<(Task, LockToken), StoreError>;

    /// Delete the task if `token` is still its current, live lock token.
    ///
    /// Fails with `TokenInvalid` for a stale token and `NotFound` when the task
    /// was already removed.
    async fn remove_if_token_valid(&self, id: &TaskId, token: LockToken)
        -> Result<(), StoreError>;

    /// Number of stored tasks, locked or not.
    async fn len(&self) -> Result<usize, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}
