//! IdGenerator port - タスク ID 生成
//!
//! producer 同士は協調しないため、中央の採番なしで一意な ID が必要。
//! ULID はこれを満たし、作成時刻順にソートできる。

use ulid::Ulid;

use crate::domain::TaskId;
use crate::ports::Clock;

/// IdGenerator はタスク ID を発行
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

/// UlidGenerator はタイムスタンプ部を `Clock` から取る ULID 生成器
///
/// ランダム部は `rand` で埋めるので、同一ミリ秒内でも実質的に衝突しない。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        TaskId::from(ulid)
    }
}
