//! Ports - claim プロトコルと外界との境界
//!
//! 各 trait が外部依存（共有ストア、現在時刻、id 生成）を1つずつ隠す。
//! テストではインメモリ実装、本番では実ストアに差し替える。

pub mod clock;
pub mod id_generator;
pub mod task_store;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::TaskStore;
