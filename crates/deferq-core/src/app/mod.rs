//! App - producer、claim プロトコル、実行統計
//!
//! # 主要コンポーネント
//! - **Producer**: `lead_time` 後に期限が来るタスクを投入
//! - **ClaimLoop**: discover → lock → process → remove（consumer ごとに1本）
//! - **ConsumerCluster**: ClaimLoop を起動し、終了後に統計を回収
//! - **StatsReport**: 重複実行の検出と効率指標

pub mod cluster;
pub mod consumer_loop;
pub mod processor;
pub mod producer_loop;
pub mod shutdown;
pub mod stats;

pub use self::cluster::ConsumerCluster;
pub use self::consumer_loop::{ClaimLoop, ClaimOptions};
pub use self::processor::{SimulatedProcessor, TaskProcessor};
pub use self::producer_loop::{Producer, ProducerReport};
pub use self::shutdown::{ShutdownSignal, StopListener};
pub use self::stats::{ConsumerRow, ConsumerStats, StatsReport};
