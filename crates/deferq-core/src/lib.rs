//! deferq-core
//!
//! 遅延実行タスクキュー。独立した consumer が共有ストア上の期限到来タスクを
//! 奪い合い、各タスクは高々1回だけ実行される。
//!
//! # モジュール構成
//! - **domain**: Task, TaskId, LockToken, エラー型
//! - **ports**: TaskStore, Clock, IdGenerator
//! - **impls**: InMemoryTaskStore
//! - **app**: Producer, ClaimLoop, ConsumerCluster, StatsReport
//! - **config**: 静的設定とその検証

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
