//! Domain - タスク、識別子、エラー型

pub mod errors;
pub mod ids;
pub mod task;

pub use self::errors::{ErrorKind, StoreError, TaskError};
pub use self::ids::{LockToken, TaskId};
pub use self::task::Task;
