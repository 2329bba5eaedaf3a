//! InMemoryTaskStore - a `TaskStore` living inside the process.
//!
//! Models a document store with CAS-guarded locking:
//! - every document carries a CAS value that changes on each lock;
//! - while a lock is live, the CAS handed out with it is the lock token;
//! - a lock dies when it reaches the maximum lock duration, which makes the
//!   task discoverable again and invalidates the old token.
//!
//! All state sits behind one mutex, so every operation is linearizable and
//! discovery always sees acknowledged writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::StoreSettings;
use crate::domain::{LockToken, StoreError, Task, TaskId};
use crate::ports::{Clock, SystemClock, TaskStore};

/// Upper bound for lock lifetimes that do not fit a chrono duration.
const LOCK_TTL_CAP_DAYS: i64 = 365;

#[derive(Debug)]
struct Document {
    task: Task,
    cas: u64,
    locked_until: Option<DateTime<Utc>>,
}

impl Document {
    fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

#[derive(Debug, Default)]
struct InMemoryStoreState {
    documents: HashMap<TaskId, Document>,
    next_cas: u64,
}

impl InMemoryStoreState {
    fn allocate_cas(&mut self) -> u64 {
        self.next_cas += 1;
        self.next_cas
    }
}

pub struct InMemoryTaskStore {
    state: Mutex<InMemoryStoreState>,
    clock: Arc<dyn Clock>,
    lock_ttl: chrono::Duration,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>, max_lock_duration: Duration) -> Self {
        let lock_ttl = chrono::Duration::from_std(max_lock_duration)
            .unwrap_or_else(|_| chrono::Duration::days(LOCK_TTL_CAP_DAYS));
        Self {
            state: Mutex::new(InMemoryStoreState::default()),
            clock,
            lock_ttl,
        }
    }

    /// Open the store described by `settings`.
    ///
    /// Setup failures are fatal for the caller; there is no degraded mode.
    pub fn connect(settings: &StoreSettings) -> Result<Self, StoreError> {
        if settings.host.is_empty() || settings.bucket.is_empty() {
            return Err(StoreError::Unavailable(
                "store host and bucket must be configured".to_string(),
            ));
        }
        info!(store = %settings.redacted_target(), "connecting to task store");
        Ok(Self::new(Arc::new(SystemClock), settings.max_lock_duration))
    }

    fn lock_deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.lock_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let id = task.id();
        if state.documents.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        let cas = state.allocate_cas();
        state.documents.insert(
            id,
            Document {
                task,
                cas,
                locked_until: None,
            },
        );
        Ok(())
    }

    async fn query_due_unlocked(&self, limit: usize) -> Result<Vec<TaskId>, StoreError> {
        if limit == 0 {
            return Err(StoreError::InvalidArgument(
                "limit must be greater than 0".to_string(),
            ));
        }
        let now = self.clock.now();
        let state = self.state.lock().await;

        let mut due: Vec<&Task> = state
            .documents
            .values()
            .filter(|doc| doc.task.is_due(now) && !doc.is_locked(now))
            .map(|doc| &doc.task)
            .collect();
        // oldest due first; ULIDs break ties in creation order
        due.sort_by_key(|task| (task.execute_at_millis(), task.id()));

        Ok(due.into_iter().take(limit).map(Task::id).collect())
    }

    async fn lock_and_fetch(&self, id: &TaskId) -> Result<(Task, LockToken), StoreError> {
        let now = self.clock.now();
        let deadline = self.lock_deadline(now);
        let mut state = self.state.lock().await;

        let cas = state.allocate_cas();
        let doc = state
            .documents
            .get_mut(id)
            .ok_or(StoreError::NotFound(*id))?;
        if doc.is_locked(now) {
            return Err(StoreError::AlreadyLocked(*id));
        }

        doc.cas = cas;
        doc.locked_until = Some(deadline);
        Ok((doc.task.clone(), LockToken::new(cas)))
    }

    async fn remove_if_token_valid(
        &self,
        id: &TaskId,
        token: LockToken,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let doc = state.documents.get(id).ok_or(StoreError::NotFound(*id))?;
        if !doc.is_locked(now) || doc.cas != token.value() {
            return Err(StoreError::TokenInvalid(*id));
        }
        state.documents.remove(id);
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.state.lock().await.documents.len())
    }
}
