//! Per-user session state: the single in-flight action flag.
//!
//! Idle sessions live in a moka cache and may be evicted at any time. A
//! session with an action running is also pinned in the registry's active
//! map, which is the source of truth for exclusion, so eviction can never
//! hand out a second unlocked session for the same user.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use moka::future::Cache;

type ActiveMap = Mutex<HashMap<u64, Arc<UserSession>>>;

fn lock(active: &ActiveMap) -> MutexGuard<'_, HashMap<u64, Arc<UserSession>>> {
    // The map holds no invariant a panicking holder could break halfway.
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct UserSession {
    processing: AtomicBool,
}

impl UserSession {
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }
}

/// Clears the in-flight flag and unpins the session when the action ends,
/// however it ends.
#[derive(Debug)]
pub struct ProcessingGuard {
    user_id: u64,
    session: Arc<UserSession>,
    active: Arc<ActiveMap>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        let mut active = lock(&self.active);
        if active
            .get(&self.user_id)
            .is_some_and(|s| Arc::ptr_eq(s, &self.session))
        {
            active.remove(&self.user_id);
        }
        self.session.processing.store(false, Ordering::Release);
    }
}

/// Sessions expire after a period of inactivity, except while an action runs.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Cache<u64, Arc<UserSession>>,
    active: Arc<ActiveMap>,
}

impl SessionRegistry {
    pub fn new(idle: Duration) -> Self {
        Self::with_capacity(idle, 100_000)
    }

    pub fn with_capacity(idle: Duration, max_capacity: u64) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_idle(idle)
                .build(),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn session(&self, user_id: u64) -> Arc<UserSession> {
        if let Some(pinned) = lock(&self.active).get(&user_id).cloned() {
            return pinned;
        }
        self.sessions
            .get_with(user_id, async { Arc::new(UserSession::default()) })
            .await
    }

    /// Claims the user's session, or returns `None` if an action is already running.
    pub async fn try_begin(&self, user_id: u64) -> Option<ProcessingGuard> {
        let cached = self
            .sessions
            .get_with(user_id, async { Arc::new(UserSession::default()) })
            .await;

        let mut active = lock(&self.active);
        if active.contains_key(&user_id) {
            return None;
        }
        cached
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        active.insert(user_id, Arc::clone(&cached));

        Some(ProcessingGuard {
            user_id,
            session: cached,
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_processing(&self, user_id: u64) -> bool {
        lock(&self.active).contains_key(&user_id)
    }

    #[cfg(test)]
    async fn run_pending_tasks(&self) {
        self.sessions.run_pending_tasks().await;
    }
}
