//! Synchronisation set shared by all actors
//!
//! Mutual exclusion and wake-up notification are kept apart: a
//! [`std::sync::Mutex`] guards [`SharedState`], and counting
//! [`tokio::sync::Semaphore`]s carry the wake-ups. Semaphores start with no
//! permits, so a signal delivered before the matching wait is never lost.
//!
//! The mutex guard is not `Send`, which keeps every critical section free of
//! `.await` points: simulated work can never run while the lock is held.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::Semaphore;
use tracing::{trace, warn};

use crate::error::{SmokerError, SmokerResult};
use crate::logger::StateLogger;
use crate::state::{AgentStatus, SharedState, SmokerId, NUM_SMOKERS};

/// Mutex over the shared record plus the per-smoker and agent wake-up
/// semaphores.
#[derive(Debug)]
pub struct SynchronizationSet {
    mutex: Mutex<SharedState>,
    ingredients_ready: [Semaphore; NUM_SMOKERS],
    cigarette_ready: Semaphore,
}

impl SynchronizationSet {
    /// Create a set guarding a fresh [`SharedState`].
    pub fn new() -> Self {
        Self::with_state(SharedState::new())
    }

    /// Create a set guarding the given initial state.
    pub fn with_state(state: SharedState) -> Self {
        Self {
            mutex: Mutex::new(state),
            ingredients_ready: std::array::from_fn(|_| Semaphore::new(0)),
            cigarette_ready: Semaphore::new(0),
        }
    }

    fn lock(&self) -> SmokerResult<MutexGuard<'_, SharedState>> {
        self.mutex.lock().map_err(|_| SmokerError::MutexPoisoned)
    }

    /// Run `f` under the mutex, then persist a snapshot before the mutex is
    /// released.
    pub fn critical_section<R>(
        &self,
        logger: &dyn StateLogger,
        f: impl FnOnce(&mut SharedState) -> R,
    ) -> SmokerResult<R> {
        let mut guard = self.lock()?;
        let result = f(&mut guard);
        logger.save_state(&guard)?;
        Ok(result)
    }

    /// Copy of the current state, taken under the mutex without persisting.
    pub fn snapshot(&self) -> SmokerResult<SharedState> {
        Ok(self.lock()?.clone())
    }

    //-------------------------------------------------------------------------
    // ingredientsReady[id]
    //-------------------------------------------------------------------------

    /// Block until `ingredients_ready[id]` is signalled. No timeout.
    pub async fn wait_ingredients(&self, id: SmokerId) -> SmokerResult<()> {
        let permit = self.ingredients_ready[id.index()]
            .acquire()
            .await
            .map_err(|_| SmokerError::SemaphoreClosed {
                name: format!("ingredients_ready[{id}]"),
            })?;
        permit.forget();
        trace!(smoker = %id, "ingredients_ready consumed");
        Ok(())
    }

    /// Wake exactly smoker `id`.
    pub fn signal_ingredients(&self, id: SmokerId) {
        self.ingredients_ready[id.index()].add_permits(1);
    }

    //-------------------------------------------------------------------------
    // cigaretteReady
    //-------------------------------------------------------------------------

    /// Block until some smoker reports a rolled cigarette.
    pub async fn wait_cigarette(&self) -> SmokerResult<()> {
        let permit = self
            .cigarette_ready
            .acquire()
            .await
            .map_err(|_| SmokerError::SemaphoreClosed {
                name: "cigarette_ready".to_string(),
            })?;
        permit.forget();
        Ok(())
    }

    pub fn signal_cigarette(&self) {
        self.cigarette_ready.add_permits(1);
    }

    //-------------------------------------------------------------------------
    // Shutdown
    //-------------------------------------------------------------------------

    /// Two-phase cancellation: set the closing flag under the mutex, then wake
    /// every smoker once so each can observe it.
    ///
    /// Smokers blocked on their semaphore cannot see `closing` until woken,
    /// so skipping the broadcast would leave them blocked forever.
    pub fn close_factory(&self, logger: &dyn StateLogger) -> SmokerResult<()> {
        self.critical_section(logger, |state| {
            state.closing = true;
            state.agent_status = AgentStatus::Closing;
        })?;
        for id in SmokerId::all() {
            self.signal_ingredients(id);
        }
        Ok(())
    }

    /// Tear the semaphores down. Every pending and future wait fails with
    /// [`SmokerError::SemaphoreClosed`].
    pub fn destroy(&self) {
        warn!("closing every semaphore in the synchronisation set");
        for semaphore in &self.ingredients_ready {
            semaphore.close();
        }
        self.cigarette_ready.close();
    }

    pub fn is_destroyed(&self) -> bool {
        self.cigarette_ready.is_closed()
    }
}

impl Default for SynchronizationSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::InMemoryStateLogger;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_critical_section_persists_before_release() {
        let sync = SynchronizationSet::new();
        let logger = InMemoryStateLogger::new();

        sync.critical_section(&logger, |state| state.ingredient_count[1] += 1)
            .unwrap();

        let snapshots = logger.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].ingredient_count, [0, 1, 0]);
        assert_eq!(sync.snapshot().unwrap(), snapshots[0]);
    }

    #[test]
    fn test_poisoned_mutex_is_fatal() {
        let sync = Arc::new(SynchronizationSet::new());
        let logger = Arc::new(InMemoryStateLogger::new());

        let poisoner = {
            let sync = Arc::clone(&sync);
            let logger = Arc::clone(&logger);
            std::thread::spawn(move || {
                let _ = sync.critical_section(logger.as_ref(), |_| panic!("holder died"));
            })
        };
        assert!(poisoner.join().is_err());

        let err = sync
            .critical_section(logger.as_ref(), |_| ())
            .unwrap_err();
        assert!(matches!(err, SmokerError::MutexPoisoned));
    }

    #[tokio::test]
    async fn test_signal_before_wait_is_not_lost() {
        let sync = SynchronizationSet::new();
        let id = SmokerId::new(2).unwrap();

        sync.signal_ingredients(id);
        tokio::time::timeout(Duration::from_secs(1), sync.wait_ingredients(id))
            .await
            .expect("permit was banked")
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_factory_wakes_every_smoker() {
        let sync = SynchronizationSet::new();
        let logger = InMemoryStateLogger::new();

        sync.close_factory(&logger).unwrap();

        for id in SmokerId::all() {
            tokio::time::timeout(Duration::from_secs(1), sync.wait_ingredients(id))
                .await
                .expect("close_factory signals each smoker")
                .unwrap();
        }
        let state = sync.snapshot().unwrap();
        assert!(state.closing);
        assert_eq!(state.agent_status, AgentStatus::Closing);
    }

    #[tokio::test]
    async fn test_destroy_fails_pending_waits() {
        let sync = Arc::new(SynchronizationSet::new());
        let id = SmokerId::new(0).unwrap();

        let waiter = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.wait_ingredients(id).await })
        };
        tokio::task::yield_now().await;
        sync.destroy();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, SmokerError::SemaphoreClosed { .. }));
        assert!(sync.is_destroyed());
        assert!(sync.wait_cigarette().await.is_err());
    }
}
