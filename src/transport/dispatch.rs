//! Handler dispatch policy.
//!
//! Every inbound message runs its handler on its own tokio task. By default
//! the number of concurrently running handlers is unbounded: a peer that
//! sends many small messages can spawn an unbounded number of tasks.
//! [`DispatchMode::Bounded`] caps in-flight handlers with a semaphore; the
//! read loop waits for a free permit before reading on, which pushes back
//! on the peer through the socket.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{trace, warn};

// ============================================================================
// DispatchMode
// ============================================================================

/// How handler invocations are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Spawn one task per message with no limit.
    #[default]
    Unbounded,

    /// Allow at most this many handler tasks in flight.
    Bounded(usize),
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Spawns handler futures according to a [`DispatchMode`].
#[derive(Debug, Clone)]
pub(crate) enum Dispatcher {
    /// Plain `tokio::spawn`.
    Unbounded,

    /// Semaphore-gated spawn.
    Bounded {
        /// Permits for in-flight handlers.
        permits: Arc<Semaphore>,
        /// Total number of permits.
        limit: usize,
    },
}

impl Dispatcher {
    /// Creates a dispatcher for the given mode.
    ///
    /// A bound of zero is rejected by option validation before this point.
    pub(crate) fn new(mode: DispatchMode) -> Self {
        match mode {
            DispatchMode::Unbounded => Self::Unbounded,
            DispatchMode::Bounded(limit) => Self::Bounded {
                permits: Arc::new(Semaphore::new(limit)),
                limit,
            },
        }
    }

    /// Runs `task` on a new tokio task.
    ///
    /// Returns once the task is spawned, never waiting for it to finish.
    /// In bounded mode this first waits for a free slot; if the semaphore
    /// has been closed the task is dropped without running.
    pub(crate) async fn dispatch<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self {
            Self::Unbounded => {
                tokio::spawn(task);
            }
            Self::Bounded { permits, limit } => {
                if permits.available_permits() == 0 {
                    trace!(limit, "Dispatch saturated, waiting for a handler to finish");
                }

                match Arc::clone(permits).acquire_owned().await {
                    Ok(permit) => {
                        tokio::spawn(async move {
                            task.await;
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Dispatch semaphore closed, dropping handler");
                    }
                }
            }
        }
    }

    /// Returns the number of handler tasks currently holding a slot.
    ///
    /// Always `None` for unbounded dispatch.
    #[must_use]
    pub(crate) fn in_flight(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Bounded { permits, limit } => Some(limit - permits.available_permits()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::mpsc;

    #[test]
    fn test_default_mode_is_unbounded() {
        assert_eq!(DispatchMode::default(), DispatchMode::Unbounded);
        assert!(Dispatcher::new(DispatchMode::Unbounded).in_flight().is_none());
    }

    #[tokio::test]
    async fn test_unbounded_runs_every_task() {
        let dispatcher = Dispatcher::new(DispatchMode::Unbounded);
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..10 {
            let tx = tx.clone();
            dispatcher
                .dispatch(async move {
                    let _ = tx.send(i);
                })
                .await;
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(i) = rx.recv().await {
            seen.push(i);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_bounded_caps_in_flight_tasks() {
        let dispatcher = Dispatcher::new(DispatchMode::Bounded(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let done_tx = done_tx.clone();
            dispatcher
                .dispatch(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    let _ = done_tx.send(());
                })
                .await;
            assert!(dispatcher.in_flight().unwrap_or(0) <= 2);
        }
        drop(done_tx);

        let mut finished = 0;
        while done_rx.recv().await.is_some() {
            finished += 1;
        }
        assert_eq!(finished, 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_bounded_releases_slot_after_completion() {
        let dispatcher = Dispatcher::new(DispatchMode::Bounded(1));
        let (tx, rx) = tokio::sync::oneshot::channel();

        dispatcher
            .dispatch(async move {
                let _ = tx.send(());
            })
            .await;
        rx.await.expect("task should run");

        // Give the spawned task a chance to drop its permit.
        for _ in 0..10 {
            if dispatcher.in_flight() == Some(0) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(dispatcher.in_flight(), Some(0));
    }

    #[tokio::test]
    async fn test_closed_semaphore_never_exceeds_bound() {
        let dispatcher = Dispatcher::new(DispatchMode::Bounded(1));
        let Dispatcher::Bounded { permits, .. } = &dispatcher else {
            panic!("bounded mode expected");
        };
        permits.close();

        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            dispatcher
                .dispatch(async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
