//! Cooperative shutdown.
//!
//! An [`AbortSignal`] tells a listening application to stop accepting
//! requests. The application then waits for its [`HandlingSet`] to drain
//! before closing the transport, so no in-flight request is cut short.
//!
//! # Example
//!
//! ```rust
//! use daedalus_server::AbortSignal;
//!
//! let signal = AbortSignal::new();
//! let clone = signal.clone();
//!
//! clone.abort();
//! assert!(signal.is_aborted());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};

/// A cloneable, one-way abort flag that can be awaited.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl AbortSignal {
    /// Creates a signal that has not been aborted.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Aborts. Calling this more than once has no further effect.
    pub fn abort(&self) {
        if !self.sender.send_replace(true) {
            tracing::debug!("abort signal triggered");
        }
    }

    /// Returns `true` once [`abort`](Self::abort) has been called.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }

    /// Completes when the signal is aborted, immediately if it already was.
    pub async fn aborted(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only returns once aborted.
        let _ = receiver.wait_for(|aborted| *aborted).await;
    }

    /// A signal aborted by SIGTERM or SIGINT (Ctrl+C elsewhere).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            if wait_for_os_signal().await {
                trigger.abort();
            }
        });

        signal
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for SIGTERM or SIGINT. Returns `false` if no handler could be
/// registered.
async fn wait_for_os_signal() -> bool {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "failed to register signal handlers");
                    return false;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }
        true
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received Ctrl+C, shutting down");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to wait for Ctrl+C");
                false
            }
        }
    }
}

/// Tracks requests that are being handled.
///
/// # Example
///
/// ```rust
/// use daedalus_server::HandlingSet;
///
/// let handling = HandlingSet::new();
/// let guard = handling.acquire();
/// assert_eq!(handling.len(), 1);
///
/// drop(guard);
/// assert!(handling.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HandlingSet {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl HandlingSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request. It stays in the set until the guard is dropped.
    #[must_use]
    pub fn acquire(&self) -> HandlingGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        HandlingGuard {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Number of requests in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns `true` if nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completes once the set is empty.
    pub async fn drained(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Membership of one request in a [`HandlingSet`].
#[derive(Debug)]
pub struct HandlingGuard {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for HandlingGuard {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_abort_is_idempotent() {
        let signal = AbortSignal::new();
        assert!(!signal.is_aborted());
        signal.abort();
        signal.abort();
        assert!(signal.is_aborted());
    }

    #[test]
    fn test_abort_shared_by_clones() {
        let signal = AbortSignal::default();
        let clone = signal.clone();
        clone.abort();
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn test_aborted_completes_when_triggered() {
        let signal = AbortSignal::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.abort();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.aborted())
            .await
            .expect("aborted should complete");
    }

    #[tokio::test]
    async fn test_aborted_completes_immediately_if_already_aborted() {
        let signal = AbortSignal::new();
        signal.abort();

        tokio::time::timeout(Duration::from_millis(10), signal.aborted())
            .await
            .expect("aborted should complete immediately");
    }

    #[test]
    fn test_handling_set_counts() {
        let handling = HandlingSet::new();
        let first = handling.acquire();
        let second = handling.acquire();
        assert_eq!(handling.len(), 2);

        drop(first);
        assert_eq!(handling.len(), 1);
        drop(second);
        assert!(handling.is_empty());
    }

    #[tokio::test]
    async fn test_drained_immediate() {
        let handling = HandlingSet::new();
        tokio::time::timeout(Duration::from_millis(10), handling.drained())
            .await
            .expect("empty set should be drained");
    }

    #[tokio::test]
    async fn test_drained_waits_for_guards() {
        let handling = HandlingSet::new();
        let guard = handling.acquire();

        let waiter = handling.clone();
        let wait = tokio::spawn(async move { waiter.drained().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!wait.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .expect("drained should complete")
            .expect("task should not panic");
    }
}
