//! Debounced Auto-Save
//!
//! Every mutation calls [`ChangeNotifier::notify`]. A background task waits
//! until the model has been quiet for the debounce window, then saves once.
//!
//! ## Event-Driven Model
//!
//! 1. The task sleeps until the first change arrives
//! 2. Each further change restarts the quiet-period timer
//! 3. When the timer expires the save target runs exactly once
//! 4. The task goes back to sleep
//!
//! Notifications are coalesced through a one-slot channel, so a burst of
//! edits costs one pending signal rather than one per edit. A save turned
//! away because a serialization is already running keeps the changes
//! pending and waits out another quiet period before retrying. Dropping the
//! [`ChangeScheduler`] stops the task; a change still waiting for its quiet
//! period is abandoned.

use crate::services::error::ModelError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Something the scheduler saves once changes settle
#[async_trait]
pub trait SaveTarget: Send + Sync {
    async fn save(&self) -> Result<(), ModelError>;
}

/// Cloneable handle used to report a change
#[derive(Clone)]
pub struct ChangeNotifier {
    trigger_tx: mpsc::Sender<()>,
}

impl ChangeNotifier {
    /// Report that the model changed
    ///
    /// Non-blocking; repeated calls before the task wakes collapse into one.
    pub fn notify(&self) {
        match self.trigger_tx.try_send(()) {
            Ok(_) => {
                tracing::trace!("Change notification sent");
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("Change notification already pending");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Change scheduler has shut down, notification ignored");
            }
        }
    }
}

/// Background task that saves after a quiet period
pub struct ChangeScheduler {
    notifier: ChangeNotifier,
    debounce: Duration,
    _shutdown_tx: mpsc::Sender<()>,
}

impl ChangeScheduler {
    /// Start the scheduler on the current tokio runtime
    pub fn spawn(target: Arc<dyn SaveTarget>, debounce: Duration) -> Self {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            tracing::debug!("Change scheduler started ({}ms debounce)", debounce.as_millis());

            let mut pending = false;
            loop {
                if !pending {
                    tokio::select! {
                        biased;

                        _ = shutdown_rx.recv() => break,
                        trigger = trigger_rx.recv() => {
                            if trigger.is_none() {
                                break;
                            }
                        }
                    }
                }

                let settled = loop {
                    tokio::select! {
                        biased;

                        _ = shutdown_rx.recv() => break false,
                        trigger = trigger_rx.recv() => {
                            if trigger.is_none() {
                                break false;
                            }
                        }
                        _ = tokio::time::sleep(debounce) => break true,
                    }
                };
                if !settled {
                    break;
                }

                tracing::debug!("Changes settled, saving");
                pending = match target.save().await {
                    Ok(()) => false,
                    Err(ModelError::SerializationInProgress(status)) => {
                        tracing::debug!(
                            "Serialization of {} assertions running, auto-save deferred",
                            status.quad_count
                        );
                        true
                    }
                    Err(e) => {
                        tracing::warn!("Auto-save failed: {}", e);
                        false
                    }
                };
            }

            tracing::debug!("Change scheduler stopped");
        });

        Self {
            notifier: ChangeNotifier { trigger_tx },
            debounce,
            _shutdown_tx: shutdown_tx,
        }
    }

    pub fn notifier(&self) -> ChangeNotifier {
        self.notifier.clone()
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::JobStatus;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTarget {
        saves: AtomicUsize,
    }

    #[async_trait]
    impl SaveTarget for CountingTarget {
        async fn save(&self) -> Result<(), ModelError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Turns saves away while `busy` is set, as a model does while a
    /// serialization is running
    #[derive(Default)]
    struct BusyTarget {
        busy: AtomicBool,
        attempts: AtomicUsize,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl SaveTarget for BusyTarget {
        async fn save(&self) -> Result<(), ModelError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.busy.load(Ordering::SeqCst) {
                return Err(ModelError::SerializationInProgress(JobStatus {
                    in_progress: true,
                    started_at: None,
                    quad_count: 12,
                }));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_notifier_coalesces_signals() {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        let notifier = ChangeNotifier { trigger_tx: tx };

        notifier.notify();
        notifier.notify();
        notifier.notify();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_after_close_does_not_panic() {
        let (tx, rx) = mpsc::channel::<()>(1);
        let notifier = ChangeNotifier { trigger_tx: tx };
        drop(rx);
        notifier.notify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_changes_saves_once_after_quiet_period() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = ChangeScheduler::spawn(target.clone(), Duration::from_millis(2000));
        let notifier = scheduler.notifier();

        for _ in 0..5 {
            notifier.notify();
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        // 500ms since the last change
        assert_eq!(target.saves.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1499)).await;
        assert_eq!(target.saves.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(target.saves.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(target.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_save_separately() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = ChangeScheduler::spawn(target.clone(), Duration::from_millis(100));

        scheduler.notifier().notify();
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.notifier().notify();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(target.saves.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_abandons_pending_change() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = ChangeScheduler::spawn(target.clone(), Duration::from_millis(100));
        let notifier = scheduler.notifier();

        notifier.notify();
        tokio::task::yield_now().await;
        drop(scheduler);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(target.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_turned_away_by_running_serialization_is_retried() {
        let target = Arc::new(BusyTarget::default());
        target.busy.store(true, Ordering::SeqCst);
        let scheduler = ChangeScheduler::spawn(target.clone(), Duration::from_millis(100));

        scheduler.notifier().notify();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(target.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(target.saves.load(Ordering::SeqCst), 0);

        // Still busy after another quiet period: retried again, still pending
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(target.attempts.load(Ordering::SeqCst), 2);

        target.busy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(target.saves.load(Ordering::SeqCst), 1);

        // Nothing left pending once the save went through
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(target.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(target.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_save_failures_are_not_retried() {
        struct FailingTarget(AtomicUsize);

        #[async_trait]
        impl SaveTarget for FailingTarget {
            async fn save(&self) -> Result<(), ModelError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(crate::db::PersistenceError::transport("offline").into())
            }
        }

        let target = Arc::new(FailingTarget(AtomicUsize::new(0)));
        let scheduler = ChangeScheduler::spawn(target.clone(), Duration::from_millis(100));

        scheduler.notifier().notify();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(target.0.load(Ordering::SeqCst), 1);
    }
}
