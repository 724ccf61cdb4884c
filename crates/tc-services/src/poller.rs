//! Background sweep that flips due capsules to unlocked.
//!
//! The poller is owned by whoever calls [`UnlockPoller::start`]; dropping or
//! stopping the returned [`PollerHandle`] ends the task.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tc_core::{AppError, CapsuleRepo, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct UnlockPoller {
    repo: Arc<dyn CapsuleRepo>,
    interval: Duration,
}

impl UnlockPoller {
    pub fn new(repo: Arc<dyn CapsuleRepo>, interval: Duration) -> Self {
        Self { repo, interval }
    }

    /// Unlocks everything due at `now`; returns how many capsules flipped.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let unlocked = self.repo.unlock_due(now).await.map_err(AppError::Database)?;
        for capsule in &unlocked {
            info!(capsule_id = %capsule.id, title = %capsule.title, "capsule unlocked");
        }
        Ok(unlocked.len())
    }

    pub async fn sweep(&self) -> Result<usize> {
        self.sweep_at(Utc::now()).await
    }

    /// Spawns the ticker. The first sweep runs immediately.
    pub fn start(self) -> PollerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs_f64(), "unlock poller started");
            let mut timer = tokio::time::interval(self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        match self.sweep().await {
                            Ok(0) => {}
                            Ok(n) => debug!(unlocked = n, "unlock sweep finished"),
                            Err(e) => warn!(error = %e, "unlock sweep failed, retrying next tick"),
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }

            info!("unlock poller stopped");
        });

        PollerHandle { stop_tx, task }
    }
}

pub struct PollerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signals the poller and waits for an in-flight sweep to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "unlock poller task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use tc_core::{Capsule, MockCapsuleRepo};
    use uuid::Uuid;

    fn due_capsule(now: DateTime<Utc>) -> Capsule {
        Capsule {
            id: Uuid::now_v7(),
            title: "T".into(),
            owner: "o".into(),
            message: String::new(),
            unlock_date: now,
            created_at: now,
            is_unlocked: true,
        }
    }

    #[tokio::test]
    async fn sweep_reports_unlocked_count() {
        let now = Utc::now();
        let mut repo = MockCapsuleRepo::new();
        repo.expect_unlock_due()
            .withf(move |at| *at == now)
            .times(1)
            .returning(move |at| Ok(vec![due_capsule(at), due_capsule(at)]));

        let poller = UnlockPoller::new(Arc::new(repo), Duration::from_secs(60));
        assert_eq!(poller.sweep_at(now).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sweep_surfaces_database_errors() {
        let mut repo = MockCapsuleRepo::new();
        repo.expect_unlock_due().returning(|_| Err(anyhow!("no such table")));

        let poller = UnlockPoller::new(Arc::new(repo), Duration::from_secs(60));
        assert!(matches!(poller.sweep().await, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn keeps_ticking_after_a_failed_sweep() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut repo = MockCapsuleRepo::new();
        repo.expect_unlock_due().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow!("database is locked"))
            } else {
                Ok(Vec::new())
            }
        });

        let handle = UnlockPoller::new(Arc::new(repo), Duration::from_millis(10)).start();

        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;

        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn stop_ends_the_task() {
        let mut repo = MockCapsuleRepo::new();
        repo.expect_unlock_due().returning(|_| Ok(Vec::new()));

        let handle = UnlockPoller::new(Arc::new(repo), Duration::from_secs(3600)).start();
        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("poller should stop promptly");
    }
}
