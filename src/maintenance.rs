//! Background housekeeping: ending idle review sessions and pruning old rows.

use crate::clock::Clock;
use crate::locks::UserLocks;
use crate::messages::EXIT_TIMEOUT;
use crate::review::ReviewSessionManager;
use crate::store::{PruneResult, Store};
use crate::transport::MessageSender;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Ends review sessions nobody answered within the timeout, so an abandoned
/// session does not swallow the user's next message days later.
pub struct SessionReaper {
    reviews: Arc<ReviewSessionManager>,
    locks: Arc<UserLocks>,
    sender: Arc<dyn MessageSender>,
    clock: Arc<dyn Clock>,
    period: Duration,
}

impl SessionReaper {
    pub fn new(
        reviews: Arc<ReviewSessionManager>,
        locks: Arc<UserLocks>,
        sender: Arc<dyn MessageSender>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> Self {
        Self {
            reviews,
            locks,
            sender,
            clock,
            period,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Session reaper cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let reaped = self.sweep(self.clock.now()).await;
                    if reaped > 0 {
                        info!("Ended {} idle review sessions", reaped);
                    }
                }
            }
        }
    }

    /// Returns how many sessions were ended.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut reaped = 0;
        for user_id in self.reviews.inactive_users(now) {
            let _guard = self.locks.lock(&user_id).await;
            // The user may have answered while we waited for the lock.
            if self.reviews.check_timeout(&user_id, now).await.is_none() {
                continue;
            }
            reaped += 1;
            if let Err(e) = self.sender.send(&user_id, EXIT_TIMEOUT).await {
                error!("Failed to notify {} of review timeout: {}", user_id, e);
            }
        }
        let pruned = self.locks.prune_idle();
        if pruned > 0 {
            debug!("Dropped {} idle user locks", pruned);
        }
        reaped
    }
}

/// Deletes conversation history and dormant engagement records past their
/// retention windows.
pub struct RetentionPruner {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    conversation_retention_days: i64,
    engagement_retention_days: i64,
    period: Duration,
}

impl RetentionPruner {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        conversation_retention_days: i64,
        engagement_retention_days: i64,
        period: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            conversation_retention_days,
            engagement_retention_days,
            period,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Retention pruner cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.prune_once(self.clock.now()).await {
                        error!("Retention pruning failed: {}", e);
                    }
                }
            }
        }
    }

    pub async fn prune_once(&self, now: DateTime<Utc>) -> anyhow::Result<PruneResult> {
        let result = self
            .store
            .prune(
                now - ChronoDuration::days(self.conversation_retention_days),
                now - ChronoDuration::days(self.engagement_retention_days),
            )
            .await?;
        info!(
            messages = result.messages_deleted,
            engagements = result.engagements_deleted,
            "Retention pruning finished"
        );
        Ok(result)
    }
}
