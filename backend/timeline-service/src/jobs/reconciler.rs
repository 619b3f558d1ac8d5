//! Timeline Reconciler Background Job
//!
//! Rebuilds each recipient's materialized timeline from the follow graph and
//! the post table, repairing fan-out steps that were logged and skipped:
//! - entries from authors the recipient no longer follows (self excluded)
//! - entries whose post no longer exists
//! - missing entries for the most recent posts of self and every followee
//!
//! Every step is idempotent, so overlapping runs and concurrent fan-out are
//! harmless.

use crate::domain::TimelineEntry;
use crate::error::{TimelineError, TimelineResult};
use crate::metrics;
use crate::repository::Repositories;
use crate::services::TimelineCaches;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Totals of one reconcile pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub recipients: usize,
    pub inserted: u64,
    pub removed: u64,
}

impl ReconcileReport {
    fn merge(&mut self, other: ReconcileReport) {
        self.recipients += other.recipients;
        self.inserted += other.inserted;
        self.removed += other.removed;
    }
}

#[derive(Clone)]
pub struct TimelineReconciler {
    repos: Repositories,
    caches: TimelineCaches,
    /// Recent posts per author expected in each timeline
    recent_limit: i64,
    batch_size: i64,
}

impl TimelineReconciler {
    pub fn new(
        repos: Repositories,
        caches: TimelineCaches,
        recent_limit: i64,
        batch_size: i64,
    ) -> Self {
        Self {
            repos,
            caches,
            recent_limit,
            batch_size: batch_size.max(1),
        }
    }

    /// Repair one recipient's timeline
    pub async fn reconcile_recipient(&self, recipient_id: i64) -> TimelineResult<ReconcileReport> {
        let mut report = ReconcileReport {
            recipients: 1,
            ..Default::default()
        };

        let following: HashSet<i64> = self
            .repos
            .graph
            .list_following_ids(recipient_id)
            .await
            .map_err(TimelineError::persistence("list following"))?
            .into_iter()
            .collect();

        let authors = self
            .repos
            .timeline
            .entry_authors(recipient_id)
            .await
            .map_err(TimelineError::persistence("list timeline authors"))?;
        for author_id in authors {
            if author_id == recipient_id || following.contains(&author_id) {
                continue;
            }
            report.removed += self
                .repos
                .timeline
                .delete_entries_by_author(recipient_id, author_id)
                .await
                .map_err(TimelineError::persistence("remove unfollowed entries"))?;
        }

        report.removed += self
            .repos
            .timeline
            .delete_orphaned_entries(recipient_id)
            .await
            .map_err(TimelineError::persistence("remove orphaned entries"))?;

        let expected_authors = std::iter::once(recipient_id).chain(following.iter().copied());
        for author_id in expected_authors {
            let posts = self
                .repos
                .posts
                .recent_posts_by_author(author_id, self.recent_limit)
                .await
                .map_err(TimelineError::persistence("load recent posts"))?;
            for post in &posts {
                let entry = TimelineEntry::for_post(post).with_recipient(recipient_id);
                let inserted = self
                    .repos
                    .timeline
                    .insert_entry(&entry)
                    .await
                    .map_err(TimelineError::persistence("insert missing entry"))?;
                if inserted {
                    report.inserted += 1;
                }
            }
        }

        if report.inserted > 0 || report.removed > 0 {
            self.caches.invalidate_timeline(recipient_id).await;
            tracing::info!(
                recipient_id,
                inserted = report.inserted,
                removed = report.removed,
                "Timeline repaired"
            );
        }

        Ok(report)
    }

    /// Repair every user's timeline, walking users in id batches.
    ///
    /// A recipient that fails is logged and skipped; a failure listing users
    /// aborts the pass.
    pub async fn reconcile_all(&self) -> TimelineResult<ReconcileReport> {
        let mut total = ReconcileReport::default();
        let mut after = 0;

        loop {
            let batch = self
                .repos
                .users
                .list_user_ids(after, self.batch_size)
                .await
                .map_err(TimelineError::persistence("list users"))?;
            let Some(&last) = batch.last() else {
                break;
            };

            for recipient_id in batch.iter().copied() {
                match self.reconcile_recipient(recipient_id).await {
                    Ok(report) => total.merge(report),
                    Err(e) => {
                        tracing::warn!(
                            recipient_id,
                            error = %e,
                            "Failed to reconcile timeline, skipping recipient"
                        );
                    }
                }
            }

            after = last;
        }

        metrics::record_reconcile_repairs("inserted", total.inserted);
        metrics::record_reconcile_repairs("removed", total.removed);
        Ok(total)
    }
}

/// Run [`TimelineReconciler::reconcile_all`] every `interval`
pub async fn start_reconciler(reconciler: TimelineReconciler, interval: Duration) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        batch_size = reconciler.batch_size,
        "Starting timeline reconciler background job"
    );

    loop {
        sleep(interval).await;

        tracing::info!("Running timeline reconcile cycle");
        let cycle_start = Instant::now();

        match reconciler.reconcile_all().await {
            Ok(report) => {
                metrics::record_reconcile_run("success");
                tracing::info!(
                    recipients = report.recipients,
                    inserted = report.inserted,
                    removed = report.removed,
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Timeline reconcile cycle completed"
                );
            }
            Err(e) => {
                metrics::record_reconcile_run("error");
                tracing::error!(
                    error = %e,
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Timeline reconcile cycle failed"
                );
            }
        }
    }
}
