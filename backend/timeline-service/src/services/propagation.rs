//! Best-effort propagation of timeline entries to recipients.
//!
//! Each recipient is an independent step: it is retried with backoff, and if
//! it still fails it is logged with enough context for the reconciler (or an
//! operator) to repair it. One failed recipient never stops the loop.

use super::caches::TimelineCaches;
use super::queue::FanoutJob;
use super::retry::{with_retry, RetryConfig};
use crate::domain::TimelineEntry;
use crate::metrics;
use crate::repository::TimelineRepository;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of one propagation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Recipient steps attempted
    pub attempted: usize,
    /// Steps that changed a row
    pub applied: usize,
    /// Steps that found nothing to do (duplicate insert, missing row)
    pub unchanged: usize,
    /// Steps that failed after retries
    pub failed: usize,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    pub fn merge(&mut self, other: FanoutReport) {
        self.attempted += other.attempted;
        self.applied += other.applied;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }

    fn record(&mut self, operation: &'static str, changed: bool) {
        self.attempted += 1;
        if changed {
            self.applied += 1;
            metrics::record_fanout_step(operation, "applied");
        } else {
            self.unchanged += 1;
            metrics::record_fanout_step(operation, "unchanged");
        }
    }

    fn record_failure(&mut self, operation: &'static str) {
        self.attempted += 1;
        self.failed += 1;
        metrics::record_fanout_step(operation, "failed");
    }
}

/// Writes timeline entries for a set of recipients and purges their
/// timeline-page cache
#[derive(Clone)]
pub struct Propagator {
    timeline: Arc<dyn TimelineRepository>,
    caches: TimelineCaches,
    retry: RetryConfig,
}

impl Propagator {
    pub fn new(
        timeline: Arc<dyn TimelineRepository>,
        caches: TimelineCaches,
        retry: RetryConfig,
    ) -> Self {
        Self {
            timeline,
            caches,
            retry,
        }
    }

    /// Insert `entry` into each recipient's timeline
    pub async fn deliver(&self, entry: &TimelineEntry, recipients: &[i64]) -> FanoutReport {
        const OP: &str = "deliver";
        let started = Instant::now();
        let mut report = FanoutReport::default();

        for &recipient_id in recipients {
            let copy = entry.with_recipient(recipient_id);
            match with_retry(&self.retry, || self.timeline.insert_entry(&copy)).await {
                Ok(inserted) => report.record(OP, inserted),
                Err(e) => {
                    report.record_failure(OP);
                    warn!(
                        operation = OP,
                        recipient_id,
                        post_id = entry.post_id,
                        author_id = entry.author_id,
                        error = %e,
                        "Fan-out step failed, timeline entry missing"
                    );
                }
            }
            self.caches.invalidate_timeline(recipient_id).await;
        }

        self.finish(OP, started, &report);
        report
    }

    /// Remove `post_id` from each recipient's timeline
    pub async fn retract(&self, author_id: i64, post_id: i64, recipients: &[i64]) -> FanoutReport {
        const OP: &str = "retract";
        let started = Instant::now();
        let mut report = FanoutReport::default();

        for &recipient_id in recipients {
            let deleted =
                with_retry(&self.retry, || self.timeline.delete_entry(recipient_id, post_id)).await;
            match deleted {
                Ok(deleted) => report.record(OP, deleted),
                Err(e) => {
                    report.record_failure(OP);
                    warn!(
                        operation = OP,
                        recipient_id,
                        post_id,
                        author_id,
                        error = %e,
                        "Fan-out step failed, stale timeline entry left behind"
                    );
                }
            }
            self.caches.invalidate_timeline(recipient_id).await;
        }

        self.finish(OP, started, &report);
        report
    }

    /// Copy another user's entries into `recipient_id`'s timeline, keeping
    /// each post's metadata
    pub async fn backfill(&self, recipient_id: i64, entries: &[TimelineEntry]) -> FanoutReport {
        const OP: &str = "backfill";
        let started = Instant::now();
        let mut report = FanoutReport::default();

        for entry in entries {
            let copy = entry.with_recipient(recipient_id);
            match with_retry(&self.retry, || self.timeline.insert_entry(&copy)).await {
                Ok(inserted) => report.record(OP, inserted),
                Err(e) => {
                    report.record_failure(OP);
                    warn!(
                        operation = OP,
                        recipient_id,
                        post_id = entry.post_id,
                        author_id = entry.author_id,
                        error = %e,
                        "Backfill step failed, timeline entry missing"
                    );
                }
            }
        }
        self.caches.invalidate_timeline(recipient_id).await;

        self.finish(OP, started, &report);
        report
    }

    /// Remove every entry by `author_id` from `recipient_id`'s timeline
    pub async fn purge_author(&self, recipient_id: i64, author_id: i64) -> (u64, FanoutReport) {
        const OP: &str = "purge_author";
        let started = Instant::now();
        let mut report = FanoutReport::default();
        let mut removed = 0;

        match with_retry(&self.retry, || {
            self.timeline.delete_entries_by_author(recipient_id, author_id)
        })
        .await
        {
            Ok(count) => {
                removed = count;
                report.record(OP, count > 0);
            }
            Err(e) => {
                report.record_failure(OP);
                warn!(
                    operation = OP,
                    recipient_id,
                    author_id,
                    error = %e,
                    "Failed to purge unfollowed author from timeline"
                );
            }
        }
        self.caches.invalidate_timeline(recipient_id).await;

        self.finish(OP, started, &report);
        (removed, report)
    }

    /// Run a queued job
    pub async fn apply(&self, job: FanoutJob) -> FanoutReport {
        match job {
            FanoutJob::Deliver { entry, recipients } => self.deliver(&entry, &recipients).await,
            FanoutJob::Retract {
                author_id,
                post_id,
                recipients,
            } => self.retract(author_id, post_id, &recipients).await,
        }
    }

    fn finish(&self, operation: &'static str, started: Instant, report: &FanoutReport) {
        metrics::record_fanout_duration(operation, started.elapsed());
        debug!(
            operation,
            attempted = report.attempted,
            applied = report.applied,
            unchanged = report.unchanged,
            failed = report.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Propagation pass finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;
    use chrono::Utc;
    use std::time::Duration;
    use timeline_cache::InMemoryKvStore;

    fn propagator(store: Arc<InMemoryStore>) -> Propagator {
        let caches = TimelineCaches::with_ttls(
            Arc::new(InMemoryKvStore::new()),
            Duration::from_secs(300),
            Duration::from_secs(600),
        );
        let retry = RetryConfig {
            max_retries: 1,
            initial_backoff: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        };
        Propagator::new(store, caches, retry)
    }

    fn entry(post_id: i64) -> TimelineEntry {
        TimelineEntry {
            recipient_id: 1,
            author_id: 1,
            post_id,
            post_created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_deliver_continues_past_failed_recipient() {
        let store = Arc::new(InMemoryStore::new());
        // more failures than retries
        store.fail_timeline_writes_for(3, 5).await;

        let report = propagator(store.clone())
            .deliver(&entry(10), &[2, 3, 4])
            .await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 1);
        assert!(!report.is_complete());
        assert_eq!(store.timeline_entries(4).await.len(), 1);
        assert!(store.timeline_entries(3).await.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_timeline_writes_for(2, 1).await;

        let report = propagator(store.clone()).deliver(&entry(10), &[2]).await;

        assert!(report.is_complete());
        assert_eq!(report.applied, 1);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_unchanged() {
        let store = Arc::new(InMemoryStore::new());
        let p = propagator(store.clone());

        p.deliver(&entry(10), &[2]).await;
        let report = p.deliver(&entry(10), &[2]).await;

        assert_eq!(report.unchanged, 1);
        assert_eq!(report.applied, 0);
        assert_eq!(store.timeline_len().await, 1);
    }

    #[tokio::test]
    async fn test_report_merge() {
        let mut total = FanoutReport {
            attempted: 2,
            applied: 1,
            unchanged: 1,
            failed: 0,
        };
        total.merge(FanoutReport {
            attempted: 1,
            applied: 0,
            unchanged: 0,
            failed: 1,
        });

        assert_eq!(total.attempted, 3);
        assert_eq!(total.failed, 1);
        assert!(!total.is_complete());
    }
}
