//! Optional queued fan-out.
//!
//! The writer performs the primary write inline and hands the follower loop
//! to a bounded channel. A single background worker drains it through the
//! same [`Propagator`] used inline, so queued and inline delivery share the
//! retry and dedup behavior.
//!
//! Ordering holds only between jobs that both go through the channel. A
//! delete that falls back to inline when the queue is full can retract
//! before an earlier queued deliver lands, leaving a dangling entry. The
//! page join skips entries whose post is gone and the reconciler drops them.

use super::propagation::Propagator;
use crate::domain::TimelineEntry;
use crate::metrics;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

/// Follower loop deferred from a publish or delete
#[derive(Debug, Clone)]
pub enum FanoutJob {
    Deliver {
        entry: TimelineEntry,
        recipients: Vec<i64>,
    },
    Retract {
        author_id: i64,
        post_id: i64,
        recipients: Vec<i64>,
    },
}

impl FanoutJob {
    pub fn post_id(&self) -> i64 {
        match self {
            FanoutJob::Deliver { entry, .. } => entry.post_id,
            FanoutJob::Retract { post_id, .. } => *post_id,
        }
    }

    pub fn recipients(&self) -> &[i64] {
        match self {
            FanoutJob::Deliver { recipients, .. } | FanoutJob::Retract { recipients, .. } => {
                recipients
            }
        }
    }
}

/// Producer side of the fan-out channel
#[derive(Clone)]
pub struct FanoutQueue {
    sender: mpsc::Sender<FanoutJob>,
}

impl FanoutQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FanoutJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Enqueue without waiting. Hands the job back when the queue is full or
    /// the worker is gone so the caller can propagate inline.
    pub fn try_enqueue(&self, job: FanoutJob) -> Result<(), FanoutJob> {
        match self.sender.try_send(job) {
            Ok(()) => {
                metrics::inc_queue_depth();
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                warn!(post_id = job.post_id(), "Fan-out queue full");
                Err(job)
            }
            Err(TrySendError::Closed(job)) => {
                warn!(post_id = job.post_id(), "Fan-out queue closed");
                Err(job)
            }
        }
    }
}

/// Drain the fan-out channel until every sender is dropped
pub async fn run_fanout_worker(mut receiver: mpsc::Receiver<FanoutJob>, propagator: Propagator) {
    info!("Fan-out worker started");

    while let Some(job) = receiver.recv().await {
        metrics::dec_queue_depth();
        let post_id = job.post_id();
        let report = propagator.apply(job).await;
        if !report.is_complete() {
            warn!(
                post_id,
                failed = report.failed,
                attempted = report.attempted,
                "Queued fan-out finished with failed steps"
            );
        }
    }

    info!("Fan-out worker stopped");
}
