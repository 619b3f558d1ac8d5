pub mod caches;
pub mod fanout;
pub mod graph;
pub mod propagation;
pub mod queue;
pub mod retry;
pub mod timeline;

pub use caches::TimelineCaches;
pub use fanout::{FanoutWriter, FollowOutcome, UnfollowOutcome};
pub use graph::SocialGraph;
pub use propagation::{FanoutReport, Propagator};
pub use queue::{run_fanout_worker, FanoutJob, FanoutQueue};
pub use retry::{with_retry, RetryConfig};
pub use timeline::TimelineService;
