//! Timeline fan-out and caching engine
//!
//! Maintains each user's timeline as a materialized view of the follow
//! graph, propagates publish/delete/follow/unfollow into it, and serves
//! follower lists and timeline pages through a read-through cache.

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod repository;
pub mod services;

pub use config::{Config, FanoutMode};
pub use error::{ErrorKind, StoreError, TimelineError, TimelineResult};
pub use repository::{InMemoryStore, PostgresStore, Repositories};
pub use services::{FollowOutcome, TimelineCaches, TimelineService, UnfollowOutcome};
