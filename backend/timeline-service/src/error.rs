/// Error types for timeline-service
use thiserror::Error;

/// Failure of a single repository call
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced to callers of the timeline engine.
///
/// Fan-out sub-step failures never appear here; they are logged by the
/// writer and the primary operation still succeeds.
#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("User {follower_id} already follows user {followee_id}")]
    AlreadyFollowing { follower_id: i64, followee_id: i64 },

    #[error("User {follower_id} does not follow user {followee_id}")]
    NotFollowing { follower_id: i64, followee_id: i64 },

    #[error("Follow target {0} not found")]
    TargetNotFound(i64),

    #[error("User {0} not found")]
    UserNotFound(i64),

    #[error("Post {0} not found")]
    PostNotFound(i64),

    #[error("User {user_id} does not own post {post_id}")]
    NotOwner { user_id: i64, post_id: i64 },

    #[error("{operation} failed: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Coarse classification used by the request layer to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Ownership,
    Persistence,
}

impl TimelineError {
    /// Wrap a store failure with the name of the step that hit it.
    ///
    /// `.map_err(TimelineError::persistence("insert post"))?`
    pub fn persistence(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| TimelineError::Persistence { operation, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TimelineError::Validation(_) => ErrorKind::Validation,
            TimelineError::AlreadyFollowing { .. } | TimelineError::NotFollowing { .. } => {
                ErrorKind::Conflict
            }
            TimelineError::TargetNotFound(_)
            | TimelineError::UserNotFound(_)
            | TimelineError::PostNotFound(_) => ErrorKind::NotFound,
            TimelineError::NotOwner { .. } => ErrorKind::Ownership,
            TimelineError::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// Only store failures are worth retrying; everything else is a
    /// deterministic answer about the current state.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }
}

/// Result type alias for engine operations
pub type TimelineResult<T> = Result<T, TimelineError>;
