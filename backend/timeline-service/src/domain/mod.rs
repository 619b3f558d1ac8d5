pub mod models;

pub use models::{
    FollowEdge, Follower, NewPost, PageWindow, Post, TimelineEntry, TimelineItem, TimelinePage,
    User,
};
