//! Parse session progress, cancellation and expiry.

mod context;
mod store;
mod sweeper;
mod tracker;

pub use context::JobContext;
pub use store::{InMemorySessionStore, SessionStore};
pub use sweeper::spawn_sweeper;
pub use tracker::ProgressTracker;
