//! # Worker Helpers
//!
//! Building blocks for stateless workers: turning "task ready" hints into
//! claims, and keeping a claimed task's lease alive while it executes.

pub mod lease_keeper;
pub mod listener;

pub use lease_keeper::LeaseKeeper;
pub use listener::NotificationListener;
