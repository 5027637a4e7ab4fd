//! Scheduler layer for the bot
//!
//! This layer keeps the activity subscription alive and feeds its change
//! events to a bounded pool of render workers. It owns the lifecycle of the
//! watcher task, from first list to shutdown.

pub mod engine;
pub mod watcher;

pub use engine::WatchActivities;
