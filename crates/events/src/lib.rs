//! Event plumbing for chunk output capture
//!
//! This crate provides the subscribable event sources a chunk session
//! listens on, and the notification bus it announces results through.

mod bus;
mod source;
mod sources;
mod types;

pub use bus::NotificationBus;
pub use source::{EventSource, SubscriptionHandle};
pub use sources::{ConsoleEvents, ConsoleOutput, OutputEvents};
pub use types::*;
