//! RAII resource guards for automatic cleanup.
//!
//! - [`WatchGuard`] - Directory watch released exactly once

mod watch_guard;

pub use watch_guard::WatchGuard;
