//! Exactly-once join of the console and image capture finish signals

/// Which capture channels are still running for a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// Not connected yet
    Idle,
    Both,
    ConsoleOnly,
    ImagesOnly,
    Completed,
}

/// A capture channel announcing it has finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishSignal {
    /// The console reached its next prompt
    Console,
    /// The graphics device was closed and drained
    Images,
}

impl CompletionState {
    /// State after a successful connect.
    pub fn connected(images_started: bool) -> Self {
        if images_started {
            Self::Both
        } else {
            Self::ConsoleOnly
        }
    }

    /// Apply `signal`, returning the next state and whether this
    /// transition is the one that completes the chunk.
    ///
    /// `true` is returned by at most one transition per run.
    pub fn on_finished(self, signal: FinishSignal) -> (Self, bool) {
        match (self, signal) {
            (Self::Both, FinishSignal::Console) => (Self::ImagesOnly, false),
            (Self::Both, FinishSignal::Images) => (Self::ConsoleOnly, false),
            (Self::ConsoleOnly, FinishSignal::Console) => (Self::Completed, true),
            (Self::ImagesOnly, FinishSignal::Images) => (Self::Completed, true),
            (state, _) => (state, false),
        }
    }

    pub fn console_connected(&self) -> bool {
        matches!(self, Self::Both | Self::ConsoleOnly)
    }

    pub fn images_connected(&self) -> bool {
        matches!(self, Self::Both | Self::ImagesOnly)
    }

    pub fn is_completed(&self) -> bool {
        *self == Self::Completed
    }
}
