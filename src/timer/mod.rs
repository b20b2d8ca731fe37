//! Deferred, cancellable tool execution.
//!
//! A countdown holds a serialised `tools/call` descriptor
//! (`{"name": ..., "arguments": {...}}`). When its delay elapses the command
//! runs through the same registry call path as an inbound `tools/call`, and
//! the outcome is reported to a [`Notifier`] instead of a caller.
//!
//! Each countdown is either scheduled, fired or cancelled; the last two are
//! terminal. Whether a countdown fires or is cancelled is decided under the
//! active-set lock, so at most one of the two is ever observable. Once a
//! countdown has started executing its command, cancelling it only removes
//! the bookkeeping entry.
//!
//! The [`tools`] submodule exposes the service as three ordinary tools:
//! `start_countdown`, `cancel_countdown` and `get_active_timers`.

mod service;
pub mod tools;

pub use service::{
    log_notifier, CancelOutcome, Notifier, ScheduledTimer, TimerNotice, TimerService,
    TimerSettings, TimerSnapshot, ToolCommand,
};
pub use tools::register_timer_tools;

use thiserror::Error;

/// Errors returned by the timer service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The command is not a well-formed tool-call descriptor.
    #[error("Invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected.
        reason: String,
    },

    /// No active countdown has this ID.
    #[error("Timer {id} not found or already finished")]
    NotFound {
        /// The requested timer ID.
        id: u64,
    },
}
