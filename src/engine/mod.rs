//! Command surface of the computation engine.
//!
//! The bridge never looks inside the engine: it begins a run, drains log
//! lines and progress samples, asks whether the run is complete, fetches the
//! exit code, and ends the run. Exactly one `end` must follow every `begin`.

pub mod ffi;
pub mod job;

use thiserror::Error;

use crate::models::task::TaskKind;

pub use ffi::{NativeCommandTable, NativeEngine};
pub use job::{JobContext, JobEngine};

/// `begin` result meaning the run was accepted.
pub const BEGIN_OK: i32 = 0;

/// Fault reported by an engine after a successful `begin`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine fault (code {code}): {message}")]
    Fault { code: i32, message: String },
}

impl EngineError {
    pub fn fault(code: i32, message: impl Into<String>) -> Self {
        Self::Fault {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Fault { code, .. } => *code,
        }
    }
}

pub trait Engine: Send {
    /// Starts a run. Zero means running; anything else is a rejection code.
    fn begin(&mut self, kind: TaskKind) -> i32;

    /// Next log line, or `None` when nothing is queued right now.
    fn poll_log(&mut self) -> Result<Option<String>, EngineError>;

    /// Current `(current, target)` progress pair.
    fn poll_progress(&mut self) -> Result<(u64, u64), EngineError>;

    fn is_complete(&mut self) -> bool;

    /// Only meaningful once `is_complete` has returned true.
    fn exit_code(&mut self) -> i32;

    fn end(&mut self);
}
