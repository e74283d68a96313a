use std::fmt;
use std::str::FromStr;

use super::log_buffer::LogBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Selects which engine entry point a task begins with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    TestSuite,
    Benchmark,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TestSuite => write!(f, "test suite"),
            Self::Benchmark => write!(f, "benchmark"),
        }
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" | "tests" | "test-suite" => Ok(Self::TestSuite),
            "bench" | "benchmark" => Ok(Self::Benchmark),
            other => Err(format!("unknown task kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Cancelling,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }
}

/// Final result of a task, reported exactly once per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(i32),
    Cancelled,
    Failed(i32),
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed(_) => TaskState::Completed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
            TaskOutcome::Failed(_) => TaskState::Failed,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TaskOutcome::Completed(code) | TaskOutcome::Failed(code) => Some(*code),
            TaskOutcome::Cancelled => None,
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Completed(code) => write!(f, "completed (code: {code})"),
            TaskOutcome::Cancelled => write!(f, "cancelled"),
            TaskOutcome::Failed(code) => write!(f, "failed (code: {code})"),
        }
    }
}

/// One run of the engine. Mutated only by the worker driving it.
#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub state: TaskState,
    pub exit_code: Option<i32>,
    pub progress_current: u64,
    pub progress_target: u64,
    pub log: LogBuffer,
}

impl Task {
    pub fn new(id: TaskId, kind: TaskKind, max_log_lines: usize) -> Self {
        Self {
            id,
            kind,
            state: TaskState::Pending,
            exit_code: None,
            progress_current: 0,
            progress_target: 0,
            log: LogBuffer::new(max_log_lines),
        }
    }

    /// Records a progress sample. Both counters only ever move forward.
    pub fn record_progress(&mut self, current: u64, target: u64) {
        self.progress_current = self.progress_current.max(current);
        self.progress_target = self.progress_target.max(target);
    }

    /// Applies the terminal outcome. Returns false if the task was already terminal.
    pub fn finish(&mut self, outcome: TaskOutcome) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = outcome.state();
        self.exit_code = outcome.exit_code();
        true
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            kind: self.kind,
            state: self.state,
            exit_code: self.exit_code,
            progress_current: self.progress_current,
            progress_target: self.progress_target,
            log: self.log.lines(),
        }
    }
}

/// Read-only copy of a task handed to the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub kind: TaskKind,
    pub state: TaskState,
    pub exit_code: Option<i32>,
    pub progress_current: u64,
    pub progress_target: u64,
    pub log: Vec<String>,
}
