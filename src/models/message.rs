use super::task::{TaskId, TaskOutcome};

/// Update pushed from a worker to the foreground, in production order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub kind: TaskEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEventKind {
    Log(String),
    Progress { current: u64, target: u64 },
    Terminal(TaskOutcome),
}

impl TaskEvent {
    pub fn log(task_id: TaskId, line: String) -> Self {
        Self {
            task_id,
            kind: TaskEventKind::Log(line),
        }
    }

    pub fn progress(task_id: TaskId, current: u64, target: u64) -> Self {
        Self {
            task_id,
            kind: TaskEventKind::Progress { current, target },
        }
    }

    pub fn terminal(task_id: TaskId, outcome: TaskOutcome) -> Self {
        Self {
            task_id,
            kind: TaskEventKind::Terminal(outcome),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, TaskEventKind::Terminal(_))
    }
}

/// Foreground consumer of task events.
pub trait ProgressObserver {
    fn on_log(&mut self, task_id: TaskId, line: &str);

    fn on_progress(&mut self, task_id: TaskId, current: u64, target: u64);

    fn on_terminal(&mut self, task_id: TaskId, outcome: TaskOutcome);

    fn on_event(&mut self, event: &TaskEvent) {
        match &event.kind {
            TaskEventKind::Log(line) => self.on_log(event.task_id, line),
            TaskEventKind::Progress { current, target } => {
                self.on_progress(event.task_id, *current, *target)
            }
            TaskEventKind::Terminal(outcome) => self.on_terminal(event.task_id, *outcome),
        }
    }
}
