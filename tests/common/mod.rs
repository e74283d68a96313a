#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use fft_task_bridge::{
    BridgeConfig, Engine, EngineError, ProgressObserver, TaskController, TaskEvent,
    TaskEventKind, TaskId, TaskKind, TaskOutcome,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Begin(TaskKind),
    PollLog,
    PollProgress,
    IsComplete,
    ExitCode,
    End,
}

#[derive(Debug, Clone)]
pub enum Step {
    Log(String),
    Progress(u64, u64),
    Fault(i32),
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub begin_code: i32,
    pub steps: Vec<Step>,
    /// Keep reporting "nothing yet, not done" once the steps run out.
    pub endless: bool,
    pub exit_code: i32,
    pub panic_on_end: bool,
}

impl Script {
    pub fn lines(count: usize, exit_code: i32) -> Self {
        Self {
            steps: (0..count).map(|i| Step::Log(format!("line {i}"))).collect(),
            exit_code,
            ..Self::default()
        }
    }

    pub fn progress(range: std::ops::RangeInclusive<u64>, target: u64) -> Self {
        Self {
            steps: range.map(|c| Step::Progress(c, target)).collect(),
            ..Self::default()
        }
    }

    pub fn rejected(code: i32) -> Self {
        Self {
            begin_code: code,
            ..Self::default()
        }
    }

    pub fn tagged_lines(tag: &str, count: usize) -> Self {
        Self {
            steps: (0..count).map(|i| Step::Log(format!("{tag} {i}"))).collect(),
            ..Self::default()
        }
    }

    pub fn endless() -> Self {
        Self {
            endless: true,
            ..Self::default()
        }
    }
}

/// Records every command call and how many runs are open at once.
#[derive(Debug, Default)]
pub struct Ledger {
    calls: Mutex<Vec<Call>>,
    open: AtomicUsize,
    max_open: AtomicUsize,
}

impl Ledger {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn begins(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Begin(_)))
            .count()
    }

    pub fn ends(&self) -> usize {
        self.count(&Call::End)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    /// Every begin is closed by an end before the next begin.
    pub fn assert_begin_end_paired(&self) {
        let mut open = false;
        for call in self.calls() {
            match call {
                Call::Begin(_) => {
                    assert!(!open, "begin while a run was still open");
                    open = true;
                }
                Call::End => {
                    assert!(open, "end without begin");
                    open = false;
                }
                _ => assert!(open, "{call:?} outside of a run"),
            }
        }
        assert!(!open, "last run never ended");
    }
}

pub struct ScriptedEngine {
    ledger: Arc<Ledger>,
    scripts: HashMap<TaskKind, Script>,
    steps: VecDeque<Step>,
    active: Option<Script>,
    progress: (u64, u64),
    gate: Option<Receiver<()>>,
}

impl ScriptedEngine {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            scripts: HashMap::new(),
            steps: VecDeque::new(),
            active: None,
            progress: (0, 0),
            gate: None,
        }
    }

    pub fn with_script(mut self, kind: TaskKind, script: Script) -> Self {
        self.scripts.insert(kind, script);
        self
    }

    /// Each `poll_log` waits for one tick. Dropping the sender opens the gate.
    pub fn gated(mut self) -> (Self, Sender<()>) {
        let (sender, receiver) = unbounded();
        self.gate = Some(receiver);
        (self, sender)
    }
}

impl Engine for ScriptedEngine {
    fn begin(&mut self, kind: TaskKind) -> i32 {
        self.ledger.record(Call::Begin(kind));
        let open = self.ledger.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.ledger.max_open.fetch_max(open, Ordering::SeqCst);

        let script = self.scripts.get(&kind).cloned().unwrap_or_default();
        self.steps = script.steps.iter().cloned().collect();
        self.progress = (0, 0);
        let code = script.begin_code;
        self.active = Some(script);
        code
    }

    fn poll_log(&mut self) -> Result<Option<String>, EngineError> {
        self.ledger.record(Call::PollLog);
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        match self.steps.pop_front() {
            Some(Step::Log(line)) => Ok(Some(line)),
            Some(Step::Progress(current, target)) => {
                self.progress = (current, target);
                Ok(None)
            }
            Some(Step::Fault(code)) => Err(EngineError::fault(code, "scripted fault")),
            None => Ok(None),
        }
    }

    fn poll_progress(&mut self) -> Result<(u64, u64), EngineError> {
        self.ledger.record(Call::PollProgress);
        Ok(self.progress)
    }

    fn is_complete(&mut self) -> bool {
        self.ledger.record(Call::IsComplete);
        let endless = self.active.as_ref().is_some_and(|s| s.endless);
        self.steps.is_empty() && !endless
    }

    fn exit_code(&mut self) -> i32 {
        self.ledger.record(Call::ExitCode);
        self.active.as_ref().map_or(0, |s| s.exit_code)
    }

    fn end(&mut self) {
        self.ledger.record(Call::End);
        self.ledger.open.fetch_sub(1, Ordering::SeqCst);
        let panic_on_end = self.active.take().is_some_and(|s| s.panic_on_end);
        self.steps.clear();
        if panic_on_end {
            panic!("scripted end failure");
        }
    }
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<TaskEvent>,
}

impl Recorder {
    pub fn logs(&self, task_id: TaskId) -> Vec<String> {
        self.events
            .iter()
            .filter(|e| e.task_id == task_id)
            .filter_map(|e| match &e.kind {
                TaskEventKind::Log(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self, task_id: TaskId) -> Vec<(u64, u64)> {
        self.events
            .iter()
            .filter(|e| e.task_id == task_id)
            .filter_map(|e| match e.kind {
                TaskEventKind::Progress { current, target } => Some((current, target)),
                _ => None,
            })
            .collect()
    }

    pub fn terminals(&self, task_id: TaskId) -> Vec<TaskOutcome> {
        self.events
            .iter()
            .filter(|e| e.task_id == task_id)
            .filter_map(|e| match e.kind {
                TaskEventKind::Terminal(outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }

    pub fn outcome(&self, task_id: TaskId) -> Option<TaskOutcome> {
        self.terminals(task_id).first().copied()
    }
}

impl ProgressObserver for Recorder {
    fn on_log(&mut self, task_id: TaskId, line: &str) {
        self.events.push(TaskEvent::log(task_id, line.to_string()));
    }

    fn on_progress(&mut self, task_id: TaskId, current: u64, target: u64) {
        self.events
            .push(TaskEvent::progress(task_id, current, target));
    }

    fn on_terminal(&mut self, task_id: TaskId, outcome: TaskOutcome) {
        self.events.push(TaskEvent::terminal(task_id, outcome));
    }
}

pub const DEADLINE: Duration = Duration::from_secs(10);

pub fn fast_config() -> BridgeConfig {
    BridgeConfig {
        idle_poll_interval_ms: 0,
        ..BridgeConfig::default()
    }
}

/// Sleeps until `done` holds, panicking after [`DEADLINE`].
pub fn wait_for(what: &str, done: impl Fn() -> bool) {
    let deadline = Instant::now() + DEADLINE;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

pub fn pump_until<E: Engine + 'static>(
    controller: &mut TaskController<E>,
    recorder: &mut Recorder,
    done: impl Fn(&Recorder) -> bool,
) {
    let deadline = Instant::now() + DEADLINE;
    while !done(recorder) {
        assert!(Instant::now() < deadline, "timed out waiting for events");
        controller
            .pump(recorder, Duration::from_millis(10))
            .unwrap();
    }
}

pub fn pump_until_terminal<E: Engine + 'static>(
    controller: &mut TaskController<E>,
    recorder: &mut Recorder,
    task_id: TaskId,
) -> TaskOutcome {
    pump_until(controller, recorder, |r| r.outcome(task_id).is_some());
    recorder.outcome(task_id).unwrap()
}
