use std::{
    io::{self, Write},
    time::Duration,
};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal,
};
use log::{debug, info};

use crate::engine::Engine;
use crate::error::Result;
use crate::manager::task_controller::TaskController;
use crate::models::message::ProgressObserver;
use crate::models::task::{TaskId, TaskKind, TaskOutcome};

const PROMPT: &str = ">>> ";
const INPUT_POLL: Duration = Duration::from_millis(50);
const HEADLESS_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(TaskKind),
    Cancel,
    Status,
    Log(Option<usize>),
    Help,
    Exit,
}

pub fn parse_command(input: &str) -> std::result::Result<Option<Command>, String> {
    let mut args = input.split_whitespace();
    let command = match args.next() {
        Some(command) => command,
        None => return Ok(None),
    };
    let parsed = match command {
        "test" => Command::Start(TaskKind::TestSuite),
        "bench" => Command::Start(TaskKind::Benchmark),
        "cancel" => Command::Cancel,
        "status" => Command::Status,
        "log" => match args.next() {
            Some(count) => Command::Log(Some(
                count
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid line count '{count}'."))?,
            )),
            None => Command::Log(None),
        },
        "help" => Command::Help,
        "exit" | "quit" => Command::Exit,
        other => return Err(format!("Unknown command: {other}. Type 'help' for a list.")),
    };
    Ok(Some(parsed))
}

/// Renders task events as console lines.
pub struct ConsoleObserver<W: Write> {
    out: W,
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = write!(self.out, "\r{}\r\n", text.trim_end_matches('\n')) {
            debug!("Console write failed: {}", e);
        }
    }
}

impl<W: Write> ProgressObserver for ConsoleObserver<W> {
    fn on_log(&mut self, _task_id: TaskId, line: &str) {
        self.line(line);
    }

    fn on_progress(&mut self, task_id: TaskId, current: u64, target: u64) {
        let percent = if target == 0 {
            0
        } else {
            current.saturating_mul(100) / target
        };
        self.line(&format!("[{task_id}] progress {current}/{target} ({percent}%)"));
    }

    fn on_terminal(&mut self, task_id: TaskId, outcome: TaskOutcome) {
        self.line(&format!("Task {task_id} {outcome}!"));
        if let Err(e) = self.out.flush() {
            debug!("Console flush failed: {}", e);
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum EditorAction {
    None,
    Redraw,
    Submit(String),
}

/// Single-line editor with Up/Down history.
#[derive(Debug, Default)]
pub struct LineEditor {
    input: String,
    history: Vec<String>,
    history_index: usize,
}

impl LineEditor {
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn handle_key(&mut self, code: KeyCode) -> EditorAction {
        match code {
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.input);
                if !line.trim().is_empty() {
                    self.history.push(line.clone());
                }
                self.history_index = self.history.len();
                EditorAction::Submit(line)
            }
            KeyCode::Up => {
                if self.history_index > 0 {
                    self.history_index -= 1;
                }
                if let Some(command) = self.history.get(self.history_index) {
                    self.input = command.clone();
                }
                EditorAction::Redraw
            }
            KeyCode::Down => {
                if self.history_index < self.history.len() {
                    self.history_index += 1;
                }
                self.input = self
                    .history
                    .get(self.history_index)
                    .cloned()
                    .unwrap_or_default();
                EditorAction::Redraw
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                EditorAction::Redraw
            }
            KeyCode::Backspace => {
                self.input.pop();
                EditorAction::Redraw
            }
            _ => EditorAction::None,
        }
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn redraw_prompt(input: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(
        stdout,
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    )?;
    write!(stdout, "{PROMPT}{input}")?;
    stdout.flush()
}

fn clear_line() -> io::Result<()> {
    execute!(
        io::stdout(),
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    )
}

fn say(text: &str) {
    print!("\r{text}\r\n");
}

const HELP: &str = "Commands:\r\n  test          run the full test suite\r\n  bench         run the basic benchmark\r\n  cancel        cancel the running task\r\n  status        show the current task\r\n  log [n]       print the last n buffered lines\r\n  exit          quit";

/// Returns false once the user asked to leave.
fn execute_command<E: Engine + 'static>(
    controller: &mut TaskController<E>,
    command: Command,
) -> Result<bool> {
    match command {
        Command::Start(kind) => {
            if controller.active_task().is_some() {
                say("Cancelling current task ...");
            }
            let id = controller.start_task(kind)?;
            say("");
            say(&format!("Starting {kind} task {id} ..."));
        }
        Command::Cancel => {
            if !controller.cancel_active_task() {
                say("No task is running.");
            }
        }
        Command::Status => match controller.snapshot() {
            Some(snapshot) => say(&format!(
                "Task {} ({}): {:?}, progress {}/{}, exit code {}",
                snapshot.id,
                snapshot.kind,
                snapshot.state,
                snapshot.progress_current,
                snapshot.progress_target,
                snapshot
                    .exit_code
                    .map_or_else(|| "-".to_string(), |code| code.to_string())
            )),
            None => say("No task has been started."),
        },
        Command::Log(count) => {
            if let Some(snapshot) = controller.snapshot() {
                let skip = count.map_or(0, |n| snapshot.log.len().saturating_sub(n));
                for line in snapshot.log.iter().skip(skip) {
                    say(line.trim_end_matches('\n'));
                }
            }
        }
        Command::Help => say(HELP),
        Command::Exit => {
            say("Exiting the program...");
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn run_cli<E: Engine + 'static>(mut controller: TaskController<E>) -> Result<()> {
    println!("FFT task console started. Enter a command or 'help'.");
    let _raw = RawModeGuard::enable()?;
    let mut editor = LineEditor::default();
    let mut observer = ConsoleObserver::new(io::stdout());
    redraw_prompt(editor.input())?;

    'app_loop: loop {
        if controller.pump(&mut observer, Duration::ZERO)? > 0 {
            redraw_prompt(editor.input())?;
        }

        if !event::poll(INPUT_POLL)? {
            continue;
        }
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }

        match editor.handle_key(key_event.code) {
            EditorAction::Submit(line) => {
                say(&format!("{PROMPT}{line}"));
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if !execute_command(&mut controller, command)? {
                            break 'app_loop;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => say(&message),
                }
                redraw_prompt(editor.input())?;
            }
            EditorAction::Redraw => redraw_prompt(editor.input())?,
            EditorAction::None => {}
        }
    }

    clear_line()?;
    controller.shutdown();
    info!("Console closed.");
    Ok(())
}

/// Runs one task to its end without the interactive console.
pub fn run_headless<E: Engine + 'static>(
    controller: &mut TaskController<E>,
    kind: TaskKind,
    out: impl Write,
) -> Result<TaskOutcome> {
    let id = controller.start_task(kind)?;
    let mut observer = TerminalCapture::new(ConsoleObserver::new(out), id);
    while observer.outcome.is_none() {
        controller.pump(&mut observer, HEADLESS_POLL)?;
    }
    Ok(observer.outcome.unwrap_or(TaskOutcome::Cancelled))
}

struct TerminalCapture<W: Write> {
    inner: ConsoleObserver<W>,
    task_id: TaskId,
    outcome: Option<TaskOutcome>,
}

impl<W: Write> TerminalCapture<W> {
    fn new(inner: ConsoleObserver<W>, task_id: TaskId) -> Self {
        Self {
            inner,
            task_id,
            outcome: None,
        }
    }
}

impl<W: Write> ProgressObserver for TerminalCapture<W> {
    fn on_log(&mut self, task_id: TaskId, line: &str) {
        self.inner.on_log(task_id, line);
    }

    fn on_progress(&mut self, task_id: TaskId, current: u64, target: u64) {
        self.inner.on_progress(task_id, current, target);
    }

    fn on_terminal(&mut self, task_id: TaskId, outcome: TaskOutcome) {
        self.inner.on_terminal(task_id, outcome);
        if task_id == self.task_id {
            self.outcome = Some(outcome);
        }
    }
}
