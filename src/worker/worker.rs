use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, error, info};

use crate::engine::{Engine, BEGIN_OK};
use crate::manager::task_controller::TerminalReporter;
use crate::models::{
    message::TaskEvent,
    task::{Task, TaskKind, TaskOutcome, TaskState},
};

/// Exit code reported when the drive loop itself panicked.
pub const EXIT_WORKER_PANICKED: i32 = -101;

/// Cooperative cancellation flag, checked once per drive-loop iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Decides which progress samples reach the observer: one per
/// `interval` units crossed.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: u64,
    last_bucket: u64,
}

impl ProgressThrottle {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            last_bucket: 0,
        }
    }

    pub fn should_notify(&mut self, current: u64) -> bool {
        let bucket = current / self.interval;
        if bucket > self.last_bucket {
            self.last_bucket = bucket;
            true
        } else {
            false
        }
    }
}

pub struct WorkerContext {
    pub task: Arc<Mutex<Task>>,
    pub kind: TaskKind,
    pub cancel: CancelFlag,
    pub events: Sender<TaskEvent>,
    pub progress_notify_interval: u64,
    pub idle_poll: Duration,
    pub live_workers: Arc<AtomicUsize>,
}

pub(crate) fn lock_task(task: &Mutex<Task>) -> MutexGuard<'_, Task> {
    task.lock().unwrap_or_else(PoisonError::into_inner)
}

struct LiveWorker(Arc<AtomicUsize>);

impl LiveWorker {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs the task on a dedicated thread. The engine comes back through the
/// join handle once the terminal outcome has been reported.
pub fn spawn_worker<E>(
    mut engine: E,
    ctx: WorkerContext,
    reporter: TerminalReporter,
) -> io::Result<JoinHandle<E>>
where
    E: Engine + 'static,
{
    let task_id = lock_task(&ctx.task).id;
    let live = LiveWorker::enter(&ctx.live_workers);
    thread::Builder::new()
        .name(format!("task-worker-{}", task_id.0))
        .spawn(move || {
            let _live = live;
            let outcome =
                match panic::catch_unwind(AssertUnwindSafe(|| drive(&mut engine, &ctx))) {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        error!("Drive loop for task {} panicked.", task_id);
                        TaskOutcome::Failed(EXIT_WORKER_PANICKED)
                    }
                };
            reporter.report(&mut engine, outcome);
            engine
        })
}

fn send(ctx: &WorkerContext, event: TaskEvent) {
    if ctx.events.send(event).is_err() {
        debug!("Event receiver gone, dropping update.");
    }
}

/// begin, then poll/forward/check-cancel until the engine completes or the
/// task is cancelled. Does not call `end`.
pub fn drive<E: Engine + ?Sized>(engine: &mut E, ctx: &WorkerContext) -> TaskOutcome {
    let task_id = lock_task(&ctx.task).id;

    let code = engine.begin(ctx.kind);
    if code != BEGIN_OK {
        info!("Engine rejected task {} with code {}.", task_id, code);
        return TaskOutcome::Failed(code);
    }
    lock_task(&ctx.task).state = TaskState::Running;
    info!("Task {} ({}) running.", task_id, ctx.kind);

    let mut throttle = ProgressThrottle::new(ctx.progress_notify_interval);
    let mut last_progress = (0, 0);

    loop {
        let line = match engine.poll_log() {
            Ok(line) => line,
            Err(e) => {
                error!("Task {} engine fault: {}", task_id, e);
                return TaskOutcome::Failed(e.code());
            }
        };
        let progress = match engine.poll_progress() {
            Ok(progress) => progress,
            Err(e) => {
                error!("Task {} engine fault: {}", task_id, e);
                return TaskOutcome::Failed(e.code());
            }
        };

        let mut produced = false;
        if let Some(line) = line {
            lock_task(&ctx.task).log.push(line.clone());
            send(ctx, TaskEvent::log(task_id, line));
            produced = true;
        }
        if progress != last_progress {
            let (current, target) = progress;
            lock_task(&ctx.task).record_progress(current, target);
            if throttle.should_notify(current) {
                send(ctx, TaskEvent::progress(task_id, current, target));
            }
            last_progress = progress;
            produced = true;
        }

        if ctx.cancel.is_cancelled() {
            lock_task(&ctx.task).state = TaskState::Cancelling;
            info!("Task {} cancelling.", task_id);
            return TaskOutcome::Cancelled;
        }

        if !produced {
            if engine.is_complete() {
                return TaskOutcome::Completed(engine.exit_code());
            }
            if !ctx.idle_poll.is_zero() {
                thread::sleep(ctx.idle_poll);
            }
        }
    }
}
