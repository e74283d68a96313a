use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};

use crate::config::BridgeConfig;
use crate::engine::Engine;
use crate::error::{BridgeError, Result};
use crate::models::message::{ProgressObserver, TaskEvent};
use crate::models::task::{Task, TaskId, TaskKind, TaskOutcome, TaskSnapshot};
use crate::worker::worker::{lock_task, spawn_worker, CancelFlag, WorkerContext};

/// Worker-side half of the terminal callback. Consumed on use, so a task
/// can only ever be ended and reported once.
pub struct TerminalReporter {
    task: Arc<Mutex<Task>>,
    events: Sender<TaskEvent>,
}

impl TerminalReporter {
    pub fn report<E: Engine + ?Sized>(self, engine: &mut E, outcome: TaskOutcome) {
        if panic::catch_unwind(AssertUnwindSafe(|| engine.end())).is_err() {
            error!("Engine end panicked, reporting the outcome anyway.");
        }
        let task_id = {
            let mut task = lock_task(&self.task);
            task.finish(outcome);
            task.id
        };
        info!("Task {} {}.", task_id, outcome);
        if self
            .events
            .send(TaskEvent::terminal(task_id, outcome))
            .is_err()
        {
            warn!("Controller gone before task {} could report.", task_id);
        }
    }
}

struct ActiveTask<E> {
    id: TaskId,
    cancel: CancelFlag,
    handle: JoinHandle<E>,
}

/// Owns the engine and at most one running task.
///
/// All public entry points are meant to be called from a single foreground
/// thread. Worker updates are queued and delivered by [`pump`](Self::pump).
pub struct TaskController<E: Engine + 'static> {
    config: BridgeConfig,
    engine: Option<E>,
    active: Option<ActiveTask<E>>,
    /// Cancelled by `shutdown` but not joined yet.
    detached: Option<ActiveTask<E>>,
    current: Option<Arc<Mutex<Task>>>,
    sender: Sender<TaskEvent>,
    receiver: Receiver<TaskEvent>,
    next_id: u64,
    live_workers: Arc<AtomicUsize>,
}

impl<E: Engine + 'static> TaskController<E> {
    pub fn new(engine: E, config: BridgeConfig) -> Self {
        let (sender, receiver) = unbounded();
        TaskController {
            config,
            engine: Some(engine),
            active: None,
            detached: None,
            current: None,
            sender,
            receiver,
            next_id: 0,
            live_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Tears down any running task (blocking until its worker exits), then
    /// starts `kind` on a fresh worker and returns without waiting for it.
    pub fn start_task(&mut self, kind: TaskKind) -> Result<TaskId> {
        if let Some(detached) = self.detached.take() {
            info!("Waiting for detached task {} to end.", detached.id);
            self.reclaim(detached)?;
        }
        if let Some(active) = self.active.take() {
            warn!("Task {} superseded by a new {} request.", active.id, kind);
            active.cancel.cancel();
            self.reclaim(active)?;
        }

        let engine = self.engine.take().ok_or(BridgeError::EngineUnavailable)?;

        self.next_id += 1;
        let id = TaskId(self.next_id);
        let task = Arc::new(Mutex::new(Task::new(id, kind, self.config.max_log_lines)));
        let cancel = CancelFlag::new();

        let ctx = WorkerContext {
            task: Arc::clone(&task),
            kind,
            cancel: cancel.clone(),
            events: self.sender.clone(),
            progress_notify_interval: self.config.progress_notify_interval,
            idle_poll: self.config.idle_poll_interval(),
            live_workers: Arc::clone(&self.live_workers),
        };
        let reporter = TerminalReporter {
            task: Arc::clone(&task),
            events: self.sender.clone(),
        };

        let handle = spawn_worker(engine, ctx, reporter).map_err(|source| {
            error!("Failed to spawn worker for task {}: {}", id, source);
            BridgeError::Spawn {
                task_id: id,
                source,
            }
        })?;

        info!("Task {} ({}) started.", id, kind);
        self.current = Some(task);
        self.active = Some(ActiveTask { id, cancel, handle });
        Ok(id)
    }

    /// Requests cooperative cancellation. Never blocks.
    pub fn cancel_active_task(&self) -> bool {
        match &self.active {
            Some(active) => {
                info!("Cancellation requested for task {}.", active.id);
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels any running task without waiting for it. The slot stays busy
    /// until the worker has ended the engine run and been joined, either by
    /// `pump` or by the next `start_task`.
    pub fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            info!("Shutting down, detaching task {}.", active.id);
            active.cancel.cancel();
            self.detached = Some(active);
        }
    }

    /// Waits up to `timeout` for the next worker update, then drains whatever
    /// else is queued. Returns the number of events delivered.
    pub fn pump(
        &mut self,
        observer: &mut dyn ProgressObserver,
        timeout: Duration,
    ) -> Result<usize> {
        let mut next = self.receiver.recv_timeout(timeout).ok();
        let mut delivered = 0;
        while let Some(event) = next {
            self.dispatch(event, observer)?;
            delivered += 1;
            next = self.receiver.try_recv().ok();
        }
        Ok(delivered)
    }

    /// Foreground half of the terminal callback: frees the slot if the event
    /// belongs to the active task, then forwards the event.
    fn dispatch(&mut self, event: TaskEvent, observer: &mut dyn ProgressObserver) -> Result<()> {
        let mut reclaimed = Ok(());
        if event.is_terminal() {
            let id = event.task_id;
            if let Some(active) = self.active.take_if(|active| active.id == id) {
                reclaimed = self.reclaim(active);
            } else if let Some(detached) = self.detached.take_if(|detached| detached.id == id) {
                reclaimed = self.reclaim(detached);
            }
        }
        observer.on_event(&event);
        reclaimed
    }

    fn reclaim(&mut self, active: ActiveTask<E>) -> Result<()> {
        match active.handle.join() {
            Ok(engine) => {
                self.engine = Some(engine);
                Ok(())
            }
            Err(_) => {
                error!("Worker for task {} panicked, engine lost.", active.id);
                Err(BridgeError::WorkerPanicked { task_id: active.id })
            }
        }
    }

    pub fn active_task(&self) -> Option<TaskId> {
        self.active.as_ref().map(|active| active.id)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.detached.is_none()
    }

    /// Copy of the active task, or of the most recently started one.
    pub fn snapshot(&self) -> Option<TaskSnapshot> {
        self.current.as_ref().map(|task| lock_task(task).snapshot())
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }
}

impl<E: Engine + 'static> Drop for TaskController<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
