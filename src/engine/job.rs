//! In-process engine that runs one job closure per task kind on its own
//! thread and exposes it through the polling command surface.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use thiserror::Error;

use super::{Engine, EngineError, BEGIN_OK};
use crate::models::task::TaskKind;

pub const BEGIN_BUSY: i32 = 2;
pub const BEGIN_NO_JOB: i32 = 3;
pub const BEGIN_SPAWN_FAILED: i32 = 4;

pub const EXIT_CANCELLED: i32 = -2;
pub const EXIT_PANICKED: i32 = -1;

/// Returned from [`JobContext::checkpoint`] once the job should unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("job cancelled")]
pub struct JobCancelled;

pub type JobResult = Result<i32, JobCancelled>;

type JobFn = Arc<dyn Fn(&JobContext) -> JobResult + Send + Sync>;

#[derive(Default)]
struct JobShared {
    cancelled: AtomicBool,
    completed: AtomicBool,
    exit_code: AtomicI32,
    current: AtomicU64,
    target: AtomicU64,
}

/// Handle a running job uses to report output and observe cancellation.
pub struct JobContext {
    shared: Arc<JobShared>,
    messages: Sender<String>,
}

impl JobContext {
    pub fn log(&self, line: impl Into<String>) {
        if self.messages.send(line.into()).is_err() {
            debug!("Engine output dropped, job already released.");
        }
    }

    pub fn set_progress(&self, current: u64, target: u64) {
        self.shared.target.store(target, Ordering::SeqCst);
        self.shared.current.store(current, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    pub fn checkpoint(&self) -> Result<(), JobCancelled> {
        if self.is_cancelled() {
            Err(JobCancelled)
        } else {
            Ok(())
        }
    }
}

struct RunningJob {
    shared: Arc<JobShared>,
    messages: Receiver<String>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct JobEngine {
    jobs: HashMap<TaskKind, JobFn>,
    running: Option<RunningJob>,
}

impl JobEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job<F>(mut self, kind: TaskKind, job: F) -> Self
    where
        F: Fn(&JobContext) -> JobResult + Send + Sync + 'static,
    {
        self.jobs.insert(kind, Arc::new(job));
        self
    }
}

fn run_job(job: JobFn, context: JobContext) {
    let shared = Arc::clone(&context.shared);
    let code = match panic::catch_unwind(AssertUnwindSafe(|| job(&context))) {
        Ok(Ok(code)) => code,
        Ok(Err(JobCancelled)) => EXIT_CANCELLED,
        Err(_) => {
            error!("Engine job panicked.");
            EXIT_PANICKED
        }
    };
    // Every message is queued before completion becomes visible.
    drop(context);
    shared.exit_code.store(code, Ordering::SeqCst);
    shared.completed.store(true, Ordering::SeqCst);
}

impl Engine for JobEngine {
    fn begin(&mut self, kind: TaskKind) -> i32 {
        if self.running.is_some() {
            warn!("Engine busy, rejecting {}.", kind);
            return BEGIN_BUSY;
        }
        let Some(job) = self.jobs.get(&kind).cloned() else {
            warn!("No job registered for {}.", kind);
            return BEGIN_NO_JOB;
        };

        let shared = Arc::new(JobShared::default());
        let (sender, receiver) = unbounded();
        let context = JobContext {
            shared: Arc::clone(&shared),
            messages: sender,
        };

        match thread::Builder::new()
            .name(format!("engine-{}", kind).replace(' ', "-"))
            .spawn(move || run_job(job, context))
        {
            Ok(handle) => {
                info!("Engine job for {} started.", kind);
                self.running = Some(RunningJob {
                    shared,
                    messages: receiver,
                    handle: Some(handle),
                });
                BEGIN_OK
            }
            Err(e) => {
                error!("Failed to spawn engine job: {}", e);
                BEGIN_SPAWN_FAILED
            }
        }
    }

    fn poll_log(&mut self) -> Result<Option<String>, EngineError> {
        Ok(self
            .running
            .as_ref()
            .and_then(|job| job.messages.try_recv().ok()))
    }

    fn poll_progress(&mut self) -> Result<(u64, u64), EngineError> {
        Ok(self.running.as_ref().map_or((0, 0), |job| {
            (
                job.shared.current.load(Ordering::SeqCst),
                job.shared.target.load(Ordering::SeqCst),
            )
        }))
    }

    fn is_complete(&mut self) -> bool {
        self.running.as_ref().map_or(true, |job| {
            job.shared.completed.load(Ordering::SeqCst) && job.messages.is_empty()
        })
    }

    fn exit_code(&mut self) -> i32 {
        self.running
            .as_ref()
            .map_or(0, |job| job.shared.exit_code.load(Ordering::SeqCst))
    }

    fn end(&mut self) {
        let Some(mut job) = self.running.take() else {
            return;
        };
        job.shared.cancelled.store(true, Ordering::SeqCst);
        if let Some(handle) = job.handle.take() {
            if handle.join().is_err() {
                error!("Engine job thread terminated abnormally.");
            }
        }
        info!("Engine job released.");
    }
}

impl Drop for JobEngine {
    fn drop(&mut self) {
        self.end();
    }
}
