//! Adapter over a native engine exported through a C ABI.

use std::ffi::CStr;

use libc::{c_char, c_int};
use log::debug;

use super::{Engine, EngineError};
use crate::models::task::TaskKind;

/// Entry points exported by the native engine library.
///
/// `pull` returns a NUL-terminated line that stays valid until the next
/// `pull` or `end_task`, or null when no line is queued. The two progress
/// getters belong to older engine builds and may be absent.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NativeCommandTable {
    pub begin_test_suite: unsafe extern "C" fn() -> c_int,
    pub begin_bench: unsafe extern "C" fn() -> c_int,
    pub pull: unsafe extern "C" fn() -> *const c_char,
    pub is_complete: unsafe extern "C" fn() -> c_int,
    pub get_exit_code: unsafe extern "C" fn() -> c_int,
    pub end_task: unsafe extern "C" fn(),
    pub get_current_progress: Option<unsafe extern "C" fn() -> c_int>,
    pub get_target_progress: Option<unsafe extern "C" fn() -> c_int>,
}

pub struct NativeEngine {
    table: NativeCommandTable,
}

impl NativeEngine {
    /// # Safety
    ///
    /// Every pointer in `table` must be callable from any thread for the
    /// lifetime of the returned engine and honor the contract documented on
    /// [`NativeCommandTable`].
    pub unsafe fn new(table: NativeCommandTable) -> Self {
        Self { table }
    }
}

fn progress_value(raw: c_int) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}

impl Engine for NativeEngine {
    fn begin(&mut self, kind: TaskKind) -> i32 {
        // SAFETY: guaranteed callable by the contract of `NativeEngine::new`.
        let code = unsafe {
            match kind {
                TaskKind::TestSuite => (self.table.begin_test_suite)(),
                TaskKind::Benchmark => (self.table.begin_bench)(),
            }
        };
        debug!("Native begin({}) returned {}", kind, code);
        code
    }

    fn poll_log(&mut self) -> Result<Option<String>, EngineError> {
        // SAFETY: see `NativeEngine::new`; the line is copied out before the
        // next call can invalidate it.
        let line = unsafe {
            let ptr = (self.table.pull)();
            if ptr.is_null() {
                None
            } else {
                Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
            }
        };
        Ok(line)
    }

    fn poll_progress(&mut self) -> Result<(u64, u64), EngineError> {
        let (Some(current), Some(target)) = (
            self.table.get_current_progress,
            self.table.get_target_progress,
        ) else {
            return Ok((0, 0));
        };
        // SAFETY: see `NativeEngine::new`.
        let (current, target) = unsafe { (current(), target()) };
        Ok((progress_value(current), progress_value(target)))
    }

    fn is_complete(&mut self) -> bool {
        // SAFETY: see `NativeEngine::new`.
        unsafe { (self.table.is_complete)() != 0 }
    }

    fn exit_code(&mut self) -> i32 {
        // SAFETY: see `NativeEngine::new`.
        unsafe { (self.table.get_exit_code)() }
    }

    fn end(&mut self) {
        // SAFETY: see `NativeEngine::new`.
        unsafe { (self.table.end_task)() }
    }
}
