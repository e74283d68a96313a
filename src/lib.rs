pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod models;
pub mod worker;

pub use config::{BenchmarkConfig, BridgeConfig};
pub use engine::{Engine, EngineError, JobContext, JobEngine, NativeCommandTable, NativeEngine};
pub use error::{BridgeError, Result};
pub use manager::task_controller::TaskController;
pub use models::log_buffer::LogBuffer;
pub use models::message::{ProgressObserver, TaskEvent, TaskEventKind};
pub use models::task::{TaskId, TaskKind, TaskOutcome, TaskSnapshot, TaskState};
