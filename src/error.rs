use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::task::TaskId;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("[BRIDGE-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[BRIDGE-1002] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[BRIDGE-1003] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[BRIDGE-1004] terminal failure: {0}")]
    Terminal(#[from] std::io::Error),

    #[error("[BRIDGE-2001] engine is not available (lost with a failed worker)")]
    EngineUnavailable,

    #[error("[BRIDGE-2002] failed to spawn worker for task {task_id}: {source}")]
    Spawn {
        task_id: TaskId,
        #[source]
        source: std::io::Error,
    },

    #[error("[BRIDGE-2003] worker for task {task_id} panicked")]
    WorkerPanicked { task_id: TaskId },
}

impl BridgeError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "BRIDGE-1001",
            Self::ConfigParse { .. } => "BRIDGE-1002",
            Self::Io { .. } => "BRIDGE-1003",
            Self::Terminal(_) => "BRIDGE-1004",
            Self::EngineUnavailable => "BRIDGE-2001",
            Self::Spawn { .. } => "BRIDGE-2002",
            Self::WorkerPanicked { .. } => "BRIDGE-2003",
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
