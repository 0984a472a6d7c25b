//! Error types for SmartPlan.
//!
//! Every variant is fatal for the task it belongs to and never for its
//! siblings in a batch. Unmatched code fences are not errors (see
//! `sanitize::FenceReport`).

use crate::llm_client::LlmError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Scene {scene_id} unavailable: {reason}")]
    SceneUnavailable { scene_id: String, reason: String },

    #[error("Robot template index {index} out of range (roster has {available} templates)")]
    RosterIndexOutOfRange { index: usize, available: usize },

    #[error("Backend invocation failed during {stage}: {source}")]
    BackendInvocation {
        stage: String,
        #[source]
        source: LlmError,
    },

    #[error("Task set error at line {line}: {message}")]
    TaskSet { line: usize, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlanError {
    /// Short stable code, written to logs and artifacts
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::SceneUnavailable { .. } => "scene_unavailable",
            PlanError::RosterIndexOutOfRange { .. } => "roster_index_out_of_range",
            PlanError::BackendInvocation { .. } => "backend_invocation",
            PlanError::TaskSet { .. } => "task_set",
            PlanError::Config(_) => "config",
            PlanError::Io(_) => "io",
            PlanError::Json(_) => "json",
        }
    }

    /// True for the error kinds that end a single task's run
    pub fn is_task_fatal(&self) -> bool {
        matches!(
            self,
            PlanError::SceneUnavailable { .. }
                | PlanError::RosterIndexOutOfRange { .. }
                | PlanError::BackendInvocation { .. }
        )
    }
}
