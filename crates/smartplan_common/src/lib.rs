//! SmartPlan Common - multi-robot task planning over a text-completion backend
//!
//! A natural-language household task goes through three backend calls:
//! decomposition into subtasks, allocation of robots to subtasks, and
//! generation of executable procedures. This crate holds the robot model,
//! prompt construction, backend adapter, sanitizer and the stage pipeline.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod error;
pub mod inventory;
pub mod llm_client;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod robots;
pub mod sanitize;
pub mod tasks;

pub use backend::{Backend, BackendFamily, InvokeParams, ModelInvoker, Strategy};
pub use config::PlannerConfig;
pub use error::PlanError;
pub use inventory::{build_inventory, ObjectInventory, SceneObject, SceneSource, SnapshotSceneSource, StaticSceneSource};
pub use llm_client::{CompletionRequest, FakeLlmClient, HttpLlmClient, LlmClient, LlmConfig, LlmError, Prompt, Role, Turn};
pub use pipeline::{AlwaysProceed, BatchSummary, Pipeline, PipelineRun, RunState, Stage, StageBudgets, StageGate};
pub use prompts::{ExampleCorpus, PromptBuilder};
pub use robots::{Robot, RobotTemplate, Roster, Skill, TemplateCatalog};
pub use sanitize::{sanitize, sanitize_with_report};
pub use tasks::TaskSpec;
