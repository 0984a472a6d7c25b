//! Stage Pipeline Orchestrator
//!
//! Drives every task of a batch through Decomposition -> Allocation ->
//! Code-generation. Ordering is stage-major: all tasks finish stage N before
//! any task starts stage N+1. Each task is its own state machine
//!
//! ```text
//! Pending -> Decomposed -> Allocated -> Coded
//!    \___________\____________\______-> Failed
//! ```
//!
//! and a failure only ever ends the task it belongs to. Outputs of stages a
//! task already completed are kept when a later stage fails.

use crate::backend::{BackendFamily, InvokeParams, ModelInvoker};
use crate::error::PlanError;
use crate::inventory::{build_inventory, ObjectInventory, SceneSource};
use crate::prompts::{ExampleCorpus, PromptBuilder};
use crate::robots::{Roster, TemplateCatalog};
use crate::sanitize::sanitize_with_report;
use crate::tasks::TaskSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decomposition,
    Allocation,
    CodeGeneration,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Decomposition, Stage::Allocation, Stage::CodeGeneration];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decomposition => "decomposition",
            Stage::Allocation => "allocation",
            Stage::CodeGeneration => "code_generation",
        }
    }

    /// State a run must be in before this stage may start
    pub fn entry_state(&self) -> RunState {
        match self {
            Stage::Decomposition => RunState::Pending,
            Stage::Allocation => RunState::Decomposed,
            Stage::CodeGeneration => RunState::Allocated,
        }
    }

    /// State a run reaches when this stage succeeds
    pub fn exit_state(&self) -> RunState {
        match self {
            Stage::Decomposition => RunState::Decomposed,
            Stage::Allocation => RunState::Allocated,
            Stage::CodeGeneration => RunState::Coded,
        }
    }

    /// Default generation parameters per backend family
    pub fn default_params(&self, family: BackendFamily) -> InvokeParams {
        match (self, family) {
            (Stage::Decomposition, BackendFamily::Legacy) => InvokeParams::new(1000, 0.15).with_stop(&["def"]),
            (Stage::Decomposition, _) => InvokeParams::new(1300, 0.0),
            (Stage::Allocation, BackendFamily::Legacy) => InvokeParams::new(1000, 0.65).with_stop(&["def"]),
            (Stage::Allocation, BackendFamily::Standard) => InvokeParams::new(1500, 0.35),
            (Stage::Allocation, BackendFamily::Advanced) => InvokeParams::new(500, 0.69),
            (Stage::CodeGeneration, BackendFamily::Legacy) => InvokeParams::new(1000, 0.30).with_stop(&["def"]),
            (Stage::CodeGeneration, BackendFamily::Standard) => InvokeParams::new(1000, 0.5),
            (Stage::CodeGeneration, BackendFamily::Advanced) => InvokeParams::new(1400, 0.4),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Decomposed,
    Allocated,
    Coded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Coded | RunState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Decomposed => "decomposed",
            RunState::Allocated => "allocated",
            RunState::Coded => "coded",
            RunState::Failed => "failed",
        }
    }
}

/// Output-token overrides per stage; `None` keeps the family default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBudgets {
    #[serde(default)]
    pub decomposition: Option<u32>,
    #[serde(default)]
    pub allocation: Option<u32>,
    #[serde(default)]
    pub code: Option<u32>,
}

impl StageBudgets {
    pub fn for_stage(&self, stage: Stage) -> Option<u32> {
        match stage {
            Stage::Decomposition => self.decomposition,
            Stage::Allocation => self.allocation,
            Stage::CodeGeneration => self.code,
        }
    }
}

/// Per-task aggregate of inputs and stage outputs
#[derive(Debug)]
pub struct PipelineRun {
    pub task: TaskSpec,
    pub inventory: Option<Arc<ObjectInventory>>,
    pub roster: Option<Roster>,
    pub decomposed_plan: Option<String>,
    pub allocation_rationale: Option<String>,
    pub generated_code: Option<String>,
    state: RunState,
    failed_stage: Option<Stage>,
    error: Option<PlanError>,
}

impl PipelineRun {
    pub fn new(task: TaskSpec) -> Self {
        Self {
            task,
            inventory: None,
            roster: None,
            decomposed_plan: None,
            allocation_rationale: None,
            generated_code: None,
            state: RunState::Pending,
            failed_stage: None,
            error: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn error(&self) -> Option<&PlanError> {
        self.error.as_ref()
    }

    /// Stage during which the run failed; `None` for setup failures
    pub fn failed_stage(&self) -> Option<Stage> {
        self.failed_stage
    }

    pub fn output(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Decomposition => self.decomposed_plan.as_deref(),
            Stage::Allocation => self.allocation_rationale.as_deref(),
            Stage::CodeGeneration => self.generated_code.as_deref(),
        }
    }

    fn fail(&mut self, stage: Option<Stage>, error: PlanError) {
        warn!(
            task = self.task.index,
            stage = stage.map(|s| s.as_str()).unwrap_or("setup"),
            code = error.code(),
            "task failed: {}",
            error
        );
        self.state = RunState::Failed;
        self.failed_stage = stage;
        self.error = Some(error);
    }

    fn store(&mut self, stage: Stage, text: String) {
        match stage {
            Stage::Decomposition => self.decomposed_plan = Some(text),
            Stage::Allocation => self.allocation_rationale = Some(text),
            Stage::CodeGeneration => self.generated_code = Some(text),
        }
        self.state = stage.exit_state();
    }
}

/// Consulted after each stage finishes for the whole batch.
/// Returning `false` stops the batch before the next stage begins.
pub trait StageGate {
    fn proceed(&self, completed: Stage, runs: &[PipelineRun]) -> bool;
}

pub struct AlwaysProceed;

impl StageGate for AlwaysProceed {
    fn proceed(&self, _completed: Stage, _runs: &[PipelineRun]) -> bool {
        true
    }
}

/// Counts of runs per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub coded: usize,
    pub failed: usize,
    pub unfinished: usize,
}

impl BatchSummary {
    pub fn from_runs(runs: &[PipelineRun]) -> Self {
        let mut summary = BatchSummary {
            total: runs.len(),
            ..Default::default()
        };
        for run in runs {
            match run.state() {
                RunState::Coded => summary.coded += 1,
                RunState::Failed => summary.failed += 1,
                _ => summary.unfinished += 1,
            }
        }
        summary
    }
}

/// Three-stage planner over one backend
pub struct Pipeline {
    invoker: ModelInvoker,
    builder: PromptBuilder,
    budgets: StageBudgets,
}

impl Pipeline {
    pub fn new(invoker: ModelInvoker, corpus: Arc<ExampleCorpus>, budgets: StageBudgets) -> Self {
        let builder = PromptBuilder::new(corpus, invoker.family());
        Self {
            invoker,
            builder,
            budgets,
        }
    }

    pub fn builder(&self) -> &PromptBuilder {
        &self.builder
    }

    /// Generation parameters for a stage, with the token budget applied
    pub fn params_for(&self, stage: Stage) -> InvokeParams {
        let mut params = stage.default_params(self.invoker.family());
        if let Some(max_tokens) = self.budgets.for_stage(stage) {
            params.max_tokens = max_tokens;
        }
        params
    }

    /// Build a run per task: private roster copy plus the scene inventory.
    /// Each distinct scene is queried once per batch.
    pub fn prepare(
        &self,
        tasks: &[TaskSpec],
        catalog: &TemplateCatalog,
        scenes: &dyn SceneSource,
    ) -> Vec<PipelineRun> {
        let mut inventories: HashMap<String, Result<Arc<ObjectInventory>, String>> = HashMap::new();
        let mut runs = Vec::with_capacity(tasks.len());

        for task in tasks {
            let mut run = PipelineRun::new(task.clone());

            let inventory = inventories
                .entry(task.scene_id.clone())
                .or_insert_with(|| match build_inventory(scenes, &task.scene_id) {
                    Ok(inventory) => Ok(Arc::new(inventory)),
                    Err(PlanError::SceneUnavailable { reason, .. }) => Err(reason),
                    Err(other) => Err(other.to_string()),
                })
                .clone();

            match inventory {
                Ok(inventory) => run.inventory = Some(inventory),
                Err(reason) => {
                    let error = PlanError::SceneUnavailable {
                        scene_id: task.scene_id.clone(),
                        reason,
                    };
                    run.fail(None, error);
                    runs.push(run);
                    continue;
                }
            }

            match catalog.build_roster(&task.robot_indices) {
                Ok(roster) => run.roster = Some(roster),
                Err(e) => run.fail(None, e),
            }
            runs.push(run);
        }

        runs
    }

    /// Run a whole batch to completion
    pub fn run_batch(
        &self,
        tasks: &[TaskSpec],
        catalog: &TemplateCatalog,
        scenes: &dyn SceneSource,
    ) -> Vec<PipelineRun> {
        self.run_batch_with_gate(tasks, catalog, scenes, &AlwaysProceed)
    }

    pub fn run_batch_with_gate(
        &self,
        tasks: &[TaskSpec],
        catalog: &TemplateCatalog,
        scenes: &dyn SceneSource,
        gate: &dyn StageGate,
    ) -> Vec<PipelineRun> {
        info!(
            tasks = tasks.len(),
            backend = %self.invoker.backend().id,
            family = %self.invoker.family(),
            "starting batch"
        );
        let mut runs = self.prepare(tasks, catalog, scenes);

        for stage in Stage::ALL {
            self.run_stage(stage, &mut runs);
            if stage != Stage::CodeGeneration && !gate.proceed(stage, &runs) {
                info!(%stage, "batch halted by stage gate");
                break;
            }
        }

        let summary = BatchSummary::from_runs(&runs);
        info!(
            coded = summary.coded,
            failed = summary.failed,
            unfinished = summary.unfinished,
            "batch finished"
        );
        runs
    }

    /// Advance every eligible run through one stage
    pub fn run_stage(&self, stage: Stage, runs: &mut [PipelineRun]) {
        let params = self.params_for(stage);
        let mut preambles: HashMap<String, String> = HashMap::new();
        let eligible = runs.iter().filter(|r| r.state() == stage.entry_state()).count();
        info!(%stage, eligible, "stage started");

        for run in runs.iter_mut() {
            if run.state() != stage.entry_state() {
                continue;
            }
            match self.advance(stage, run, &params, &mut preambles) {
                Ok(()) => debug!(%stage, task = run.task.index, "stage complete for task"),
                Err(e) => run.fail(Some(stage), e),
            }
        }
    }

    fn advance(
        &self,
        stage: Stage,
        run: &mut PipelineRun,
        params: &InvokeParams,
        preambles: &mut HashMap<String, String>,
    ) -> Result<(), PlanError> {
        let (inventory, roster) = match (&run.inventory, &run.roster) {
            (Some(inventory), Some(roster)) => (inventory.clone(), roster),
            _ => return Err(PlanError::Config("run has no inventory or roster".to_string())),
        };

        let preamble = preambles
            .entry(inventory.scene_id().to_string())
            .or_insert_with(|| match stage {
                Stage::Decomposition => self.builder.decomposition_preamble(&inventory),
                Stage::Allocation => self.builder.allocation_preamble(&inventory),
                Stage::CodeGeneration => self.builder.code_preamble(&inventory),
            });

        let plan = run.decomposed_plan.as_deref().unwrap_or_default();
        let prompt = match stage {
            Stage::Decomposition => self
                .builder
                .decomposition_with_preamble(preamble, &run.task.description),
            Stage::Allocation => self.builder.allocation_with_preamble(
                preamble,
                &inventory,
                plan,
                &run.task.description,
                roster,
            ),
            Stage::CodeGeneration => self.builder.code_generation_with_preamble(
                preamble,
                plan,
                roster,
                run.allocation_rationale.as_deref().unwrap_or_default(),
            ),
        };
        debug!(%stage, task = run.task.index, prompt_chars = prompt.char_len(), "prompt built");

        let raw = self
            .invoker
            .invoke(&prompt, params)
            .map_err(|source| PlanError::BackendInvocation {
                stage: stage.as_str().to_string(),
                source,
            })?;

        let sanitized = sanitize_with_report(&raw);
        if sanitized.report.unmatched_open_fence() {
            warn!(%stage, task = run.task.index, "opening code fence without closing fence; stripped opening only");
        }
        run.store(stage, sanitized.text);
        Ok(())
    }
}
