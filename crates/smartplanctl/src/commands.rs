//! Command handlers for smartplanctl.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use smartplan_common::artifacts::{ArtifactWriter, WrittenArtifacts};
use smartplan_common::retry::RetryingClient;
use smartplan_common::tasks::{load_task_set, select_task, task_set_path};
use smartplan_common::{
    build_inventory, AlwaysProceed, Backend, BatchSummary, ExampleCorpus, HttpLlmClient, LlmClient,
    ModelInvoker, Pipeline, PipelineRun, PlannerConfig, PromptBuilder, RunState, SnapshotSceneSource,
    StageGate, TaskSpec, TemplateCatalog,
};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{info, warn};

/// Options of `smartplanctl run`
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub floor_plan: u32,
    pub task_index: Option<usize>,
    pub model: Option<String>,
    pub no_log: bool,
    pub review: bool,
}

/// Options of `smartplanctl prompt`
#[derive(Debug, Clone, Default)]
pub struct PromptArgs {
    pub floor_plan: u32,
    pub task_index: Option<usize>,
    pub model: Option<String>,
}

/// Everything a finished batch produced
pub struct BatchOutcome {
    pub backend: Backend,
    pub runs: Vec<PipelineRun>,
    /// Artifact folders, empty when logging is off
    pub folders: Vec<String>,
    /// Runs whose artifacts could not be written
    pub artifact_failures: usize,
    pub summary: BatchSummary,
}

/// Backend for this invocation: `--model` replaces the configured model,
/// a configured family still overrides the identifier heuristic
pub fn resolve_backend(config: &PlannerConfig, model: Option<&str>) -> Backend {
    let id = model.unwrap_or(&config.backend.model);
    match config.backend.family {
        Some(family) => Backend::with_family(id, family),
        None => Backend::from_id(id),
    }
}

pub fn load_tasks(config: &PlannerConfig, scene_id: &str, task_index: Option<usize>) -> Result<Vec<TaskSpec>> {
    let path = task_set_path(&config.data.dir, &config.data.test_set, scene_id);
    let tasks = load_task_set(&path, scene_id)
        .with_context(|| format!("loading task set {}", path.display()))?;
    match task_index {
        Some(index) => Ok(select_task(tasks, index)?),
        None => Ok(tasks),
    }
}

pub fn load_corpus(config: &PlannerConfig) -> Result<ExampleCorpus> {
    let dir = config.data.plans_dir();
    ExampleCorpus::load(&dir, &config.data.decompose_set, &config.data.allocation_set)
        .with_context(|| format!("loading example corpus from {}", dir.display()))
}

pub fn load_catalog(config: &PlannerConfig) -> Result<TemplateCatalog> {
    match &config.data.robots_file {
        Some(path) => TemplateCatalog::from_json_file(path)
            .with_context(|| format!("loading robot catalogue {}", path.display())),
        None => Ok(TemplateCatalog::builtin()),
    }
}

/// Handle `run` against the configured HTTP backend
pub fn run(config: &PlannerConfig, args: &RunArgs) -> Result<BatchSummary> {
    let backend = resolve_backend(config, args.model.as_deref());
    let mut llm_config = config.backend.llm_config().context("resolving backend credentials")?;
    llm_config.model = backend.id.clone();
    if llm_config.api_key.is_none() {
        warn!(
            key_file = %config.backend.key_file_path().display(),
            "no API key found; requests are sent unauthenticated"
        );
    }

    if config.retry.is_enabled() {
        info!(
            max_attempts = config.retry.max_attempts,
            backoff_ms = config.retry.backoff_ms,
            "backend retries enabled"
        );
    }

    let http = HttpLlmClient::new(llm_config)?;
    let client: Arc<dyn LlmClient> = Arc::new(RetryingClient::new(http, config.retry));

    let outcome = if args.review {
        execute(config, args, client, &crate::review::ReviewGate::stdio())?
    } else {
        execute(config, args, client, &AlwaysProceed)?
    };

    print_report(&outcome, &mut io::stdout())?;
    Ok(outcome.summary)
}

/// Load inputs, run the batch through `client` and persist artifacts.
/// Per-task failures are part of the outcome; only setup problems are errors.
pub fn execute(
    config: &PlannerConfig,
    args: &RunArgs,
    client: Arc<dyn LlmClient>,
    gate: &dyn StageGate,
) -> Result<BatchOutcome> {
    let backend = resolve_backend(config, args.model.as_deref());
    let scene_id = args.floor_plan.to_string();

    let tasks = load_tasks(config, &scene_id, args.task_index)?;
    let corpus = load_corpus(config)?;
    let catalog = load_catalog(config)?;
    let scenes = SnapshotSceneSource::new(config.data.scenes_dir());
    info!(floor_plan = %scene_id, tasks = tasks.len(), backend = %backend.id, "inputs loaded");

    let pipeline = Pipeline::new(
        ModelInvoker::new(client, backend.clone()),
        Arc::new(corpus),
        config.budgets,
    );
    let runs = pipeline.run_batch_with_gate(&tasks, &catalog, &scenes, gate);

    let written = if config.output.log_results && !args.no_log {
        ArtifactWriter::new(config.output.logs_dir.clone(), backend.id.clone())
            .write_all(&runs)
            .with_context(|| format!("creating logs directory {}", config.output.logs_dir.display()))?
    } else {
        WrittenArtifacts::default()
    };

    let summary = BatchSummary::from_runs(&runs);
    Ok(BatchOutcome {
        backend,
        runs,
        folders: written.folders,
        artifact_failures: written.failures.len(),
        summary,
    })
}

pub fn print_report(outcome: &BatchOutcome, out: &mut impl Write) -> Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{} {} ({})",
        "smartplan".bright_cyan().bold(),
        outcome.backend.id,
        outcome.backend.family
    )?;
    writeln!(out, "{}", "-".repeat(60).dimmed())?;

    for run in &outcome.runs {
        let state = run.state().as_str();
        let state = match run.state() {
            RunState::Coded => state.green().to_string(),
            RunState::Failed => state.red().to_string(),
            _ => state.yellow().to_string(),
        };
        writeln!(out, "[{}] {:<10} {}", run.task.index, state, run.task.description)?;
        if let Some(err) = run.error() {
            let stage = run.failed_stage().map(|s| s.as_str()).unwrap_or("setup");
            writeln!(out, "     {} {}: {}", "at".dimmed(), stage, err)?;
        }
    }

    let s = &outcome.summary;
    writeln!(out, "{}", "-".repeat(60).dimmed())?;
    writeln!(
        out,
        "{} total, {} coded, {} failed, {} unfinished",
        s.total, s.coded, s.failed, s.unfinished
    )?;
    for folder in &outcome.folders {
        writeln!(out, "  {} {}", "wrote".dimmed(), folder)?;
    }
    if outcome.artifact_failures > 0 {
        writeln!(
            out,
            "  {} {} task(s) could not be written",
            "artifacts".yellow(),
            outcome.artifact_failures
        )?;
    }
    Ok(())
}

/// Handle `prompt`: render decomposition prompts without calling the backend
pub fn prompt(config: &PlannerConfig, args: &PromptArgs, out: &mut impl Write) -> Result<()> {
    let backend = resolve_backend(config, args.model.as_deref());
    let scene_id = args.floor_plan.to_string();
    let tasks = load_tasks(config, &scene_id, args.task_index)?;
    let builder = PromptBuilder::new(Arc::new(load_corpus(config)?), backend.family);

    let scenes = SnapshotSceneSource::new(config.data.scenes_dir());
    let inventory = build_inventory(&scenes, &scene_id)?;
    let preamble = builder.decomposition_preamble(&inventory);

    for task in &tasks {
        let rendered = builder.decomposition_with_preamble(&preamble, &task.description);
        writeln!(
            out,
            "### task {} ({} / {})",
            task.index, backend.id, backend.family
        )?;
        if let Some(system) = rendered.system_content() {
            writeln!(out, "[system]\n{}\n", system)?;
        }
        writeln!(out, "[user]\n{}\n", rendered.user_content())?;
    }
    Ok(())
}

/// Handle `robots`: list the template catalogue with 1-based indices
pub fn robots(config: &PlannerConfig, out: &mut impl Write) -> Result<()> {
    let catalog = load_catalog(config)?;
    for (i, template) in catalog.templates().iter().enumerate() {
        let skills = template
            .skills
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "{:>3}  mass {:<6} {}", i + 1, template.mass, skills)?;
    }
    Ok(())
}
