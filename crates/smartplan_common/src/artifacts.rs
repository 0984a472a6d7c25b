//! Artifact persistence
//!
//! One folder per task under the logs directory:
//!
//! ```text
//! <logs>/<Task_words_joined>_plans_<MM-DD-YYYY-HH-MM-SS>/
//!     log.txt              task, backend, scene, inventory, roster, ground truth, bounds, outcome
//!     decomposed_plan.py
//!     allocated_plan.py
//!     code_plan.py
//! ```
//!
//! Stage files are only written for stages the task completed.

use crate::error::PlanError;
use crate::pipeline::{PipelineRun, Stage};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

/// Outcome of [`ArtifactWriter::write_all`]
#[derive(Debug, Default)]
pub struct WrittenArtifacts {
    /// Folder names created, in run order
    pub folders: Vec<String>,
    /// Task index and error for every run that could not be written
    pub failures: Vec<(usize, PlanError)>,
}

pub struct ArtifactWriter {
    logs_dir: PathBuf,
    backend_id: String,
    stamp: String,
}

impl ArtifactWriter {
    /// The timestamp is fixed here, once per batch
    pub fn new(logs_dir: impl Into<PathBuf>, backend_id: impl Into<String>) -> Self {
        Self::with_time(logs_dir, backend_id, Local::now())
    }

    pub fn with_time(logs_dir: impl Into<PathBuf>, backend_id: impl Into<String>, at: DateTime<Local>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            backend_id: backend_id.into(),
            stamp: at.format("%m-%d-%Y-%H-%M-%S").to_string(),
        }
    }

    /// `<words joined by _>_plans_<stamp>`; path separators and other
    /// characters that are not portable in a file name become `_`
    pub fn folder_name(&self, task_description: &str) -> String {
        let words: String = task_description
            .chars()
            .filter(|c| !matches!(c, '\n' | '\r'))
            .map(|c| match c {
                ' ' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        format!("{}_plans_{}", words, self.stamp)
    }

    /// Write every run on its own. A run that cannot be written is logged
    /// and reported without stopping the others; only an unusable logs
    /// directory is an error.
    pub fn write_all(&self, runs: &[PipelineRun]) -> Result<WrittenArtifacts, PlanError> {
        fs::create_dir_all(&self.logs_dir)?;
        let mut written = WrittenArtifacts::default();
        for run in runs {
            match self.write_run(run) {
                Ok(folder) => written.folders.push(folder),
                Err(e) => {
                    warn!(task = run.task.index, code = e.code(), "artifacts not written: {}", e);
                    written.failures.push((run.task.index, e));
                }
            }
        }
        Ok(written)
    }

    pub fn write_run(&self, run: &PipelineRun) -> Result<String, PlanError> {
        let (folder, dir) = self.create_folder(&run.task.description, run.task.index)?;

        fs::write(dir.join("log.txt"), self.render_log(run))?;

        for (stage, file) in [
            (Stage::Decomposition, "decomposed_plan.py"),
            (Stage::Allocation, "allocated_plan.py"),
            (Stage::CodeGeneration, "code_plan.py"),
        ] {
            if let Some(text) = run.output(stage) {
                fs::write(dir.join(file), text)?;
            }
        }

        info!(task = run.task.index, folder = %folder, "artifacts written");
        Ok(folder)
    }

    /// Create a fresh folder, never reusing one that exists. Same-named
    /// tasks get the task index appended, then a counter.
    fn create_folder(&self, description: &str, index: usize) -> Result<(String, PathBuf), PlanError> {
        let base = self.folder_name(description);
        let mut attempt = 0usize;
        loop {
            let folder = match attempt {
                0 => base.clone(),
                1 => format!("{}_{}", base, index),
                n => format!("{}_{}_{}", base, index, n),
            };
            let dir = self.logs_dir.join(&folder);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((folder, dir)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn render_log(&self, run: &PipelineRun) -> String {
        let mut log = String::new();
        let _ = write!(log, "{}", run.task.description);
        let _ = write!(log, "\n\nBackend: {}", self.backend_id);
        let _ = write!(log, "\n\nFloor Plan: {}", run.task.scene_id);
        if let Some(inventory) = &run.inventory {
            let _ = write!(log, "\n\nobjects = {}", inventory.to_literal());
        }
        if let Some(roster) = &run.roster {
            let _ = write!(log, "\nrobots = {}", roster.to_literal());
        }
        let _ = write!(log, "\nground_truth = {}", run.task.ground_truth);
        let _ = write!(log, "\ntrans = {}", run.task.transitions);
        let _ = write!(log, "\nmax_trans = {}", run.task.max_transitions);
        let _ = write!(log, "\nstate = {}", run.state().as_str());
        if let Some(err) = run.error() {
            let stage = run.failed_stage().map(|s| s.as_str()).unwrap_or("setup");
            let _ = write!(log, "\nerror = {} at {}: {}", err.code(), stage, err);
        }
        log.push('\n');
        log
    }

}
