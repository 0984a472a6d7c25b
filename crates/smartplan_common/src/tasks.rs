//! Task sets
//!
//! A task set is a JSONL file, one task per line:
//! `{"task": "...", "robot list": [1, 2], "object_states": [...], "trans": 0, "max_trans": 1}`.
//! Ground truth and transition bounds are carried through to the artifacts
//! untouched; nothing in the pipeline reads them.

use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One natural-language task and what it needs to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// 0-based ordinal within the task set
    pub index: usize,
    /// Passed through as written in the task set, whitespace included
    pub description: String,
    /// 1-based indices into the robot template catalogue
    pub robot_indices: Vec<usize>,
    pub scene_id: String,
    #[serde(default)]
    pub ground_truth: serde_json::Value,
    #[serde(default)]
    pub transitions: u64,
    #[serde(default)]
    pub max_transitions: u64,
}

impl TaskSpec {
    pub fn new(index: usize, description: impl Into<String>, robot_indices: Vec<usize>, scene_id: impl Into<String>) -> Self {
        Self {
            index,
            description: description.into(),
            robot_indices,
            scene_id: scene_id.into(),
            ground_truth: serde_json::Value::Null,
            transitions: 0,
            max_transitions: 0,
        }
    }
}

#[derive(Deserialize)]
struct TaskLine {
    task: String,
    #[serde(rename = "robot list")]
    robot_list: Vec<usize>,
    #[serde(default)]
    object_states: serde_json::Value,
    #[serde(default)]
    trans: u64,
    #[serde(default)]
    max_trans: u64,
}

/// Parse a JSONL task set. All tasks are bound to `scene_id`.
pub fn parse_task_set(content: &str, scene_id: &str) -> Result<Vec<TaskSpec>, PlanError> {
    let mut tasks = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: TaskLine = serde_json::from_str(line).map_err(|e| PlanError::TaskSet {
            line: line_no + 1,
            message: e.to_string(),
        })?;
        tasks.push(TaskSpec {
            index: tasks.len(),
            description: parsed.task,
            robot_indices: parsed.robot_list,
            scene_id: scene_id.to_string(),
            ground_truth: parsed.object_states,
            transitions: parsed.trans,
            max_transitions: parsed.max_trans,
        });
    }
    Ok(tasks)
}

pub fn load_task_set(path: &Path, scene_id: &str) -> Result<Vec<TaskSpec>, PlanError> {
    let content = fs::read_to_string(path).map_err(|e| {
        PlanError::Config(format!("cannot read task set {}: {}", path.display(), e))
    })?;
    parse_task_set(&content, scene_id)
}

/// Path of the task set for a floor plan: `<data>/<test_set>/FloorPlan<N>.json`
pub fn task_set_path(data_dir: &Path, test_set: &str, scene_id: &str) -> std::path::PathBuf {
    data_dir.join(test_set).join(format!("FloorPlan{}.json", scene_id))
}

/// Keep only the task at `index`, failing before any backend call if absent
pub fn select_task(tasks: Vec<TaskSpec>, index: usize) -> Result<Vec<TaskSpec>, PlanError> {
    let total = tasks.len();
    tasks
        .into_iter()
        .find(|t| t.index == index)
        .map(|t| vec![t])
        .ok_or_else(|| {
            PlanError::Config(format!(
                "task index {} out of range (0-{})",
                index,
                total.saturating_sub(1)
            ))
        })
}
