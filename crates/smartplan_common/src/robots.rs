//! Robot Capability Model
//!
//! Robots are described by a skill set drawn from the abstract action
//! vocabulary and a mass capacity. A global, ordered template catalogue is
//! immutable configuration; each task gets its own roster copied out of it,
//! with robots renamed to their ordinal slot ("robot1", "robot2", ...) in
//! selection order.

use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Abstract action vocabulary.
///
/// Used both as robot skills and as the procedure calls in generated code,
/// so the serialized form is the exact call name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Skill {
    GoToObject,
    PickupObject,
    PutObject,
    OpenObject,
    CloseObject,
    BreakObject,
    ThrowObject,
    SliceObject,
    CleanObject,
    SwitchOn,
    SwitchOff,
}

impl Skill {
    /// Whole vocabulary in canonical order
    pub const ALL: [Skill; 11] = [
        Skill::GoToObject,
        Skill::PickupObject,
        Skill::PutObject,
        Skill::OpenObject,
        Skill::CloseObject,
        Skill::BreakObject,
        Skill::ThrowObject,
        Skill::SliceObject,
        Skill::CleanObject,
        Skill::SwitchOn,
        Skill::SwitchOff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Skill::GoToObject => "GoToObject",
            Skill::PickupObject => "PickupObject",
            Skill::PutObject => "PutObject",
            Skill::OpenObject => "OpenObject",
            Skill::CloseObject => "CloseObject",
            Skill::BreakObject => "BreakObject",
            Skill::ThrowObject => "ThrowObject",
            Skill::SliceObject => "SliceObject",
            Skill::CleanObject => "CleanObject",
            Skill::SwitchOn => "SwitchOn",
            Skill::SwitchOff => "SwitchOff",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Skill::ALL.iter().copied().find(|skill| skill.as_str() == s)
    }

    /// Comma-separated vocabulary, as imported by generated procedures
    pub fn vocabulary() -> String {
        Skill::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Skill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the global template catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotTemplate {
    pub skills: Vec<Skill>,
    /// Mass capacity
    pub mass: f64,
}

impl RobotTemplate {
    pub fn new(skills: &[Skill], mass: f64) -> Self {
        Self {
            skills: skills.to_vec(),
            mass,
        }
    }
}

/// A robot assigned to one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Robot {
    /// Ordinal slot name within the task's roster
    pub name: String,
    pub skills: Vec<Skill>,
    pub mass: f64,
}

impl Robot {
    /// Python-dict literal used inside prompts and artifacts
    pub fn to_literal(&self) -> String {
        let skills = self
            .skills
            .iter()
            .map(|s| format!("'{}'", s))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{{'name': '{}', 'skills': [{}], 'mass': {}}}",
            self.name, skills, self.mass
        )
    }
}

/// Ordered robots for a single task. Owned, never aliased across tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    robots: Vec<Robot>,
}

impl Roster {
    pub fn robots(&self) -> &[Robot] {
        &self.robots
    }

    pub fn len(&self) -> usize {
        self.robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    /// `[{'name': 'robot1', ...}, ...]`
    pub fn to_literal(&self) -> String {
        let items = self
            .robots
            .iter()
            .map(Robot::to_literal)
            .collect::<Vec<_>>()
            .join(", ");
        format!("[{}]", items)
    }
}

/// Global ordered template catalogue
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateCatalog {
    templates: Vec<RobotTemplate>,
}

impl TemplateCatalog {
    pub fn new(templates: Vec<RobotTemplate>) -> Self {
        Self { templates }
    }

    /// Built-in household robot catalogue
    pub fn builtin() -> Self {
        use Skill::*;
        Self::new(vec![
            RobotTemplate::new(&Skill::ALL, 100.0),
            RobotTemplate::new(&Skill::ALL, 100.0),
            RobotTemplate::new(
                &[GoToObject, OpenObject, CloseObject, BreakObject, SliceObject, SwitchOn, SwitchOff],
                100.0,
            ),
            RobotTemplate::new(&[GoToObject, PickupObject, PutObject, ThrowObject, CleanObject], 100.0),
            RobotTemplate::new(&[GoToObject, PickupObject, PutObject, OpenObject, CloseObject], 0.5),
            RobotTemplate::new(&[GoToObject, SliceObject, PickupObject, PutObject], 2.0),
            RobotTemplate::new(&[GoToObject, BreakObject, ThrowObject], 100.0),
            RobotTemplate::new(&[GoToObject, SwitchOn, SwitchOff], 100.0),
            RobotTemplate::new(&[GoToObject, PickupObject, PutObject], 100.0),
            RobotTemplate::new(&[GoToObject, OpenObject, CloseObject, SwitchOn, SwitchOff], 5.0),
        ])
    }

    /// Load a catalogue from `[{"skills": [...], "mass": 100}, ...]`
    pub fn from_json_file(path: &Path) -> Result<Self, PlanError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, PlanError> {
        let templates: Vec<RobotTemplate> = serde_json::from_str(content)
            .map_err(|e| PlanError::Config(format!("invalid robot catalogue: {}", e)))?;
        if templates.is_empty() {
            return Err(PlanError::Config("robot catalogue is empty".to_string()));
        }
        Ok(Self::new(templates))
    }

    pub fn templates(&self) -> &[RobotTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Build a task roster from 1-based template indices.
    ///
    /// Selected templates are copied and renamed `robot<N>` where N is the
    /// position in `indices`, not the template number. Duplicated indices
    /// yield distinct slots with identical capabilities.
    pub fn build_roster(&self, indices: &[usize]) -> Result<Roster, PlanError> {
        let mut robots = Vec::with_capacity(indices.len());
        for (slot, &index) in indices.iter().enumerate() {
            let template = index
                .checked_sub(1)
                .and_then(|i| self.templates.get(i))
                .ok_or(PlanError::RosterIndexOutOfRange {
                    index,
                    available: self.templates.len(),
                })?;
            robots.push(Robot {
                name: format!("robot{}", slot + 1),
                skills: template.skills.clone(),
                mass: template.mass,
            });
        }
        Ok(Roster { robots })
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
