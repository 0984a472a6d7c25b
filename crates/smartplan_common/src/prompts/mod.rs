//! Prompt Builder
//!
//! Pure, deterministic rendering of the three stage prompts. Every stage's
//! user content is assembled in a fixed order:
//!
//! 1. capability-vocabulary preamble
//! 2. object inventory literal
//! 3. worked-example corpus, verbatim
//! 4. stage-specific dynamic content
//!
//! Later stages rely on that order: the allocation and code prompts repeat the
//! current task behind an explicit boundary marker so the model can tell it
//! apart from the worked examples above it.

pub mod allocate;
pub mod codegen;
pub mod decompose;

use crate::backend::BackendFamily;
use crate::error::PlanError;
use crate::inventory::ObjectInventory;
use crate::llm_client::{Prompt, Turn};
use crate::robots::Skill;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub use allocate::{ALLOCATE_SYSTEM_PROMPT_ADVANCED, ALLOCATE_SYSTEM_PROMPT_STANDARD, BOUNDARY_MARKER};
pub use codegen::{procedure_names, CODEGEN_SYSTEM_PROMPT_ADVANCED, CODEGEN_SYSTEM_PROMPT_STANDARD};
pub use decompose::DECOMPOSE_SYSTEM_PROMPT;

/// Width of the `=` rules around the boundary marker
pub const RULE_WIDTH: usize = 80;

/// Static worked examples, versioned outside the code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleCorpus {
    /// Decomposition demonstrations
    pub decomposition: String,
    /// Allocation demonstrations (rationale half)
    pub allocation: String,
    /// Allocation demonstrations (code half)
    pub code: String,
}

impl ExampleCorpus {
    /// Load `<plans_dir>/<decompose_set>.py`, `<allocation_set>_solution.py`
    /// and `<allocation_set>_code.py` verbatim.
    pub fn load(plans_dir: &Path, decompose_set: &str, allocation_set: &str) -> Result<Self, PlanError> {
        let read = |name: String| -> Result<String, PlanError> {
            let path = plans_dir.join(&name);
            fs::read_to_string(&path).map_err(|e| {
                PlanError::Config(format!("cannot read example corpus {}: {}", path.display(), e))
            })
        };

        Ok(Self {
            decomposition: read(format!("{}.py", decompose_set))?,
            allocation: read(format!("{}_solution.py", allocation_set))?,
            code: read(format!("{}_code.py", allocation_set))?,
        })
    }
}

/// Renders stage prompts for one backend family
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    corpus: Arc<ExampleCorpus>,
    family: BackendFamily,
}

impl PromptBuilder {
    pub fn new(corpus: Arc<ExampleCorpus>, family: BackendFamily) -> Self {
        Self { corpus, family }
    }

    pub fn family(&self) -> BackendFamily {
        self.family
    }

    pub fn corpus(&self) -> &ExampleCorpus {
        &self.corpus
    }

    /// Static part of a stage prompt: vocabulary, inventory, examples.
    /// Shared by every task of the stage that runs in the same scene.
    pub fn stage_preamble(&self, examples: &str, inventory: &ObjectInventory) -> String {
        format!(
            "{}\n\nobjects = {}\n\n{}",
            vocabulary_preamble(),
            inventory.to_literal(),
            examples
        )
    }

    pub fn decomposition_preamble(&self, inventory: &ObjectInventory) -> String {
        self.stage_preamble(&self.corpus.decomposition, inventory)
    }

    pub fn allocation_preamble(&self, inventory: &ObjectInventory) -> String {
        self.stage_preamble(&self.corpus.allocation, inventory)
    }

    pub fn code_preamble(&self, inventory: &ObjectInventory) -> String {
        self.stage_preamble(&self.corpus.code, inventory)
    }

    /// Wrap user content in the backend's prompt shape
    fn shape(&self, system: Option<&'static str>, user: String) -> Prompt {
        match (self.family, system) {
            (BackendFamily::Legacy, _) | (_, None) => Prompt::Flat(user),
            (_, Some(system)) => Prompt::Turns(vec![Turn::system(system), Turn::user(user)]),
        }
    }
}

/// `from skills import ...` followed by the runtime imports procedures use
pub fn vocabulary_preamble() -> String {
    format!(
        "from skills import {}\nimport time\nimport threading",
        Skill::vocabulary()
    )
}

pub(crate) fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}
