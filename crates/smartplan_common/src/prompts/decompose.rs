//! Decomposition stage prompt

use super::PromptBuilder;
use crate::backend::BackendFamily;
use crate::inventory::ObjectInventory;
use crate::llm_client::Prompt;

/// Shared by both conversational families
pub const DECOMPOSE_SYSTEM_PROMPT: &str = r##"You decompose household tasks into robot subtasks.

OUTPUT FORMAT:
1. Output raw Python only, no markdown fences and no prose before or after.
2. Start with the GENERAL TASK DECOMPOSITION comment or with def.
3. Each subtask is one def whose body calls only the imported skills.

DECOMPOSITION RULES:
1. Follow the structure of the worked examples for similar tasks.
2. A SliceObject call needs a Knife in hand first:
   GoToObject('Knife'), PickupObject('Knife'), then go to the target and slice.
   Put the Knife down on a surface when slicing is finished.
3. Every manipulation is preceded by GoToObject on the same object.
4. Use only objects that appear in the objects list."##;

impl PromptBuilder {
    /// Decomposition prompt: preamble, then the task as the final instruction
    pub fn decomposition(&self, inventory: &ObjectInventory, task: &str) -> Prompt {
        let preamble = self.decomposition_preamble(inventory);
        self.decomposition_with_preamble(&preamble, task)
    }

    /// Same as [`decomposition`](Self::decomposition) with a prebuilt preamble
    pub fn decomposition_with_preamble(&self, preamble: &str, task: &str) -> Prompt {
        let user = format!("{}\n\n# Task Description: {}", preamble, task);
        let system = match self.family {
            BackendFamily::Legacy => None,
            BackendFamily::Standard | BackendFamily::Advanced => Some(DECOMPOSE_SYSTEM_PROMPT),
        };
        self.shape(system, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::tests::{corpus, inventory};

    #[test]
    fn test_decomposition_ends_with_task() {
        let builder = PromptBuilder::new(corpus(), BackendFamily::Advanced);
        let prompt = builder.decomposition(&inventory(), "Wash the fork");

        assert_eq!(prompt.system_content(), Some(DECOMPOSE_SYSTEM_PROMPT));
        let user = prompt.user_content();
        assert!(user.ends_with("\n\n# Task Description: Wash the fork"));
        assert!(user.find("# EXAMPLE DECOMPOSITION").unwrap() < user.find("# Task Description").unwrap());
    }

    #[test]
    fn test_legacy_is_flat() {
        let builder = PromptBuilder::new(corpus(), BackendFamily::Legacy);
        let prompt = builder.decomposition(&inventory(), "Wash the fork");
        assert!(matches!(prompt, Prompt::Flat(_)));
    }

    #[test]
    fn test_decomposition_is_deterministic() {
        let a = PromptBuilder::new(corpus(), BackendFamily::Standard);
        let b = PromptBuilder::new(corpus(), BackendFamily::Standard);
        assert_eq!(
            a.decomposition(&inventory(), "Slice the apple"),
            b.decomposition(&inventory(), "Slice the apple")
        );
    }
}
