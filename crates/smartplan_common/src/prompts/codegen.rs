//! Code-generation stage prompt

use super::{rule, PromptBuilder};
use crate::backend::BackendFamily;
use crate::inventory::ObjectInventory;
use crate::llm_client::Prompt;
use crate::robots::Roster;
use regex::Regex;
use std::sync::OnceLock;

/// Fixed instruction closing every code-generation prompt
pub const CODEGEN_INSTRUCTION: &str =
    "# Produce the executable procedures for the task in the TASK ALLOCATION section now, followed by their invocations.";

pub const CODEGEN_SYSTEM_PROMPT_STANDARD: &str = r##"You generate Python code for robot tasks.

The training examples (wash, put in fridge, slice, pick up) are EXAMPLES ONLY. Do not copy them.
Generate code only for the task in the "# TASK ALLOCATION" section.

OUTPUT:
- Python code only. No markdown, no ``` fences.
- Start with def, end with the procedure invocations.
- Generate every procedure the decomposed plan defines, and none of the examples.

ACTIONS (nothing else exists):
  GoToObject(robot, 'Object')
  OpenObject(robot, 'Object')
  CloseObject(robot, 'Object')
  BreakObject(robot, 'Object')
  PickupObject(robot, 'Object')
  PutObject(robot, 'Object', 'Receptacle')
  ThrowObject(robot, 'Object')
  SliceObject(robot, 'Object')
  CleanObject(robot, 'Object')
  SwitchOn(robot, 'Object')
  SwitchOff(robot, 'Object')

ROBOT PARAMETERS:
- Every procedure takes robot_list and calls actions with robot_list[0], robot_list[1], ...
- Never pass robot_list itself to an action.
- Invoke procedures with robots from the roster: task([robots[0]]) or task([robots[1], robots[2]]).
- Independent procedures may run on separate threads:
    t1 = threading.Thread(target=task1, args=([robots[0]],))
    t1.start(); t1.join()

READING THE ALLOCATION:
- "Robot N will perform" means robots[N-1].
- "Team of Robots N and M" means [robots[N-1], robots[M-1]].
- Inside the procedure give each action to the team member that has the skill.

RULES:
- Use only the objects the task names.
- Get the Knife (GoToObject then PickupObject) before any SliceObject.
- GoToObject before manipulating an object."##;

pub const CODEGEN_SYSTEM_PROMPT_ADVANCED: &str = r##"You generate Python code for multi-robot task allocation.

OUTPUT:
1. Raw executable Python only. No markdown, no ``` fences, no text before or after.

CODING RULES:
1. Every procedure takes robot_list; every action receives a robot: GoToObject(robot_list[0], 'Object').
2. Generate code only for the task in the TASK ALLOCATION section, following the CODE Solution examples.
3. Use only objects the task names explicitly. Never invent or substitute objects.
4. Prefer CounterTop over DiningTable for placing objects when both exist.
5. The robot that picks an object up also puts or throws that same object.
6. A sequential chain (pickup, act, put) uses one robot index throughout.
7. Before SliceObject: GoToObject(robot, 'Knife') then PickupObject(robot, 'Knife').
8. GoToObject precedes every manipulation.

SIGNATURES:
- PutObject(robot, 'Object', 'Receptacle') takes 3 arguments.
- ThrowObject(robot, 'Object') takes 2 arguments, no receptacle.
- Every other action takes (robot, 'Object').

End with the invocations, e.g. task_name([robots[0]])."##;

fn procedure_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"def\s+(\w+)\s*\(").expect("valid procedure regex"))
}

/// Names of the procedures defined in a decomposed plan, in order of appearance
pub fn procedure_names(plan: &str) -> Vec<String> {
    procedure_regex()
        .captures_iter(plan)
        .map(|c| c[1].to_string())
        .collect()
}

impl PromptBuilder {
    /// Code-generation prompt from the plan, roster and allocation rationale
    pub fn code_generation(
        &self,
        inventory: &ObjectInventory,
        plan: &str,
        roster: &Roster,
        rationale: &str,
    ) -> Prompt {
        let preamble = self.code_preamble(inventory);
        self.code_generation_with_preamble(&preamble, plan, roster, rationale)
    }

    pub fn code_generation_with_preamble(
        &self,
        preamble: &str,
        plan: &str,
        roster: &Roster,
        rationale: &str,
    ) -> Prompt {
        let mut user = format!(
            "{}\n\n{}\n# TASK ALLOCATION\n\nrobots = {}\n{}\n# CODE Solution\n{}",
            preamble,
            plan,
            roster.to_literal(),
            rationale,
            CODEGEN_INSTRUCTION
        );

        let system = match self.family {
            BackendFamily::Legacy => None,
            BackendFamily::Standard => {
                let names = procedure_names(plan);
                user.push_str(&format!(
                    "\n\n{}\n# GENERATE CODE FOR THIS TASK ONLY\n{}\n# The decomposed plan defines {} procedure(s): {}\n# Include all of them and their invocations.",
                    rule(),
                    rule(),
                    names.len(),
                    names.join(", ")
                ));
                Some(CODEGEN_SYSTEM_PROMPT_STANDARD)
            }
            BackendFamily::Advanced => {
                user.push_str("\n# Output raw Python code only.");
                Some(CODEGEN_SYSTEM_PROMPT_ADVANCED)
            }
        };
        self.shape(system, user)
    }
}
