//! Allocation stage prompt
//!
//! The rationale produced here is free text. It is re-embedded verbatim in the
//! code-generation prompt and never parsed.

use super::{rule, PromptBuilder};
use crate::backend::BackendFamily;
use crate::inventory::ObjectInventory;
use crate::llm_client::Prompt;
use crate::robots::Roster;

/// Separates the worked examples from the task being solved
pub const BOUNDARY_MARKER: &str = "# ABOVE ARE EXAMPLES ONLY - IGNORE THEM NOW!";

/// Objective statement closing every allocation prompt
pub const ALLOCATION_OBJECTIVE: &str = "# IMPORTANT: The robots assigned to the subtasks must have all the skills those subtasks need. \
Use the minimum number of robots that is sufficient. \
Determine whether the subtasks must be performed sequentially, in parallel, or a combination of both, and allocate robots based on availability.";

/// Conversational models that need each step spelled out
pub const ALLOCATE_SYSTEM_PROMPT_STANDARD: &str = r##"You are a robot task allocation analyst.

You are given worked examples followed by a NEW task. Allocate robots for the NEW task only.
The NEW task is stated after the line "# ABOVE ARE EXAMPLES ONLY - IGNORE THEM NOW!" under "# YOUR CURRENT TASK:".

STEP 1 - REQUIRED SKILLS:
List every skill the decomposed plan calls (PickupObject, PutObject, SwitchOn, SwitchOff,
SliceObject, OpenObject, CloseObject, ThrowObject, BreakObject, CleanObject).

STEP 2 - ROBOT SKILLS:
For each robot in "robots = [...]" list its skills and mass capacity.

STEP 3 - MATCH:
Rule 1: if one robot has every required skill, assign only that robot.
Rule 2: otherwise form the smallest team whose combined skills cover the task.
Rule 3: leave out robots whose skills the task does not need.
Rule 4: in a sequential chain (pick up, wash, place) the team members coordinate on one procedure.
Rule 5: slicing needs a robot that can PickupObject (the Knife) and SliceObject.

STEP 4 - WRITE THE ANALYSIS:
Line 1: "Task: <exact task description>"
Line 2: "Required skills: <skills>"
One line per robot: "Robot N has: <skills> - can/cannot help because ..."
Last line: "Team of Robots N and M will perform this task." or "Robot N will perform this task."

Never use objects that the current task does not mention. Never allocate for the example tasks."##;

/// Conversational models that follow compact rule lists
pub const ALLOCATE_SYSTEM_PROMPT_ADVANCED: &str = r##"You are a robot task allocation expert.

OUTPUT: plain natural-language reasoning only. No markdown, no code fences.

OBJECTS:
1. Use only the objects the task description names explicitly.
2. Never substitute or invent objects.

TEAM FORMATION:
1. Robots cannot hand objects to each other.
2. The robot that picks an object up completes every action with that object.
3. A sequential chain (pickup, act, put) goes to one robot when one robot has the skills.
4. Use several robots only for independent subtasks that can run in parallel,
   or when no single robot covers the required skills.

SKILLS:
1. SliceObject needs SliceObject plus PickupObject (for the Knife); the Knife is picked up before slicing.
2. ThrowObject needs ThrowObject plus PickupObject, or a team covering both.
3. Wash and place needs PickupObject, PutObject, SwitchOn and SwitchOff.

MASS:
1. A robot's mass capacity must be at least the object's mass.
2. Otherwise form a team whose combined capacity suffices, with compatible skills.

State whether the subtasks run sequentially or in parallel and why."##;

impl PromptBuilder {
    /// Allocation prompt from the decomposed plan, task, roster and inventory
    pub fn allocation(
        &self,
        inventory: &ObjectInventory,
        plan: &str,
        task: &str,
        roster: &Roster,
    ) -> Prompt {
        let preamble = self.allocation_preamble(inventory);
        self.allocation_with_preamble(&preamble, inventory, plan, task, roster)
    }

    pub fn allocation_with_preamble(
        &self,
        preamble: &str,
        inventory: &ObjectInventory,
        plan: &str,
        task: &str,
        roster: &Roster,
    ) -> Prompt {
        let rule = rule();
        let mut user = String::with_capacity(preamble.len() + plan.len() + 1024);
        user.push_str(preamble);
        user.push_str("\n\n");
        user.push_str(plan);
        user.push_str(&format!("\n\n{}\n{}", rule, BOUNDARY_MARKER));
        user.push_str(&format!("\n# YOUR CURRENT TASK: \"{}\"", task));
        user.push_str("\n# Allocate robots for THIS task ONLY (not the examples above).");
        user.push_str(&format!("\n{}", rule));
        user.push_str("\n\n# TASK ALLOCATION");
        user.push_str(&format!(
            "\n# Scenario: There are {} robots available. The task should be performed using the minimum number of robots necessary. \
Robots should be assigned to subtasks that match their skills and mass capacity. \
Using your reasoning come up with a solution to satisfy all constraints.",
            roster.len()
        ));
        user.push_str(&format!("\n\nrobots = {}", roster.to_literal()));
        user.push_str(&format!("\n\nobjects = {}", inventory.to_literal()));
        user.push_str(&format!("\n\n{}", ALLOCATION_OBJECTIVE));
        user.push_str("\n# SOLUTION\n");

        let system = match self.family {
            BackendFamily::Legacy => None,
            BackendFamily::Standard => Some(ALLOCATE_SYSTEM_PROMPT_STANDARD),
            BackendFamily::Advanced => Some(ALLOCATE_SYSTEM_PROMPT_ADVANCED),
        };
        self.shape(system, user)
    }
}
