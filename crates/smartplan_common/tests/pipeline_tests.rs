//! Pipeline behaviour against scripted backends
//!
//! The "oracle" backend below reads the prompts it receives the way a model
//! would have to: it finds the plan, the roster and the rationale in the
//! positions the prompt builder puts them, and answers from those alone.

use regex::Regex;
use smartplan_common::prompts::codegen::CODEGEN_INSTRUCTION;
use smartplan_common::prompts::{BOUNDARY_MARKER, DECOMPOSE_SYSTEM_PROMPT};
use smartplan_common::{
    Backend, CompletionRequest, ExampleCorpus, FakeLlmClient, LlmError, ModelInvoker, Pipeline,
    PlanError, PromptBuilder, RobotTemplate, RunState, Skill, Stage, StageBudgets,
    StaticSceneSource, TaskSpec, TemplateCatalog,
};
use std::sync::Arc;

const WASH_FORK: &str = "Wash the fork and put it in the bowl";

const WASH_FORK_PLAN: &str = "```python
# GENERAL TASK DECOMPOSITION
# Independent subtasks:
# SubTask 1: Wash the fork and put it in the bowl. (Skills Required: GoToObject, PickupObject, PutObject, SwitchOn, SwitchOff)

def wash_fork_and_put_in_bowl():
    GoToObject('Fork')
    PickupObject('Fork')
    GoToObject('Sink')
    PutObject('Fork', 'Sink')
    SwitchOn('Faucet')
    SwitchOff('Faucet')
    PickupObject('Fork')
    GoToObject('Bowl')
    PutObject('Fork', 'Bowl')

wash_fork_and_put_in_bowl()
```";

fn corpus() -> Arc<ExampleCorpus> {
    Arc::new(ExampleCorpus {
        decomposition: "# decomposition examples".into(),
        allocation: "# allocation examples".into(),
        code: "# code examples".into(),
    })
}

fn scenes() -> StaticSceneSource {
    StaticSceneSource::new().with_scene(
        "6",
        &[("Fork", 0.1), ("Bowl", 0.3), ("Sink", 20.0), ("Faucet", 5.0), ("Vase", 1.2)],
    )
}

/// A = switches, B = manipulation, C = destruction
fn abc_catalog() -> TemplateCatalog {
    TemplateCatalog::new(vec![
        RobotTemplate::new(&[Skill::SwitchOn, Skill::SwitchOff], 100.0),
        RobotTemplate::new(&[Skill::PickupObject, Skill::PutObject], 100.0),
        RobotTemplate::new(&[Skill::BreakObject, Skill::ThrowObject], 100.0),
    ])
}

fn pipeline(client: Arc<FakeLlmClient>, model: &str) -> Pipeline {
    Pipeline::new(
        ModelInvoker::new(client, Backend::from_id(model)),
        corpus(),
        StageBudgets::default(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seen {
    Decomposition,
    Allocation,
    Code,
}

fn classify(req: &CompletionRequest) -> Seen {
    let user = req.prompt.user_content();
    if user.contains(CODEGEN_INSTRUCTION) {
        Seen::Code
    } else if user.contains(BOUNDARY_MARKER) {
        Seen::Allocation
    } else {
        Seen::Decomposition
    }
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
    let from = text.find(start).map(|i| i + start.len()).unwrap_or(0);
    let to = text[from..].find(end).map(|i| from + i).unwrap_or(text.len());
    text[from..to].trim()
}

/// (slot name, skills) parsed from the `robots = [...]` literal
fn parse_roster(user: &str) -> Vec<(String, Vec<String>)> {
    let re = Regex::new(r"\{'name': '(robot\d+)', 'skills': \[([^\]]*)\], 'mass': [^}]*\}").unwrap();
    let line = user.lines().find(|l| l.starts_with("robots = ")).unwrap();
    re.captures_iter(line)
        .map(|c| {
            let skills = c[2]
                .split(", ")
                .map(|s| s.trim_matches('\'').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            (c[1].to_string(), skills)
        })
        .collect()
}

/// Action calls in a plan: (skill, argument text)
fn plan_calls(plan: &str) -> Vec<(String, String)> {
    let re = Regex::new(r"^\s*(\w+)\((.*)\)\s*$").unwrap();
    plan.lines()
        .filter_map(|l| re.captures(l))
        .filter(|c| Skill::parse(&c[1]).is_some())
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

/// Stand-in model that allocates by skill coverage and writes code from the rationale
fn oracle(req: &CompletionRequest) -> Result<String, LlmError> {
    let user = req.prompt.user_content();
    match classify(req) {
        Seen::Decomposition => Ok(WASH_FORK_PLAN.to_string()),
        Seen::Allocation => {
            let plan = between(user, "# allocation examples", BOUNDARY_MARKER);
            let required: Vec<String> = plan_calls(plan)
                .into_iter()
                .map(|(skill, _)| skill)
                .filter(|s| s != "GoToObject")
                .fold(Vec::new(), |mut acc, s| {
                    if !acc.contains(&s) {
                        acc.push(s);
                    }
                    acc
                });

            let team: Vec<(String, Vec<String>)> = parse_roster(user)
                .into_iter()
                .filter(|(_, skills)| skills.iter().any(|s| required.contains(s)))
                .collect();

            let mut text = format!("Required skills: {}.\n", required.join(", "));
            let numbers: Vec<String> = team
                .iter()
                .map(|(name, _)| name.trim_start_matches("robot").to_string())
                .collect();
            text.push_str(&format!("Team of Robots {} will perform this task:", numbers.join(" and ")));
            for (name, skills) in &team {
                text.push_str(&format!(" {} uses {};", name, skills.join(", ")));
            }
            Ok(text)
        }
        Seen::Code => {
            let plan = between(user, "# code examples", "# TASK ALLOCATION");
            let roster_at = user.find("\nrobots = ").unwrap() + 1;
            let rationale = between(&user[roster_at..], "\n", "# CODE Solution");
            let roster = parse_roster(user);

            let named = Regex::new(r"robot(\d+)").unwrap();
            let mut team: Vec<usize> = named
                .captures_iter(rationale)
                .map(|c| c[1].parse::<usize>().unwrap())
                .collect();
            team.sort_unstable();
            team.dedup();

            let member_skills = |slot: usize| roster[slot - 1].1.clone();
            let holder = |skill: &str| {
                team.iter()
                    .position(|&slot| member_skills(slot).iter().any(|s| s == skill))
                    .unwrap_or(0)
            };

            let proc_name = Regex::new(r"def\s+(\w+)\(").unwrap().captures(plan).unwrap()[1].to_string();
            let mut code = format!("```python\ndef {}(robot_list):\n", proc_name);
            for (skill, args) in plan_calls(plan) {
                let idx = if skill == "GoToObject" { holder("PickupObject") } else { holder(&skill) };
                code.push_str(&format!("    {}(robot_list[{}], {})\n", skill, idx, args));
            }
            let robots: Vec<String> = team.iter().map(|slot| format!("robots[{}]", slot - 1)).collect();
            code.push_str(&format!("\n{}([{}])\n```", proc_name, robots.join(", ")));
            Ok(code)
        }
    }
}

#[test]
fn wash_fork_end_to_end_uses_only_needed_robots() {
    for model in ["gpt-4", "gpt-3.5-turbo", "text-davinci-003"] {
        let client = Arc::new(FakeLlmClient::with_responder(oracle));
        let p = pipeline(client.clone(), model);
        let tasks = vec![TaskSpec::new(0, WASH_FORK, vec![1, 2, 3], "6")];

        let runs = p.run_batch(&tasks, &abc_catalog(), &scenes());
        let run = &runs[0];
        assert_eq!(run.state(), RunState::Coded, "model {}", model);

        // Allocation names A (robot1) and B (robot2) only
        let rationale = run.allocation_rationale.as_deref().unwrap();
        assert!(rationale.contains("robot1"), "{}", rationale);
        assert!(rationale.contains("robot2"), "{}", rationale);
        assert!(!rationale.contains("robot3"), "{}", rationale);

        // One procedure, invoked once with exactly [A, B]
        let code = run.generated_code.as_deref().unwrap();
        assert!(!code.contains("```"), "fences must be stripped: {}", code);
        let invocations: Vec<&str> = code.lines().filter(|l| l.starts_with("wash_fork_and_put_in_bowl(")).collect();
        assert_eq!(invocations, vec!["wash_fork_and_put_in_bowl([robots[0], robots[1]])"]);

        // Manipulation on B, switches on A, nothing on C
        assert!(code.contains("PickupObject(robot_list[1], 'Fork')"));
        assert!(code.contains("PutObject(robot_list[1], 'Fork', 'Bowl')"));
        assert!(code.contains("SwitchOn(robot_list[0], 'Faucet')"));
        assert!(code.contains("SwitchOff(robot_list[0], 'Faucet')"));
        assert!(!code.contains("robot_list[2]"));
        assert!(!code.contains("robots[2]"));
        assert!(!code.contains("BreakObject") && !code.contains("ThrowObject"));

        // Decomposed plan was sanitized before being re-embedded
        assert!(run.decomposed_plan.as_deref().unwrap().starts_with("# GENERAL TASK DECOMPOSITION"));
        assert_eq!(client.call_count(), 3);
    }
}

#[test]
fn batch_is_stage_major() {
    let client = Arc::new(FakeLlmClient::with_responder(oracle));
    let p = pipeline(client.clone(), "gpt-4");
    let tasks = vec![
        TaskSpec::new(0, WASH_FORK, vec![1, 2, 3], "6"),
        TaskSpec::new(1, "Wash the bowl", vec![2, 1], "6"),
    ];

    let runs = p.run_batch(&tasks, &abc_catalog(), &scenes());
    assert!(runs.iter().all(|r| r.state() == RunState::Coded));

    let requests = client.requests();
    let order: Vec<Seen> = requests.iter().map(classify).collect();
    assert_eq!(
        order,
        vec![
            Seen::Decomposition,
            Seen::Decomposition,
            Seen::Allocation,
            Seen::Allocation,
            Seen::Code,
            Seen::Code
        ]
    );

    // Within a stage, tasks keep batch order
    assert!(requests[0].prompt.user_content().ends_with(WASH_FORK));
    assert!(requests[1].prompt.user_content().ends_with("Wash the bowl"));
    assert_eq!(requests[0].prompt.system_content(), Some(DECOMPOSE_SYSTEM_PROMPT));
}

#[test]
fn failing_task_does_not_stop_siblings() {
    let client = Arc::new(FakeLlmClient::with_responder(|req| {
        let user = req.prompt.user_content();
        if classify(req) == Seen::Allocation && user.contains("# YOUR CURRENT TASK: \"task two\"") {
            return Err(LlmError::HttpError("HTTP 503 Service Unavailable".into()));
        }
        oracle(req)
    }));
    let p = pipeline(client.clone(), "gpt-4");
    let tasks = vec![
        TaskSpec::new(0, "task one", vec![1, 2], "6"),
        TaskSpec::new(1, "task two", vec![1, 2], "6"),
        TaskSpec::new(2, "task three", vec![1, 2], "6"),
    ];

    let runs = p.run_batch(&tasks, &abc_catalog(), &scenes());

    assert_eq!(runs[0].state(), RunState::Coded);
    assert_eq!(runs[2].state(), RunState::Coded);
    assert_eq!(runs[1].state(), RunState::Failed);
    assert_eq!(runs[1].failed_stage(), Some(Stage::Allocation));
    assert!(matches!(runs[1].error(), Some(PlanError::BackendInvocation { .. })));
    assert!(runs[1].decomposed_plan.is_some());
    assert!(runs[1].generated_code.is_none());

    // 3 decompositions, 3 allocation attempts, 2 code generations
    assert_eq!(client.call_count(), 8);
}

#[test]
fn prompts_are_byte_identical_across_calls() {
    let inventory = smartplan_common::build_inventory(&scenes(), "6").unwrap();
    let roster = abc_catalog().build_roster(&[1, 2, 3]).unwrap();
    let plan = "def wash_fork_and_put_in_bowl():\n    PickupObject('Fork')";

    for family in ["gpt-4", "gpt-3.5-turbo", "davinci"] {
        let family = Backend::from_id(family).family;
        let a = PromptBuilder::new(corpus(), family);
        let b = PromptBuilder::new(corpus(), family);

        assert_eq!(a.decomposition(&inventory, WASH_FORK), b.decomposition(&inventory, WASH_FORK));
        assert_eq!(
            a.allocation(&inventory, plan, WASH_FORK, &roster),
            b.allocation(&inventory, plan, WASH_FORK, &roster)
        );
        assert_eq!(
            a.code_generation(&inventory, plan, &roster, "Team of Robots 1 and 2."),
            b.code_generation(&inventory, plan, &roster, "Team of Robots 1 and 2.")
        );
    }
}

#[test]
fn shared_scene_is_fetched_once_and_failures_are_per_task() {
    let client = Arc::new(FakeLlmClient::with_responder(oracle));
    let p = pipeline(client.clone(), "gpt-4");
    let tasks = vec![
        TaskSpec::new(0, WASH_FORK, vec![1, 2], "6"),
        TaskSpec::new(1, WASH_FORK, vec![4], "6"),
        TaskSpec::new(2, WASH_FORK, vec![1, 2], "missing"),
    ];

    let runs = p.run_batch(&tasks, &abc_catalog(), &scenes());
    assert_eq!(runs[0].state(), RunState::Coded);
    assert!(matches!(runs[1].error(), Some(PlanError::RosterIndexOutOfRange { index: 4, available: 3 })));
    assert!(matches!(runs[2].error(), Some(PlanError::SceneUnavailable { .. })));
    assert!(Arc::ptr_eq(runs[0].inventory.as_ref().unwrap(), runs[1].inventory.as_ref().unwrap()));
    assert_eq!(client.call_count(), 3);
}
