//! Interactive review between stages (`run --review`)
//!
//! After decomposition and after allocation the stage outputs are printed
//! and the operator decides whether the batch moves on. Declining leaves
//! every run in its current state; nothing is marked failed.

use owo_colors::OwoColorize;
use smartplan_common::{PipelineRun, RunState, Stage, StageGate};
use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use tracing::warn;

pub struct ReviewGate<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl ReviewGate<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ReviewGate<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    pub fn into_output(self) -> W {
        self.output.into_inner()
    }

    fn ask(&self, completed: Stage, runs: &[PipelineRun]) -> io::Result<bool> {
        let mut out = self.output.borrow_mut();
        let next = match completed {
            Stage::Decomposition => Stage::Allocation,
            _ => Stage::CodeGeneration,
        };

        writeln!(out)?;
        writeln!(out, "{} {}", "review".bright_cyan().bold(), completed.as_str().bold())?;
        for run in runs {
            writeln!(out, "{}", "-".repeat(60).dimmed())?;
            writeln!(out, "[{}] {}", run.task.index, run.task.description.bright_white())?;
            match (run.state(), run.output(completed)) {
                (RunState::Failed, _) => {
                    let reason = run.error().map(|e| e.to_string()).unwrap_or_default();
                    writeln!(out, "{} {}", "failed:".red(), reason)?;
                }
                (_, Some(text)) => writeln!(out, "{}", text)?,
                (_, None) => writeln!(out, "{}", "(no output)".dimmed())?,
            }
        }
        writeln!(out, "{}", "-".repeat(60).dimmed())?;
        write!(out, "Continue to {}? [y/N] ", next.as_str())?;
        out.flush()?;

        let mut answer = String::new();
        self.input.borrow_mut().read_line(&mut answer)?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

impl<R: BufRead, W: Write> StageGate for ReviewGate<R, W> {
    fn proceed(&self, completed: Stage, runs: &[PipelineRun]) -> bool {
        match self.ask(completed, runs) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("review prompt failed, stopping batch: {}", e);
                false
            }
        }
    }
}
