//! SmartPlan Control - plan household tasks for a team of robots
//!
//! Per-task failures are reported in the summary; the process only exits
//! non-zero when setup fails (config, task set, corpus, catalogue).

use anyhow::Result;
use clap::{Parser, Subcommand};
use smartplan_common::PlannerConfig;
use smartplanctl::commands::{self, PromptArgs, RunArgs};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "smartplanctl")]
#[command(about = "Multi-robot task planner over a text-completion backend", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ./smartplan.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run decomposition, allocation and code generation for a task set
    Run {
        /// Floor plan number; selects the task set and scene
        #[arg(long)]
        floor_plan: u32,

        /// Run only the task at this 0-based position in the task set
        #[arg(long)]
        task_index: Option<usize>,

        /// Backend identifier, overriding the configured model
        #[arg(long)]
        model: Option<String>,

        /// Do not write artifacts
        #[arg(long)]
        no_log: bool,

        /// Show stage outputs and confirm before the next stage
        #[arg(long)]
        review: bool,
    },

    /// Print decomposition prompts without calling the backend
    Prompt {
        #[arg(long)]
        floor_plan: u32,

        #[arg(long)]
        task_index: Option<usize>,

        #[arg(long)]
        model: Option<String>,
    },

    /// List the robot template catalogue
    Robots,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PlannerConfig::load(cli.config.as_deref())?;
    smartplanctl::logging::init(cli.verbose, &config.logging.level);

    match cli.command {
        Commands::Run {
            floor_plan,
            task_index,
            model,
            no_log,
            review,
        } => {
            let args = RunArgs {
                floor_plan,
                task_index,
                model,
                no_log,
                review,
            };
            commands::run(&config, &args).map(|_| ())
        }
        Commands::Prompt {
            floor_plan,
            task_index,
            model,
        } => {
            let args = PromptArgs {
                floor_plan,
                task_index,
                model,
            };
            commands::prompt(&config, &args, &mut io::stdout())
        }
        Commands::Robots => commands::robots(&config, &mut io::stdout()),
    }
}
