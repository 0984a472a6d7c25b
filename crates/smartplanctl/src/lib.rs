//! SmartPlan Control - command-line front end for the planner
//!
//! The binary is a thin clap layer over the functions here, so the command
//! behaviour can be exercised from tests without spawning a process.

pub mod commands;
pub mod logging;
pub mod review;

pub use commands::{PromptArgs, RunArgs};
pub use review::ReviewGate;
