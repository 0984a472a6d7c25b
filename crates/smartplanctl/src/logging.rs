//! Tracing setup
//!
//! Precedence: `RUST_LOG`, then `-v` flags, then `[logging] level` from the
//! config file. Logs go to stderr so stdout stays clean for prompt output.

use tracing_subscriber::EnvFilter;

/// Filter directive for the given verbosity, config level and `RUST_LOG` value
pub fn filter_directive(verbose: u8, config_level: &str, rust_log: Option<&str>) -> String {
    if let Some(env) = rust_log.filter(|s| !s.trim().is_empty()) {
        return env.to_string();
    }
    match verbose {
        0 => config_level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

pub fn init(verbose: u8, config_level: &str) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(verbose, config_level, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
