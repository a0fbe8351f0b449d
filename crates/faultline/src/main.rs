//! `fl`: offline operator console for faultline record stores.
//!
//! Opens the data directory the host writes to and runs one operator
//! command against it. The console is not an interactive actor, so `cause`
//! is always refused here.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use faultline_core::config::{Config, LogFormat};
use faultline_core::logging::{LogError, init_logging};
use faultline_core::{CommandSender, ComponentLabel, Engine, Operator};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "fl")]
#[command(about = "Inspect and manage failures captured by faultline")]
#[command(version)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, value_name = "FILE", env = "FAULTLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Record directory (overrides config and FAULTLINE_DATA_DIR).
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Operator command: list | show <index> | save | remove <index> | cause
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

/// Prints to stdout; holds every permission.
struct Console;

impl CommandSender for Console {
    fn send_message(&self, message: &str) {
        println!("{message}");
    }

    fn is_interactive(&self) -> bool {
        false
    }

    fn has_permission(&self, _permission: &str) -> bool {
        true
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(core) = err.downcast_ref::<faultline_core::Error>() {
                if let Some(remediation) = core.remediation() {
                    eprint!("{}", remediation.render_plain());
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load_or_default(cli.config.as_deref())
        .map_err(faultline_core::Error::from)
        .context("loading configuration")?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    match init_logging(&config.logging) {
        Ok(()) | Err(LogError::AlreadyInitialized) => {}
        Err(err) => return Err(err).context("initializing logging"),
    }

    // Offline: no host is running, so there are no loaded components.
    let engine = Engine::start(config, Arc::new(Vec::<ComponentLabel>::new()))
        .context("opening record store")?;
    let operator = Operator::new(engine);

    let args: Vec<&str> = cli.command.iter().map(String::as_str).collect();
    debug!(?args, "Running operator command");
    operator
        .execute(&Console, &args)
        .context("operator command failed")?;
    Ok(())
}
