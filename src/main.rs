#![forbid(unsafe_code)]

//! `appbooter` — application booter binary.
//!
//! Loads configuration, prepares the realm config and platform archive, and
//! either supervises the application until it stops (`run`) or leaves it
//! running in the background (`start`).

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use appbooter::booter::{default_config_path, Booter, RunOutcome};
use appbooter::config::BooterConfig;
use appbooter::{AppError, Result};

/// Upper bound on runtime teardown; the operator-input reader may still be
/// parked in a blocking read.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "appbooter", about = "Forked application booter", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (default: `appbooter.toml` when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Launch the application and supervise it until it shuts down.
    Run(LaunchArgs),
    /// Launch the application in the background and print its pid.
    Start(LaunchArgs),
}

/// Flags shared by `run` and `start`; each one can only switch a setting on.
#[derive(Debug, Args)]
struct LaunchArgs {
    /// Launch the child under the debug interpreter command.
    #[arg(long)]
    debug: bool,

    /// Log the assembled command line and resolved artifacts.
    #[arg(long)]
    debug_output: bool,

    /// Return as soon as the application is launched.
    #[arg(long)]
    disable_blocking: bool,

    /// Put test classes and test-scoped dependencies on the realm.
    #[arg(long)]
    include_test_classpath: bool,

    /// Override the interpreter command line.
    #[arg(long)]
    java_cmd: Option<String>,
}

impl LaunchArgs {
    fn apply(self, config: &mut BooterConfig) {
        config.debug |= self.debug;
        config.debug_output |= self.debug_output;
        config.disable_blocking |= self.disable_blocking;
        config.include_test_classpath |= self.include_test_classpath;
        if let Some(cmd) = self.java_cmd {
            config.java_cmd = cmd;
        }
    }
}

fn main() {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            std::process::exit(1);
        }
    };

    let outcome = runtime.block_on(run(args));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(%err, "appbooter failed");
            std::process::exit(1);
        }
    }
}

async fn run(args: Cli) -> Result<i32> {
    let mut config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Run(launch) => {
            launch.apply(&mut config);
            let booter = Booter::new(config);
            let input = BufReader::new(tokio::io::stdin());
            match booter.run(Some(input), shutdown_signal()).await? {
                RunOutcome::Exited(code) => {
                    info!(exit_code = code, "appbooter finished");
                    Ok(code)
                }
                RunOutcome::Detached(pid) => {
                    println!("{pid}");
                    Ok(0)
                }
            }
        }
        Command::Start(launch) => {
            launch.apply(&mut config);
            let pid = Booter::new(config).start()?;
            println!("{pid}");
            Ok(0)
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<BooterConfig> {
    let mut config = match path {
        Some(path) => BooterConfig::load_from_path(path)?,
        None => {
            let fallback = default_config_path();
            if fallback.is_file() {
                BooterConfig::load_from_path(&fallback)?
            } else {
                BooterConfig::default()
            }
        }
    };
    config.apply_env_overrides()?;
    info!("configuration loaded");
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
