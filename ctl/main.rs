#![forbid(unsafe_code)]

//! `appbooter-ctl` — control companion for `appbooter`.
//!
//! Sends one command to the session and/or application control sockets.
//! Never launches anything itself.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use appbooter::booter::{self, default_config_path, StopTargets};
use appbooter::config::BooterConfig;
use appbooter::Result;

#[derive(Debug, Parser)]
#[command(
    name = "appbooter-ctl",
    about = "Control companion for appbooter",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration the session was started with.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host of the control sockets.
    #[arg(long)]
    host: Option<String>,

    /// Control port of the application.
    #[arg(long)]
    app_port: Option<u16>,

    /// Control port of the supervising session.
    #[arg(long)]
    session_port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

/// Which endpoint `stop` addresses.
#[derive(Debug, Copy, Clone, Eq, PartialEq, clap::ValueEnum)]
enum Target {
    /// The application's control socket.
    App,
    /// The session's control socket.
    Session,
    /// The session first, then the application.
    Both,
}

impl From<Target> for StopTargets {
    fn from(target: Target) -> Self {
        match target {
            Target::App => Self::Application,
            Target::Session => Self::Session,
            Target::Both => Self::Both,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask a running application to shut down.
    Stop {
        /// Endpoint(s) receiving the shutdown command.
        #[arg(long, value_enum, default_value_t = Target::Session)]
        target: Target,
    },

    /// Print the status of a running session.
    Status,
}

fn main() {
    let args = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to build tokio runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(execute(args)) {
        eprintln!("Error: {err}");
        if !err.is_recoverable() {
            std::process::exit(1);
        }
        eprintln!("Is appbooter running?");
        std::process::exit(2);
    }
}

async fn execute(args: Cli) -> Result<()> {
    let mut config = match args.config {
        Some(ref path) => BooterConfig::load_from_path(path)?,
        None if default_config_path().is_file() => {
            BooterConfig::load_from_path(default_config_path())?
        }
        None => BooterConfig::default(),
    };
    config.apply_env_overrides()?;

    let control = &mut config.control;
    if let Some(host) = args.host {
        control.host = host;
    }
    if let Some(port) = args.app_port {
        control.app_port = port;
    }
    if let Some(port) = args.session_port {
        control.session_port = port;
    }

    match args.command {
        Command::Stop { target } => {
            let report = booter::stop(control, target.into()).await?;
            for endpoint in &report.acknowledged {
                println!("{endpoint}: OK");
            }
            for endpoint in &report.unreachable {
                println!("{endpoint}: not running");
            }
            for failure in &report.failed {
                println!("{}: failed ({})", failure.endpoint, failure.error);
            }
        }
        Command::Status => {
            let report = booter::status(control).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).unwrap_or_default()
            );
        }
    }
    Ok(())
}
