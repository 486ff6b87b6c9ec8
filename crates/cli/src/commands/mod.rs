// CLI subcommand dispatch.

use clap::Subcommand;

use crate::exit_code::ExitCode;

pub mod config;
pub mod replay;

#[derive(Subcommand)]
pub enum Command {
    /// Run an edit session against a recorded agent transcript
    Replay(replay::ReplayArgs),
    /// Show or initialize the engine configuration
    Config(config::ConfigArgs),
}

impl Command {
    /// Whether the caller asked for JSON output.
    pub fn json(&self) -> bool {
        match self {
            Command::Replay(args) => args.json,
            Command::Config(args) => args.json,
        }
    }
}

pub fn run(cmd: Command) -> anyhow::Result<ExitCode> {
    match cmd {
        Command::Replay(args) => {
            let report = replay::run(args)?;
            Ok(if replay::failed(&report) { ExitCode::SessionFailed } else { ExitCode::Success })
        }
        Command::Config(args) => config::run(args).map(|()| ExitCode::Success),
    }
}
