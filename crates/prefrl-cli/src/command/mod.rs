use clap::{Parser, Subcommand};

use self::{
    inspect_checkpoint::InspectCheckpointArg, inspect_prefs::InspectPrefsArg, run::RunArg,
};

mod inspect_checkpoint;
mod inspect_prefs;
mod run;

const DEFAULT_LOG_DIRECTIVE: &str = "info";

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Drive a dummy environment through the preference wrapper
    Run(#[clap(flatten)] RunArg),
    /// Summarize a saved preference database directory
    InspectPrefs(#[clap(flatten)] InspectPrefsArg),
    /// Show reward predictor checkpoint metadata
    InspectCheckpoint(#[clap(flatten)] InspectCheckpointArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Run(arg) => run::run(&arg)?,
        Mode::InspectPrefs(arg) => {
            crate::util::init_tracing([DEFAULT_LOG_DIRECTIVE])?;
            inspect_prefs::run(&arg)?;
        }
        Mode::InspectCheckpoint(arg) => {
            crate::util::init_tracing([DEFAULT_LOG_DIRECTIVE])?;
            inspect_checkpoint::run(&arg)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn test_command_is_consistent() {
        CommandArgs::command().debug_assert();
    }

    #[test]
    fn test_parse_run_args() {
        let args = CommandArgs::try_parse_from([
            "prefrl",
            "run",
            "--obs-shape",
            "8,8,3",
            "--n-actions",
            "3,2",
            "--steps",
            "50",
        ])
        .unwrap();
        assert!(matches!(args.mode, Mode::Run(_)));
    }
}
