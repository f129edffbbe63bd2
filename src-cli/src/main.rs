//! scbridge command-line interface
//!
//! Presents the system content-sharing picker from a terminal and prints
//! what the user chose, for use in scripts.

mod colors;
mod commands;
mod exit_codes;

use clap::{Parser, Subcommand, ValueEnum};
use exit_codes::ExitCode;
use scbridge_common::config;
use scbridge_common::logging;
use tracing::warn;

/// scbridge - screen content picker
#[derive(Parser, Debug)]
#[command(name = "scbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Present the content picker and print the selection
    Pick(PickArgs),
    /// Show event loop status
    Status,
    /// Inspect or reset the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Parser, Debug, Clone)]
pub struct PickArgs {
    /// Picker mode to allow (repeatable; defaults to the configured modes)
    #[arg(short, long, value_enum)]
    pub mode: Vec<ModeArg>,

    /// Bundle identifier to hide from the picker (repeatable)
    #[arg(long, value_name = "BUNDLE_ID")]
    pub exclude_bundle: Vec<String>,

    /// Window number to hide from the picker (repeatable)
    #[arg(long, value_name = "WINDOW_ID")]
    pub exclude_window: Vec<u32>,

    /// Let the user change the selection after it is made
    #[arg(long)]
    pub allow_change: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    SingleWindow,
    MultipleWindows,
    SingleApplication,
    MultipleApplications,
    SingleDisplay,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file location
    Path,
    /// Overwrite the configuration file with defaults
    Reset,
}

/// Global output flags.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::InvalidArguments
            } else {
                ExitCode::Success
            };
            let _ = e.print();
            std::process::exit(code.as_i32());
        }
    };

    // Logging comes up before a bad config file is reported
    let loaded = config::read_config();
    let logging_config = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    let guard = logging::init_logging(&logging_config, cli.verbose);
    let config = loaded.unwrap_or_else(|e| {
        warn!("{}. Using defaults.", e);
        config::BridgeConfig::default()
    });

    let exit_code = run(cli, &config);

    // Flush the file appender before exiting
    drop(guard);
    std::process::exit(exit_code.as_i32());
}

fn run(cli: Cli, config: &config::BridgeConfig) -> ExitCode {
    let out = Output {
        json: cli.json,
        quiet: cli.quiet,
    };
    match cli.command {
        Commands::Pick(args) => commands::pick(args, config, out),
        Commands::Status => commands::status(config, out),
        Commands::Config { action } => commands::config(action, config, out),
        Commands::Version => {
            commands::version(out);
            ExitCode::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_pick_defaults() {
        let cli = Cli::try_parse_from(["scbridge", "pick"]).unwrap();
        assert!(!cli.json);
        assert!(!cli.quiet);
        assert!(!cli.verbose);
        match cli.command {
            Commands::Pick(args) => {
                assert!(args.mode.is_empty());
                assert!(args.exclude_bundle.is_empty());
                assert!(args.exclude_window.is_empty());
                assert!(!args.allow_change);
            }
            _ => panic!("Expected Pick command"),
        }
    }

    #[test]
    fn parse_pick_with_filters() {
        let cli = Cli::try_parse_from([
            "scbridge",
            "--json",
            "pick",
            "--mode",
            "single-display",
            "-m",
            "multiple-windows",
            "--exclude-bundle",
            "com.apple.dock",
            "--exclude-window",
            "42",
            "--allow-change",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Pick(args) => {
                assert_eq!(args.mode, vec![ModeArg::SingleDisplay, ModeArg::MultipleWindows]);
                assert_eq!(args.exclude_bundle, vec!["com.apple.dock".to_string()]);
                assert_eq!(args.exclude_window, vec![42]);
                assert!(args.allow_change);
            }
            _ => panic!("Expected Pick command"),
        }
    }

    #[test]
    fn parse_rejects_unknown_mode() {
        let err = Cli::try_parse_from(["scbridge", "pick", "--mode", "region"]).unwrap_err();
        assert!(err.use_stderr());
    }

    #[test]
    fn parse_rejects_non_numeric_window() {
        assert!(Cli::try_parse_from(["scbridge", "pick", "--exclude-window", "abc"]).is_err());
    }

    #[test]
    fn parse_status_quiet() {
        let cli = Cli::try_parse_from(["scbridge", "-q", "status"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn parse_config_actions() {
        for (arg, expected) in [
            ("show", ConfigAction::Show),
            ("path", ConfigAction::Path),
            ("reset", ConfigAction::Reset),
        ] {
            let cli = Cli::try_parse_from(["scbridge", "config", arg]).unwrap();
            match cli.command {
                Commands::Config { action } => assert_eq!(action, expected),
                _ => panic!("Expected Config command"),
            }
        }
    }

    #[test]
    fn parse_version_verbose() {
        let cli = Cli::try_parse_from(["scbridge", "version", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Version));
    }
}
