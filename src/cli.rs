// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `seqrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "seqrun",
    version,
    about = "Run test scripts one at a time and report a verdict for each.",
    long_about = None
)]
pub struct CliArgs {
    /// Scripts to run, in order.
    #[arg(value_name = "SCRIPT", required = true)]
    pub scripts: Vec<PathBuf>,

    /// Path to the config file (TOML).
    ///
    /// Default: `seqrun.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SEQRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Per-script timeout in seconds; overrides the config file.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Run the scripts as one batch.
    #[arg(long)]
    pub batch: bool,

    /// Parameter passed to every script as `--KEY VALUE`. Repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Also collect lines from `.txt`/`.log` files written near each script.
    #[arg(long)]
    pub watch_output: bool,

    /// Print final records as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,

    /// Load config and print what would run, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_split_on_first_equals() {
        assert_eq!(
            parse_param("url=http://x/?a=b").unwrap(),
            ("url".to_string(), "http://x/?a=b".to_string())
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn flags_parse() {
        let args = CliArgs::try_parse_from([
            "seqrun", "--batch", "--timeout", "5", "--param", "port=COM3", "a.py", "b.sh",
        ])
        .unwrap();
        assert!(args.batch);
        assert_eq!(args.timeout, Some(5));
        assert_eq!(args.params, vec![("port".to_string(), "COM3".to_string())]);
        assert_eq!(args.scripts.len(), 2);
    }
}
