use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Live progress bar on stderr and a text summary on stdout.
    HumanReadable,
    /// A single JSON summary object on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "barrage",
    author,
    version,
    about = "HTTP load generator with staged virtual users, checks and thresholds",
    long_about = "barrage drives a pool of virtual users against an HTTP endpoint.\n\nA YAML config describes the request, the checks applied to every response, the load shape (constant VUs or ramping stages) and pass/fail thresholds over the collected metrics.\n\nEnvironment variables from the current process are visible to `${VAR}` references in the config; use `--env KEY=VALUE` to add/override values.",
    after_help = "Examples:\n  barrage run demos/devices.yaml\n  barrage run demos/devices.yaml --env BASE_URL=http://127.0.0.1:8080\n  barrage run demos/flaky.yaml --output json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test described by a YAML config
    #[command(
        long_about = "Run the load test described by a YAML config.\n\nExits 0 when every threshold passes, 11 when a threshold fails, 30 on invalid input and 40 on runtime errors."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the config (.yaml / .yml)
    pub config: PathBuf,

    /// Add/override environment variables visible to `${VAR}` references (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_to_human_output() {
        let cli = match Cli::try_parse_from(["barrage", "run", "load.yaml"]) {
            Ok(v) => v,
            Err(err) => panic!("parse failed: {err}"),
        };

        let Command::Run(args) = cli.command;
        assert_eq!(args.config, PathBuf::from("load.yaml"));
        assert_eq!(args.output, OutputFormat::HumanReadable);
        assert!(args.env.is_empty());
    }

    #[test]
    fn env_is_repeatable_and_output_selectable() {
        let cli = match Cli::try_parse_from([
            "barrage",
            "run",
            "load.yaml",
            "--env",
            "BASE_URL=http://localhost:1",
            "--env",
            "TOKEN=x",
            "--output",
            "json",
        ]) {
            Ok(v) => v,
            Err(err) => panic!("parse failed: {err}"),
        };

        let Command::Run(args) = cli.command;
        assert_eq!(args.env, vec!["BASE_URL=http://localhost:1", "TOKEN=x"]);
        assert_eq!(args.output, OutputFormat::Json);
    }

    #[test]
    fn unknown_output_is_rejected() {
        assert!(Cli::try_parse_from(["barrage", "run", "x.yaml", "--output", "xml"]).is_err());
    }
}
