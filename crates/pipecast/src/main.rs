mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "pipecast",
    version,
    about = "Relay a raw video pipe to browsers as MJPEG, and input back"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_defaults() {
        let cli = Cli::try_parse_from(["pipecast", "serve"]).expect("serve should parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.stream_path, "/stream");
        assert_eq!(args.input_path, "/ws");
    }

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "pipecast",
            "send",
            "/tmp/doom_input",
            "--action",
            "up",
            "--state",
            "pressed",
        ])
        .expect("send args should parse");
        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn send_requires_action_and_state() {
        let err = Cli::try_parse_from(["pipecast", "send", "/tmp/doom_input", "--action", "up"])
            .expect_err("missing --state should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_conflicting_feed_sources() {
        let err = Cli::try_parse_from([
            "pipecast",
            "feed",
            "/tmp/doom_pipe",
            "--pattern",
            "gradient",
            "--file",
            "frames.raw",
        ])
        .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let err = Cli::try_parse_from(["pipecast", "serve", "--quality", "0"])
            .expect_err("quality 0 should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn global_format_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["pipecast", "doctor", "--format", "json"])
            .expect("doctor should parse");
        assert_eq!(cli.format, Some(OutputFormat::Json));
    }
}
