use std::path::Path;
use std::time::{Duration, Instant};

use pipecast_stream::{InputError, InputEvent};
use pipecast_transport::{FifoWriter, TransportError};
use serde::Serialize;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{transport_error, CliError, CliResult, DATA_INVALID, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_raw, print_report, OutputFormat, Report};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize)]
struct SendReport {
    pipe: String,
    action: String,
    state: String,
    bytes: usize,
}

impl Report for SendReport {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("pipe", self.pipe.clone()),
            ("action", self.action.clone()),
            ("state", self.state.clone()),
            ("bytes", self.bytes.to_string()),
        ]
    }

    fn summary(&self) -> String {
        format!("{}:{}", self.action, self.state)
    }
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait = args.wait.as_deref().map(parse_duration).transpose()?;
    let event = InputEvent::new(args.action, args.state).map_err(input_error)?;
    let line = event.to_line();

    write_line(&args.pipe, line.as_bytes(), wait)?;

    if format == OutputFormat::Raw {
        print_raw(line.as_bytes());
        return Ok(SUCCESS);
    }
    let report = SendReport {
        pipe: args.pipe.display().to_string(),
        action: event.action().to_string(),
        state: event.state().to_string(),
        bytes: line.len(),
    };
    print_report(&report, format);
    Ok(SUCCESS)
}

fn write_line(pipe: &Path, line: &[u8], wait: Option<Duration>) -> CliResult<()> {
    let deadline = wait.map(|wait| Instant::now() + wait);
    loop {
        let attempt = FifoWriter::try_open(pipe).and_then(|mut writer| writer.write_atomic(line));
        match attempt {
            Ok(()) => return Ok(()),
            Err(TransportError::NoReader { .. }) => match deadline {
                Some(deadline) if Instant::now() < deadline => {
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Some(_) => {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("no reader attached to {} before timeout", pipe.display()),
                    ))
                }
                None => {
                    return Err(transport_error(
                        "send failed",
                        TransportError::NoReader {
                            path: pipe.to_path_buf(),
                        },
                    ))
                }
            },
            Err(err) => return Err(transport_error("send failed", err)),
        }
    }
}

fn input_error(err: InputError) -> CliError {
    match err {
        InputError::MissingField(_) => CliError::new(USAGE, format!("invalid event: {err}")),
        other => CliError::new(DATA_INVALID, format!("invalid event: {other}")),
    }
}
