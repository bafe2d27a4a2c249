use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use pipecast_frame::{FRAME_LEN, WIDTH};
use pipecast_transport::{ensure_fifo, FifoWriter, DEFAULT_FIFO_MODE};
use serde::Serialize;
use tracing::{debug, info};

use crate::cmd::{parse_duration, FeedArgs};
use crate::exit::{io_error, transport_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_report, OutputFormat, Report};

/// A synthetic frame generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    /// Every pixel uses one palette index.
    Solid(u8),
    /// Diagonal index ramp that shifts by one each frame.
    Gradient,
}

impl FromStr for Pattern {
    type Err = CliError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "gradient" {
            return Ok(Self::Gradient);
        }
        if let Some(index) = value.strip_prefix("solid:") {
            let index = index.parse::<u8>().map_err(|_| {
                CliError::new(USAGE, format!("solid index must be 0-255: {index}"))
            })?;
            return Ok(Self::Solid(index));
        }
        Err(CliError::new(
            USAGE,
            format!("unknown pattern {value:?} (expected solid:<index> or gradient)"),
        ))
    }
}

impl Pattern {
    fn render(self, frame_no: usize) -> Vec<u8> {
        match self {
            Self::Solid(index) => vec![index; FRAME_LEN],
            Self::Gradient => (0..FRAME_LEN)
                .map(|i| {
                    let x = i % WIDTH;
                    let y = i / WIDTH;
                    ((x + y + frame_no) % 256) as u8
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FeedReport {
    pipe: String,
    source: String,
    frames_written: usize,
    bytes_written: usize,
}

impl Report for FeedReport {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("pipe", self.pipe.clone()),
            ("source", self.source.clone()),
            ("frames", self.frames_written.to_string()),
            ("bytes", self.bytes_written.to_string()),
        ]
    }

    fn summary(&self) -> String {
        self.frames_written.to_string()
    }
}

pub fn run(args: FeedArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = args.interval.as_deref().map(parse_duration).transpose()?;
    let (source, frames) = match &args.file {
        Some(path) => (path.display().to_string(), load_frames(path)?),
        None => {
            let pattern: Pattern = args.pattern.parse()?;
            let frames = (0..args.count).map(|n| pattern.render(n)).collect();
            (args.pattern.clone(), frames)
        }
    };

    ensure_fifo(&args.pipe, DEFAULT_FIFO_MODE)
        .map_err(|err| transport_error("failed to prepare video pipe", err))?;
    info!(pipe = ?args.pipe, frames = frames.len(), "waiting for reader");
    let mut writer = FifoWriter::open(&args.pipe)
        .map_err(|err| transport_error("failed to open video pipe", err))?;

    let mut bytes_written = 0;
    for (n, frame) in frames.iter().enumerate() {
        if n > 0 {
            if let Some(interval) = interval {
                std::thread::sleep(interval);
            }
        }
        writer
            .write_all(frame)
            .map_err(|err| io_error("failed to write frame", err))?;
        bytes_written += frame.len();
        debug!(frame = n, "frame written");
    }
    writer
        .flush()
        .map_err(|err| io_error("failed to flush video pipe", err))?;

    let report = FeedReport {
        pipe: args.pipe.display().to_string(),
        source,
        frames_written: frames.len(),
        bytes_written,
    };
    print_report(&report, format);
    Ok(SUCCESS)
}

fn load_frames(path: &Path) -> CliResult<Vec<Vec<u8>>> {
    let data = std::fs::read(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    if data.is_empty() || data.len() % FRAME_LEN != 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "{} holds {} bytes, not a whole number of {FRAME_LEN}-byte frames",
                path.display(),
                data.len()
            ),
        ));
    }
    Ok(data.chunks(FRAME_LEN).map(<[u8]>::to_vec).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_patterns() {
        assert_eq!("gradient".parse::<Pattern>().unwrap(), Pattern::Gradient);
        assert_eq!("solid:12".parse::<Pattern>().unwrap(), Pattern::Solid(12));
        assert_eq!("solid:300".parse::<Pattern>().unwrap_err().code, USAGE);
        assert_eq!("plaid".parse::<Pattern>().unwrap_err().code, USAGE);
    }

    #[test]
    fn gradient_frames_have_full_length_and_move() {
        let first = Pattern::Gradient.render(0);
        let second = Pattern::Gradient.render(1);
        assert_eq!(first.len(), FRAME_LEN);
        assert_eq!(first[0], 0);
        assert_eq!(first[1], 1);
        assert_eq!(first[WIDTH], 1);
        assert_eq!(second[0], 1);
    }

    #[test]
    fn rejects_partial_frame_files() {
        let path = std::env::temp_dir().join(format!(
            "pipecast-feed-partial-{}-{}.raw",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::write(&path, vec![0u8; FRAME_LEN + 10]).unwrap();
        let err = load_frames(&path).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);

        std::fs::write(&path, vec![0u8; FRAME_LEN * 2]).unwrap();
        assert_eq!(load_frames(&path).unwrap().len(), 2);
        let _ = std::fs::remove_file(&path);
    }
}
