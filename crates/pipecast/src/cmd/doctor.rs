use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};

use pipecast_frame::{Palette, PaletteError};
use pipecast_transport::{ensure_fifo, DEFAULT_FIFO_MODE};
use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let checks = vec![
        fifo_support_check(),
        palette_check(&args.palette),
        pipe_path_check("video_pipe", &args.video_pipe),
        pipe_path_check("input_pipe", &args.input_pipe),
        bind_check(args.bind),
    ];

    let has_fail = checks.iter().any(|c| c.status == CheckStatus::Fail);
    let output = DoctorOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table => {
            let rows = output
                .checks
                .iter()
                .map(|c| {
                    vec![
                        c.name.clone(),
                        status_text(c.status).to_string(),
                        c.detail.clone(),
                    ]
                })
                .collect();
            print_table(vec!["CHECK", "STATUS", "DETAIL"], rows);
            println!("overall: {}", output.overall);
        }
        OutputFormat::Pretty => {
            println!("pipecast doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<14} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => println!("{}", output.overall),
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
    }
}

fn fifo_support_check() -> CheckResult {
    let dir = PathBuf::from(format!(
        "/tmp/pipecast-doctor-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    ));
    let _ = std::fs::create_dir_all(&dir);
    let result = ensure_fifo(dir.join("probe"), DEFAULT_FIFO_MODE);
    let _ = std::fs::remove_dir_all(&dir);

    match result {
        Ok(_) => CheckResult::new("fifo_support", CheckStatus::Pass, "mkfifo in /tmp succeeded"),
        Err(err) => CheckResult::new(
            "fifo_support",
            CheckStatus::Fail,
            format!("mkfifo in /tmp failed: {err}"),
        ),
    }
}

fn palette_check(path: &Path) -> CheckResult {
    match Palette::load(path) {
        Ok(palette) => CheckResult::new(
            "palette",
            CheckStatus::Pass,
            format!(
                "{} loaded; index 0 = {:?}",
                path.display(),
                palette.color(0)
            ),
        ),
        // The producer writes the palette at startup, so absence is expected
        // before it runs.
        Err(PaletteError::Unavailable { .. }) => CheckResult::new(
            "palette",
            CheckStatus::Warn,
            format!("{} not present yet", path.display()),
        ),
        Err(err) => CheckResult::new("palette", CheckStatus::Fail, err.to_string()),
    }
}

fn pipe_path_check(name: &str, path: &Path) -> CheckResult {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => {
            CheckResult::new(name, CheckStatus::Pass, format!("{} is a fifo", path.display()))
        }
        Ok(_) => CheckResult::new(
            name,
            CheckStatus::Fail,
            format!("{} exists and is not a fifo", path.display()),
        ),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let parent_ok = path
                .parent()
                .map(|p| p.as_os_str().is_empty() || p.is_dir())
                .unwrap_or(false);
            if parent_ok {
                CheckResult::new(
                    name,
                    CheckStatus::Info,
                    format!("{} will be created on start", path.display()),
                )
            } else {
                CheckResult::new(
                    name,
                    CheckStatus::Fail,
                    format!("parent directory of {} does not exist", path.display()),
                )
            }
        }
        Err(err) => CheckResult::new(
            name,
            CheckStatus::Fail,
            format!("{}: {err}", path.display()),
        ),
    }
}

fn bind_check(addr: SocketAddr) -> CheckResult {
    match TcpListener::bind(addr) {
        Ok(_) => CheckResult::new("bind", CheckStatus::Pass, format!("{addr} is available")),
        Err(err) => CheckResult::new("bind", CheckStatus::Warn, format!("{addr}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/pipecast-doctor-test-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn doctor_output_has_overall_status() {
        let output = DoctorOutput {
            checks: vec![CheckResult::new("x", CheckStatus::Pass, "ok")],
            overall: "pass",
        };
        let json = serde_json::to_string(&output).expect("doctor output should serialize");
        assert!(json.contains("\"overall\":\"pass\""));
    }

    #[test]
    fn missing_palette_is_a_warning() {
        let dir = unique_dir("palette");
        let check = palette_check(&dir.join("missing.txt"));
        assert_eq!(check.status, CheckStatus::Warn);

        let bad = dir.join("bad.txt");
        std::fs::write(&bad, "1 2\n").unwrap();
        assert_eq!(palette_check(&bad).status, CheckStatus::Fail);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn regular_file_at_pipe_path_fails() {
        let dir = unique_dir("pipes");
        let file = dir.join("plain");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(pipe_path_check("video_pipe", &file).status, CheckStatus::Fail);
        assert_eq!(
            pipe_path_check("video_pipe", &dir.join("absent")).status,
            CheckStatus::Info
        );
        assert_eq!(
            pipe_path_check("video_pipe", &dir.join("no/such/pipe")).status,
            CheckStatus::Fail
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}
