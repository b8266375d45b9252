use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::domain::Doi;
use crate::error::AcquireError;
use crate::fs_util;
use crate::strategy::{Strategy, StrategyOutcome};

/// Prefix of the private scratch directories created inside the save directory.
pub const TEMP_DIR_PREFIX: &str = "_temp";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_GRACE: Duration = Duration::from_secs(1);

/// How to invoke the acquisition tool. `{doi}` and `{out_dir}` in `args` are
/// substituted per call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn pypaperbot() -> Self {
        Self {
            program: PathBuf::from("python"),
            args: vec![
                "-m".to_string(),
                "PyPaperBot".to_string(),
                "--doi={doi}".to_string(),
                "--dwn-dir={out_dir}".to_string(),
                "--use-doi-as-filename".to_string(),
            ],
        }
    }

    pub fn render_args(&self, doi: &Doi, out_dir: &Path) -> Vec<String> {
        let out_dir = out_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{doi}", doi.as_str().trim())
                    .replace("{out_dir}", &out_dir)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Ready(PathBuf),
    Missing { message: String },
}

/// Runs a third-party downloader in a scratch directory and adopts the single
/// PDF it leaves behind.
#[derive(Debug, Clone)]
pub struct ExternalToolStrategy {
    command: ToolCommand,
    scratch_root: PathBuf,
}

impl ExternalToolStrategy {
    pub fn new(command: ToolCommand, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            command,
            scratch_root: scratch_root.into(),
        }
    }

    pub fn tool_status(&self) -> ToolStatus {
        let program = &self.command.program;
        let located = if program.components().count() > 1 {
            program.exists().then(|| program.clone())
        } else {
            program.to_str().and_then(find_in_path)
        };
        match located {
            Some(path) => ToolStatus::Ready(path),
            None => ToolStatus::Missing {
                message: format!("{} not found", program.display()),
            },
        }
    }

    fn try_acquire(
        &self,
        doi: &Doi,
        destination: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, AcquireError> {
        fs::create_dir_all(&self.scratch_root).map_err(|err| {
            AcquireError::PlacementError(format!("{}: {err}", self.scratch_root.display()))
        })?;
        let temp_dir = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir_in(&self.scratch_root)
            .map_err(|err| AcquireError::PlacementError(err.to_string()))?;

        let args = self.command.render_args(doi, temp_dir.path());
        debug!(program = %self.command.program.display(), ?args, "starting external tool");
        run_with_timeout(&self.command.program, &args, temp_dir.path(), timeout)?;

        let candidates = fs_util::find_exts(temp_dir.path(), "pdf");
        let artifact = match candidates.as_slice() {
            [] => {
                return Err(AcquireError::ArtifactNotProduced(
                    "tool exited successfully but wrote no PDF".to_string(),
                ));
            }
            [single] => single,
            many => {
                return Err(AcquireError::ArtifactNotProduced(format!(
                    "tool wrote {} PDF files, expected exactly one",
                    many.len()
                )));
            }
        };
        fs_util::move_into_place(artifact, destination)?;

        if let Err(err) = temp_dir.close() {
            debug!(error = %err, "failed to remove tool scratch directory");
        }
        Ok(destination.to_path_buf())
    }
}

impl Strategy for ExternalToolStrategy {
    fn name(&self) -> &'static str {
        "external-tool"
    }

    fn acquire(&self, doi: &Doi, destination: &Path, timeout: Duration) -> StrategyOutcome {
        self.try_acquire(doi, destination, timeout).into()
    }
}

fn run_with_timeout(
    program: &Path,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<(), AcquireError> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            AcquireError::ProcessFailure(format!("failed to start {}: {err}", program.display()))
        })?;
    let stderr = capture_stderr(&mut child);

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if started.elapsed() >= timeout {
                    terminate(&mut child);
                    return Err(AcquireError::ProcessFailure(format!(
                        "{} timed out after {:.1}s",
                        program.display(),
                        timeout.as_secs_f64()
                    )));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                terminate(&mut child);
                return Err(AcquireError::ProcessFailure(format!(
                    "waiting on {} failed: {err}",
                    program.display()
                )));
            }
        }
    };

    if status.success() {
        return Ok(());
    }
    let stderr = stderr
        .and_then(|rx| rx.recv_timeout(STDERR_GRACE).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default();
    Err(AcquireError::ProcessFailure(exit_message(
        program, status, &stderr,
    )))
}

// A reader thread drains stderr so a chatty tool cannot block on a full pipe.
fn capture_stderr(child: &mut Child) -> Option<mpsc::Receiver<Vec<u8>>> {
    let mut pipe = child.stderr.take()?;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    Some(rx)
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn exit_message(program: &Path, status: ExitStatus, stderr: &str) -> String {
    if stderr.is_empty() {
        format!("{} exited with {status}", program.display())
    } else {
        format!("{} exited with {status}: {stderr}", program.display())
    }
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
