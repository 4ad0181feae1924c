//! EV-012: Bundler worker that loads source files in an external process.
//!
//! The configured argv template is run once per file from the project root.
//! Placeholders `{file}`, `{root}`, `{aliases}`, and `{out}` are substituted.
//! The worker's stdout must be the JSON object of the module's named exports;
//! stderr is captured into the error on failure. The worker is killed once
//! the timeout elapses.

use super::{exports_from_value, ExecOutput, Exports, LoadContext, ModuleLoader};
use crate::core::error::ResolutionFailure;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Variable the worker can read to find the project root.
pub const ROOT_ENV_VAR: &str = "ELECTRO_VIEWER_CWD";

/// Runs a bundler command per source file.
#[derive(Debug, Clone)]
pub struct CommandLoader {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandLoader {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }

    /// Substitute placeholders into the argv template.
    pub fn render_args(&self, file: &Path, ctx: &LoadContext<'_>) -> Vec<String> {
        let aliases = ctx
            .alias_manifest
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        self.argv
            .iter()
            .map(|arg| {
                arg.replace("{file}", &file.display().to_string())
                    .replace("{root}", &ctx.root.display().to_string())
                    .replace("{aliases}", &aliases)
                    .replace("{out}", &ctx.scratch.display().to_string())
            })
            .collect()
    }
}

impl ModuleLoader for CommandLoader {
    fn load(&self, file: &Path, ctx: &LoadContext<'_>) -> Result<Exports, ResolutionFailure> {
        let args = self.render_args(file, ctx);
        let (program, rest) = args.split_first().ok_or_else(|| ResolutionFailure::Spawn {
            file: file.to_path_buf(),
            reason: "loader command is empty".to_string(),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .current_dir(ctx.root)
            .env(ROOT_ENV_VAR, ctx.root)
            .envs(ctx.env);

        tracing::debug!(file = %file.display(), program = %program, "running loader");
        let output = exec_with_timeout(cmd, self.timeout)
            .map_err(|reason| ResolutionFailure::Spawn {
                file: file.to_path_buf(),
                reason,
            })?
            .ok_or_else(|| ResolutionFailure::Timeout {
                file: file.to_path_buf(),
                timeout: self.timeout,
            })?;

        if !output.success() {
            return Err(ResolutionFailure::Execution {
                file: file.to_path_buf(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        if !output.stderr.trim().is_empty() {
            tracing::debug!(file = %file.display(), stderr = %output.stderr.trim(), "loader stderr");
        }

        let value: serde_json::Value =
            serde_json::from_str(&output.stdout).map_err(|e| ResolutionFailure::InvalidExports {
                file: file.to_path_buf(),
                reason: format!("loader stdout is not JSON: {e}"),
            })?;
        exports_from_value(file, value)
    }
}

/// Run a command with piped output, killing it after `timeout`.
/// Returns `Ok(None)` when the process was killed for exceeding the limit.
pub fn exec_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Option<ExecOutput>, String> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn: {e}"))?;

    // Both pipes drain concurrently; a full pipe would block the worker
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait().map_err(|e| format!("wait error: {e}"))? {
            Some(status) => break Some(status),
            None if Instant::now() >= deadline => {
                kill(&mut child);
                break None;
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    };

    // A killed worker may leave grandchildren holding the pipes; don't wait on them
    let Some(status) = status else {
        return Ok(None);
    };

    Ok(Some(ExecOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    }))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).to_string()
    })
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::warn!(error = %e, "failed to kill timed-out loader");
    }
    let _ = child.wait();
}
