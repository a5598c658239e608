use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::{ExecutionOutcome, ExecutionResult};
use crate::utils::truncation::truncate_capture;

use super::limits::ResourceLimits;
use super::SandboxBackend;

/// Sandbox backend that runs payloads as `/bin/sh -c` children in their own
/// session with rlimit ceilings. The environment is a minimal, explicitly
/// constructed allowlist, never an inherited copy of the caller's.
pub struct ProcessSandbox {
    workspace_dir: PathBuf,
}

impl ProcessSandbox {
    pub fn new(workspace_dir: &Path) -> Self {
        Self {
            workspace_dir: workspace_dir.to_path_buf(),
        }
    }

    fn result(
        execution_id: &str,
        outcome: ExecutionOutcome,
        exit_status: Option<i32>,
        stdout: String,
        stderr: String,
        started: Instant,
    ) -> ExecutionResult {
        ExecutionResult {
            execution_id: execution_id.to_string(),
            success: outcome == ExecutionOutcome::Completed,
            outcome,
            exit_status,
            stdout,
            stderr,
            violations: Vec::new(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[async_trait]
impl SandboxBackend for ProcessSandbox {
    async fn execute(
        &self,
        payload: &str,
        execution_id: &str,
        limits: &ResourceLimits,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let started = Instant::now();
        debug!(
            execution_id = %execution_id,
            payload_bytes = payload.len(),
            timeout_secs = limits.wall_clock.as_secs(),
            "Executing payload in process sandbox"
        );

        if let Err(e) = tokio::fs::create_dir_all(&self.workspace_dir).await {
            return Self::result(
                execution_id,
                ExecutionOutcome::SetupFailure,
                None,
                String::new(),
                format!("Failed to prepare workspace: {e}"),
                started,
            );
        }

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(payload)
            .current_dir(&self.workspace_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.env_clear();
        cmd.env(
            "PATH",
            std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
        );
        cmd.env("HOME", &self.workspace_dir);
        cmd.env(
            "USER",
            std::env::var("USER").unwrap_or_else(|_| "patternguard".to_string()),
        );
        cmd.env("SHELL", "/bin/sh");
        cmd.env(
            "TERM",
            std::env::var("TERM").unwrap_or_else(|_| "dumb".to_string()),
        );

        apply_resource_limits(&mut cmd, limits);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Self::result(
                    execution_id,
                    ExecutionOutcome::SetupFailure,
                    None,
                    String::new(),
                    format!("Failed to spawn sandboxed process: {e}"),
                    started,
                );
            }
        };
        let pid = child.id();

        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                kill_process_group(pid);
                warn!(execution_id = %execution_id, "Execution cancelled; process group terminated");
                return Self::result(
                    execution_id,
                    ExecutionOutcome::Cancelled,
                    None,
                    String::new(),
                    String::new(),
                    started,
                );
            }
            res = tokio::time::timeout(limits.wall_clock, child.wait_with_output()) => res,
        };

        match waited {
            Err(_elapsed) => {
                kill_process_group(pid);
                warn!(
                    execution_id = %execution_id,
                    timeout_secs = limits.wall_clock.as_secs(),
                    "Execution timed out; process group terminated"
                );
                Self::result(
                    execution_id,
                    ExecutionOutcome::Timeout,
                    None,
                    String::new(),
                    String::new(),
                    started,
                )
            }
            Ok(Err(e)) => Self::result(
                execution_id,
                ExecutionOutcome::SetupFailure,
                None,
                String::new(),
                format!("Failed to collect process output: {e}"),
                started,
            ),
            Ok(Ok(output)) => {
                let outcome = if output.status.success() {
                    ExecutionOutcome::Completed
                } else {
                    ExecutionOutcome::Failed
                };
                Self::result(
                    execution_id,
                    outcome,
                    output.status.code(),
                    truncate_capture(&String::from_utf8_lossy(&output.stdout)),
                    truncate_capture(&String::from_utf8_lossy(&output.stderr)),
                    started,
                )
            }
        }
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type RlimitResource = libc::__rlimit_resource_t;
#[cfg(all(unix, not(all(target_os = "linux", target_env = "gnu"))))]
type RlimitResource = libc::c_int;

/// Install rlimit ceilings and a fresh session inside the child, after fork
/// and before exec. The new session gives the child its own process group so
/// timeout and cancellation can kill the whole tree.
#[cfg(unix)]
fn apply_resource_limits(cmd: &mut Command, limits: &ResourceLimits) {
    let memory = limits.memory_bytes;
    let cpu = limits.cpu_seconds;
    let nofile = limits.max_open_files;
    let nproc = limits.max_processes;

    unsafe {
        cmd.pre_exec(move || {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            set_rlimit(libc::RLIMIT_AS, memory)?;
            set_rlimit(libc::RLIMIT_CPU, cpu)?;
            set_rlimit(libc::RLIMIT_NOFILE, nofile)?;
            set_rlimit(libc::RLIMIT_NPROC, nproc)?;
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_resource_limits(_cmd: &mut Command, _limits: &ResourceLimits) {
    warn!("Resource limits are not enforced on this platform");
}

#[cfg(unix)]
fn set_rlimit(resource: RlimitResource, value: u64) -> std::io::Result<()> {
    let lim = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    if unsafe { libc::setrlimit(resource, &lim) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}
