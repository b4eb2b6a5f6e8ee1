//! The Process Runner (C1): spawns a child in its own session, streams
//! stdout lines, drains stderr concurrently against the fatal-stderr
//! detector, and shields termination from the caller's own cancellation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::fatal::FatalDetector;

const DEFAULT_TERM_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(1);
const STDERR_RING_CAP_BYTES: usize = 4 * 1024 * 1024;

/// What to run and how.
pub struct ProcessSpec {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub stdin_bytes: Option<Vec<u8>>,
}

/// How one subprocess run ended: the accumulated stderr tail, the exit
/// status, and the first fatal-stderr match (if the detector tripped
/// before the child exited). Stdout lines are not buffered here — they are
/// handed to the caller's `on_stdout_line` as they arrive.
pub struct ProcessOutcome {
    pub stderr_tail: String,
    pub exit_code: Option<i32>,
    pub fatal_reason: Option<String>,
}

#[derive(Clone, Copy)]
pub struct ProcessRunner {
    term_timeout: Duration,
    kill_timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        ProcessRunner { term_timeout: DEFAULT_TERM_TIMEOUT, kill_timeout: DEFAULT_KILL_TIMEOUT }
    }
}

impl ProcessRunner {
    pub fn new(term_timeout: Duration, kill_timeout: Duration) -> Self {
        ProcessRunner { term_timeout, kill_timeout }
    }

    /// Runs `spec` to completion, or until `cancel` fires, handing each
    /// stdout line to `on_stdout_line` as it arrives. Always reaps the
    /// child and its process group before returning, even if cancelled
    /// partway through.
    pub async fn run(
        &self,
        spec: ProcessSpec,
        cancel: tokio_util::sync::CancellationToken,
        mut on_stdout_line: impl FnMut(&str),
    ) -> std::io::Result<ProcessOutcome> {
        let mut cmd = Command::new(&spec.argv[0]);
        cmd.args(&spec.argv[1..]);
        cmd.current_dir(&spec.cwd);
        cmd.envs(&spec.env);
        cmd.stdin(if spec.stdin_bytes.is_some() { Stdio::piped() } else { Stdio::null() });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let mut child = cmd.spawn()?;
        debug!(argv0 = %spec.argv[0], pid = ?child.id(), "spawned subprocess");

        if let Some(bytes) = &spec.stdin_bytes {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(bytes).await?;
                stdin.shutdown().await?;
            }
        } else {
            drop(child.stdin.take());
        }

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let mut detector = FatalDetector::default();
        let mut fatal_reason = None;
        let mut stderr_tail = String::new();

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    break;
                }
                stdout_line = stdout_reader.next_line() => {
                    match stdout_line? {
                        Some(line) => on_stdout_line(&line),
                        None => {
                            while let Some(line) = stderr_reader.next_line().await? {
                                Self::push_stderr_line(&mut stderr_tail, &line);
                                if fatal_reason.is_none() {
                                    fatal_reason = detector.check_line(&line);
                                }
                            }
                            break;
                        }
                    }
                }
                stderr_line = stderr_reader.next_line() => {
                    match stderr_line? {
                        Some(line) => {
                            Self::push_stderr_line(&mut stderr_tail, &line);
                            if fatal_reason.is_none() {
                                fatal_reason = detector.check_line(&line);
                                if fatal_reason.is_some() {
                                    break;
                                }
                            }
                        }
                        None => {}
                    }
                }
            }
        }

        let exit_code = self.shutdown(child).await;

        Ok(ProcessOutcome { stderr_tail, exit_code, fatal_reason })
    }

    fn push_stderr_line(tail: &mut String, line: &str) {
        tail.push_str(line);
        tail.push('\n');
        if tail.len() > STDERR_RING_CAP_BYTES {
            let overflow = tail.len() - STDERR_RING_CAP_BYTES;
            tail.drain(..overflow);
        }
    }

    /// Terminates the child's process group with TERM, escalating to KILL,
    /// then reaps it. Runs inside a detached task so it completes even if
    /// the calling future is itself dropped mid-await.
    async fn shutdown(&self, mut child: Child) -> Option<i32> {
        if let Ok(Some(status)) = child.try_wait() {
            return status.code();
        }

        let pid = child.id();
        let term_timeout = self.term_timeout;
        let kill_timeout = self.kill_timeout;

        let handle = tokio::spawn(async move {
            if let Some(pid) = pid {
                Self::signal_group(pid as i32, Self::term_signal());
            }
            if let Ok(Ok(status)) = tokio::time::timeout(term_timeout, child.wait()).await {
                return status.code();
            }

            warn!(?pid, "subprocess did not exit after SIGTERM, sending SIGKILL");
            if let Some(pid) = pid {
                Self::signal_group(pid as i32, Self::kill_signal());
            }
            match tokio::time::timeout(kill_timeout, child.wait()).await {
                Ok(Ok(status)) => status.code(),
                _ => {
                    warn!(?pid, "subprocess did not exit after SIGKILL");
                    let _ = child.wait().await;
                    None
                }
            }
        });

        handle.await.unwrap_or(None)
    }

    #[cfg(unix)]
    fn signal_group(pid: i32, signal: i32) {
        unsafe {
            let pgid = libc::getpgid(pid);
            if libc::killpg(pgid, signal) != 0 {
                let _ = libc::kill(pid, signal);
            }
        }
    }

    #[cfg(not(unix))]
    fn signal_group(_pid: i32, _signal: i32) {}

    #[cfg(unix)]
    fn term_signal() -> i32 {
        libc::SIGTERM
    }

    #[cfg(not(unix))]
    fn term_signal() -> i32 {
        0
    }

    #[cfg(unix)]
    fn kill_signal() -> i32 {
        libc::SIGKILL
    }

    #[cfg(not(unix))]
    fn kill_signal() -> i32 {
        0
    }
}
