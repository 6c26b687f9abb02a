// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess want: runs one shell command with a deadline.
//!
//! The child's pid lands in state as soon as the spawn succeeds, and a
//! liveness probe confirms `running` before the process is trusted.
//! Teardown escalates SIGTERM → SIGKILL, both on deadline overrun and on
//! delete.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::debug;

use wantcore::error::EngineError;
use wantcore::want::{Progressable, Want, WantCtx};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_INTERVAL: Duration = Duration::from_millis(250);
const KILL_GRACE: Duration = Duration::from_millis(500);
const EXECUTE_PHASE: &str = "execute";

enum Phase {
    Start,
    Running,
    Terminating { kill_at: Instant },
    Finished,
}

struct RunningChild {
    child: tokio::process::Child,
    pid: i32,
    started: Instant,
    deadline: Instant,
    stdout_task: Option<JoinHandle<Vec<u8>>>,
    stderr_task: Option<JoinHandle<Vec<u8>>>,
}

/// Parameters: `command` (required), `shell` (default `/bin/sh`),
/// `timeout` (duration, default 30 s).
pub struct CommandWant {
    command: String,
    shell: String,
    timeout: Duration,
    phase: Phase,
    running: Option<RunningChild>,
    probe_started: bool,
}

impl CommandWant {
    pub fn new() -> Self {
        Self {
            command: String::new(),
            shell: "/bin/sh".to_owned(),
            timeout: DEFAULT_TIMEOUT,
            phase: Phase::Start,
            running: None,
            probe_started: false,
        }
    }

    fn spawn(&mut self, ctx: &WantCtx) -> anyhow::Result<()> {
        let mut child = tokio::process::Command::new(&self.shell)
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let pid = child.id().ok_or_else(|| anyhow::anyhow!("spawned child has no pid"))? as i32;
        let stdout_task = child.stdout.take().map(|mut out| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = out.read_to_end(&mut buf).await;
                buf
            })
        });
        let stderr_task = child.stderr.take().map(|mut err| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf).await;
                buf
            })
        });

        let started = Instant::now();
        self.running = Some(RunningChild {
            child,
            pid,
            started,
            deadline: started + self.timeout,
            stdout_task,
            stderr_task,
        });

        let mut seed = serde_json::Map::new();
        seed.insert("pid".into(), json!(pid));
        seed.insert("phase".into(), json!("running"));
        ctx.want.state.store_multi(seed);
        Ok(())
    }

    async fn finish(&mut self, ctx: &WantCtx, status: std::process::ExitStatus) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        let stdout = collect(running.stdout_task.take()).await;
        let stderr = collect(running.stderr_task.take()).await;
        let exit_code = status.code().unwrap_or(-1);

        let mut changes = serde_json::Map::new();
        changes.insert("exit_code".into(), json!(exit_code));
        changes.insert("stdout".into(), json!(String::from_utf8_lossy(&stdout).into_owned()));
        changes.insert("stderr".into(), json!(String::from_utf8_lossy(&stderr).into_owned()));
        changes
            .insert("execution_time_ms".into(), json!(running.started.elapsed().as_millis() as u64));
        ctx.want.state.store_multi(changes);

        self.phase = Phase::Finished;
        if exit_code == 0 {
            ctx.want.record_phase_success(EXECUTE_PHASE);
            ctx.want.state.store("status", json!("completed"));
        } else {
            ctx.want.state.store("status", json!("failed"));
            ctx.want.fail(&EngineError::agent(format!(
                "command exited with code {exit_code}: {}",
                String::from_utf8_lossy(&stderr).trim(),
            )));
        }
    }

    /// Start the liveness probe: confirms `running` while the pid answers
    /// signal 0, and stops itself once it no longer does.
    async fn start_probe(&mut self, ctx: &WantCtx) {
        if self.probe_started {
            return;
        }
        self.probe_started = true;
        ctx
            .add_monitoring_agent("proc-probe", PROBE_INTERVAL, Arc::new(|_token, want: Arc<Want>| {
                Box::pin(async move {
                    let (pid, ok) = want.state.get_int("pid", 0);
                    if !ok || pid == 0 {
                        return (false, Ok(()));
                    }
                    let alive = kill(Pid::from_raw(pid as i32), None).is_ok();
                    want.state.store_for_agent("proc-probe", "running", json!(alive));
                    (!alive, Ok(()))
                })
            }))
            .await;
    }

    /// Reset for a retry after a timeout kill.
    fn rearm(&mut self) {
        self.running = None;
        self.phase = Phase::Start;
    }
}

impl Default for CommandWant {
    fn default() -> Self {
        Self::new()
    }
}

impl Progressable for CommandWant {
    fn initialize(&mut self, ctx: &WantCtx) -> anyhow::Result<()> {
        self.command = ctx
            .want
            .param_str("command")
            .ok_or_else(|| anyhow::anyhow!("missing required parameter command"))?
            .to_owned();
        if self.command.trim().is_empty() {
            anyhow::bail!("command must not be empty");
        }
        if let Some(shell) = ctx.want.param_str("shell") {
            self.shell = shell.to_owned();
        }
        if let Some(value) = ctx.want.param("timeout") {
            self.timeout = crate::duration::duration_value(value)?;
        }
        ctx.want.state.store("phase", json!("start"));
        Ok(())
    }

    fn is_achieved(&self, ctx: &WantCtx) -> bool {
        ctx.want.state.get_string("status", "").0 == "completed"
    }

    fn progress<'a>(
        &'a mut self,
        ctx: &'a WantCtx,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match self.phase {
                Phase::Start => {
                    match self.spawn(ctx) {
                        Ok(()) => {
                            self.start_probe(ctx).await;
                            self.phase = Phase::Running;
                        }
                        Err(e) => {
                            ctx.want.record_phase_failure(
                                EXECUTE_PHASE,
                                EngineError::agent(format!("spawn failed: {e:#}")),
                            );
                        }
                    }
                    Ok(())
                }
                Phase::Running => {
                    let Some(running) = self.running.as_mut() else {
                        self.rearm();
                        return Ok(());
                    };
                    match running.child.try_wait() {
                        Ok(Some(status)) => self.finish(ctx, status).await,
                        Ok(None) => {
                            if Instant::now() >= running.deadline {
                                debug!(pid = running.pid, "command deadline reached, sending SIGTERM");
                                let _ = kill(Pid::from_raw(running.pid), Signal::SIGTERM);
                                self.phase = Phase::Terminating { kill_at: Instant::now() + KILL_GRACE };
                                ctx.want.state.store("phase", json!("terminating"));
                            }
                        }
                        Err(e) => {
                            ctx.want.fail(&EngineError::fatal(format!("wait failed: {e}")));
                            self.phase = Phase::Finished;
                        }
                    }
                    Ok(())
                }
                Phase::Terminating { kill_at } => {
                    let Some(running) = self.running.as_mut() else {
                        self.rearm();
                        return Ok(());
                    };
                    match running.child.try_wait() {
                        Ok(Some(_)) => {
                            let timeout = self.timeout;
                            self.rearm();
                            let status = ctx.want.record_phase_failure(
                                EXECUTE_PHASE,
                                EngineError::timeout(format!(
                                    "command exceeded {}s deadline",
                                    timeout.as_secs_f64(),
                                )),
                            );
                            if status.is_active() {
                                ctx.want.state.store("phase", json!("start"));
                            }
                        }
                        Ok(None) => {
                            if Instant::now() >= kill_at {
                                debug!(pid = running.pid, "command ignored SIGTERM, sending SIGKILL");
                                let _ = kill(Pid::from_raw(running.pid), Signal::SIGKILL);
                            }
                        }
                        Err(e) => {
                            ctx.want.fail(&EngineError::fatal(format!("wait failed: {e}")));
                            self.phase = Phase::Finished;
                        }
                    }
                    Ok(())
                }
                Phase::Finished => Ok(()),
            }
        })
    }

    fn on_delete<'a>(&'a mut self, _ctx: &'a WantCtx) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(mut running) = self.running.take() else {
                return;
            };
            if matches!(running.child.try_wait(), Ok(Some(_))) {
                return;
            }
            let _ = kill(Pid::from_raw(running.pid), Signal::SIGTERM);
            tokio::time::sleep(Duration::from_millis(100)).await;
            if !matches!(running.child.try_wait(), Ok(Some(_))) {
                let _ = kill(Pid::from_raw(running.pid), Signal::SIGKILL);
            }
            // Reap so the child does not linger as a zombie.
            let _ = tokio::time::timeout(KILL_GRACE, running.child.wait()).await;
        })
    }
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
