//! Shell command execution: fully concurrent, one child process per
//! request. Stdout and stderr are streamed line-by-line as they are
//! produced; a per-request timeout escalates SIGTERM then SIGKILL.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use mentisaid_core::{Observation, StreamKind};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::observations::ObservationSink;

const SIGTERM_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
pub struct ShellRequest {
    pub action_id: String,
    pub command: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Seconds; absent means no deadline beyond the process's own lifetime.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Runs `req.command` through `sh -c`, streaming output and finishing with
/// exactly one `result` observation. Spawned as a detached task by the
/// caller so the HTTP handler can return `2xx` immediately.
pub async fn run(req: ShellRequest, workdir: &str, sink: ObservationSink) {
    let action_id = req.action_id.clone();

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(&req.command)
        .current_dir(workdir)
        .envs(std::env::vars())
        .envs(&req.env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            sink.push(&Observation::error(action_id.clone(), format!("failed to spawn command: {e}"))).await;
            sink.push(&Observation::result(action_id, -1, Some(e.to_string()))).await;
            return;
        }
    };

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let out_sink = sink.clone();
    let out_action = action_id.clone();
    let stdout_task = tokio::spawn(async move {
        stream_lines(stdout, StreamKind::Stdout, out_action, out_sink).await;
    });

    let err_sink = sink.clone();
    let err_action = action_id.clone();
    let stderr_task = tokio::spawn(async move {
        stream_lines(stderr, StreamKind::Stderr, err_action, err_sink).await;
    });

    let wait_result = match req.timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), child.wait()).await,
        None => Ok(child.wait().await),
    };

    let _ = stdout_task.await;
    let _ = stderr_task.await;

    match wait_result {
        Ok(Ok(status)) => {
            let exit_code = status.code().unwrap_or(-1) as i64;
            sink.push(&Observation::result(action_id, exit_code, None)).await;
        }
        Ok(Err(e)) => {
            sink.push(&Observation::error(action_id.clone(), format!("wait failed: {e}"))).await;
            sink.push(&Observation::result(action_id, -1, Some(e.to_string()))).await;
        }
        Err(_) => {
            let timeout_msg = format!("command exceeded timeout of {}s", req.timeout_secs.unwrap_or_default());
            sink.push(&Observation::error(action_id.clone(), timeout_msg.clone())).await;
            terminate(&mut child).await;
            sink.push(&Observation::result(action_id, -1, Some(timeout_msg))).await;
        }
    }
}

async fn stream_lines<R>(reader: R, kind: StreamKind, action_id: String, sink: ObservationSink)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        sink.push(&Observation::stream_line(action_id.clone(), kind, line)).await;
    }
}

/// SIGTERM, wait briefly, then SIGKILL if the process is still alive.
async fn terminate(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(SIGTERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
}
