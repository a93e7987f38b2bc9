//! IPython cell execution against a single long-lived driver subprocess
//! (see `python/driver.py`). One kernel exists per sandbox container — since
//! this binary runs inside exactly one sandbox, that means one kernel per
//! process — so per-sandbox serialization reduces to a single mutex held
//! across the full request/reply cycle.

use std::process::Stdio;

use mentisaid_core::{Error, Observation, Result, StreamKind};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;

use crate::observations::ObservationSink;

#[derive(Debug, Deserialize)]
pub struct IpythonRequest {
    pub action_id: String,
    pub code: String,
}

struct Driver {
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<tokio::process::ChildStdout>>,
}

/// Owns the persistent driver process and the lock that serializes cells.
pub struct Kernel {
    driver: Mutex<Option<Driver>>,
}

impl Kernel {
    pub fn new() -> Self {
        Self { driver: Mutex::new(None) }
    }

    fn spawn_driver() -> Result<Driver> {
        let mut command = Command::new("python3");
        command
            .arg(driver_script_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::internal(format!("failed to start ipython driver: {e}")))?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        Ok(Driver {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// Starts the driver eagerly so the first cell doesn't pay spawn
    /// latency; failures here are logged and retried lazily per-request.
    pub async fn warm_up(&self) {
        let mut guard = self.driver.lock().await;
        if guard.is_none() {
            match Self::spawn_driver() {
                Ok(driver) => *guard = Some(driver),
                Err(e) => tracing::warn!(error = %e, "ipython driver failed to start at boot, will retry on first cell"),
            }
        }
    }

    /// Runs one cell against the persistent namespace. Holds the kernel
    /// lock across the entire round trip, by design (see §5 of the design
    /// notes: the one sanctioned exception to "never hold a lock across a
    /// suspension point").
    pub async fn run_cell(&self, req: IpythonRequest, sink: &ObservationSink) {
        let action_id = req.action_id.clone();
        let mut guard = self.driver.lock().await;

        if guard.is_none() {
            match Self::spawn_driver() {
                Ok(driver) => *guard = Some(driver),
                Err(e) => {
                    drop(guard);
                    sink.push(&Observation::error(action_id.clone(), e.to_string())).await;
                    sink.push(&Observation::result(action_id, -1, Some(e.to_string()))).await;
                    return;
                }
            }
        }

        let driver = guard.as_mut().expect("just ensured present");
        let request_line = match serde_json::to_string(&serde_json::json!({ "code": req.code })) {
            Ok(line) => line,
            Err(e) => {
                drop(guard);
                sink.push(&Observation::error(action_id.clone(), e.to_string())).await;
                sink.push(&Observation::result(action_id, -1, Some(e.to_string()))).await;
                return;
            }
        };

        if let Err(e) = driver.stdin.write_all(format!("{request_line}\n").as_bytes()).await {
            // The driver process is gone; drop it so the next cell respawns.
            *guard = None;
            drop(guard);
            let msg = format!("ipython driver unreachable: {e}");
            sink.push(&Observation::error(action_id.clone(), msg.clone())).await;
            sink.push(&Observation::result(action_id, -1, Some(msg))).await;
            return;
        }

        loop {
            let next_line = driver.stdout.next_line().await;
            match next_line {
                Ok(Some(line)) => match serde_json::from_str::<Value>(&line) {
                    Ok(frame) => {
                        if handle_frame(&frame, &action_id, sink).await {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, raw = %line, "ipython driver emitted a non-JSON line, ignoring");
                    }
                },
                Ok(None) | Err(_) => {
                    *guard = None;
                    let msg = "ipython driver closed its output mid-cell".to_string();
                    sink.push(&Observation::error(action_id.clone(), msg.clone())).await;
                    sink.push(&Observation::result(action_id, -1, Some(msg))).await;
                    break;
                }
            }
        }
    }
}

/// Translates one driver frame into an observation. Returns `true` once a
/// terminal `result` frame has been handled.
async fn handle_frame(frame: &Value, action_id: &str, sink: &ObservationSink) -> bool {
    match frame.get("type").and_then(Value::as_str) {
        Some("stream") => {
            let stream = match frame.get("stream").and_then(Value::as_str) {
                Some("stderr") => StreamKind::Stderr,
                _ => StreamKind::Stdout,
            };
            let line = frame.get("line").and_then(Value::as_str).unwrap_or_default();
            sink.push(&Observation::stream_line(action_id, stream, line)).await;
            false
        }
        Some("result") => {
            match frame.get("status").and_then(Value::as_str) {
                Some("error") => {
                    let ename = frame.get("ename").and_then(Value::as_str).unwrap_or("Error");
                    let evalue = frame.get("evalue").and_then(Value::as_str).unwrap_or_default();
                    let details = frame.get("traceback").cloned();
                    let mut result = Observation::result(action_id, 1, Some(format!("{ename}: {evalue}")));
                    result.details = details;
                    sink.push(&result).await;
                }
                _ => {
                    sink.push(&Observation::result(action_id, 0, None)).await;
                }
            }
            true
        }
        _ => false,
    }
}

fn driver_script_path() -> String {
    std::env::var("IPYTHON_DRIVER_PATH").unwrap_or_else(|_| "/opt/mentisaid/driver.py".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn point_at_bundled_driver() {
        let script = concat!(env!("CARGO_MANIFEST_DIR"), "/python/driver.py");
        std::env::set_var("IPYTHON_DRIVER_PATH", script);
    }

    async fn sink_against_mock() -> (MockServer, ObservationSink) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/observe"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let sink = ObservationSink::new(format!("{}/observe", server.uri()));
        (server, sink)
    }

    #[tokio::test]
    async fn state_persists_across_cells_in_the_same_kernel() {
        point_at_bundled_driver();
        let (server, sink) = sink_against_mock().await;
        let kernel = Kernel::new();

        kernel
            .run_cell(IpythonRequest { action_id: "a1".to_string(), code: "x = 40".to_string() }, &sink)
            .await;
        kernel
            .run_cell(IpythonRequest { action_id: "a2".to_string(), code: "x += 2".to_string() }, &sink)
            .await;
        kernel
            .run_cell(IpythonRequest { action_id: "a3".to_string(), code: "print(x)".to_string() }, &sink)
            .await;

        let requests = server.received_requests().await.unwrap();
        let bodies: Vec<Observation> = requests.iter().map(|r| r.body_json().unwrap()).collect();
        let printed = bodies
            .iter()
            .find(|o| o.action_id == "a3" && o.observation_type == mentisaid_core::ObservationType::Stream);
        assert_eq!(printed.and_then(|o| o.line.as_deref()), Some("42"));
    }

    #[tokio::test]
    async fn exception_reports_error_result_with_ename() {
        point_at_bundled_driver();
        let (server, sink) = sink_against_mock().await;
        let kernel = Kernel::new();

        kernel
            .run_cell(IpythonRequest { action_id: "b1".to_string(), code: "1/0".to_string() }, &sink)
            .await;

        let requests = server.received_requests().await.unwrap();
        let bodies: Vec<Observation> = requests.iter().map(|r| r.body_json().unwrap()).collect();
        let result = bodies
            .iter()
            .find(|o| o.action_id == "b1" && o.observation_type == mentisaid_core::ObservationType::Result)
            .unwrap();
        assert_ne!(result.exit_code, Some(0));
        assert!(result.error.as_deref().unwrap_or_default().contains("ZeroDivisionError"));
    }
}
