use std::{
    io::{BufRead, BufReader, Read},
    process::{Command, Stdio},
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::models::message::{Notification, Request, Response, ServerMessage, TASK_ID_KEY};

pub const RUN_SHELL: &str = "RunShell";
pub const OUTPUT_SIGNATURE: &str = "ShellOutput";

/// Stands in for the server: answers requests on its own thread.
pub struct BackendHandle {
    requests: Sender<Request>,
    messages: Sender<ServerMessage>,
    running: Arc<Mutex<Option<u32>>>,
}

impl BackendHandle {
    pub fn request_sender(&self) -> Sender<Request> {
        self.requests.clone()
    }

    /// Sends SIGTERM to the running child. Returns false if nothing runs.
    pub fn abort(&self) -> bool {
        let pid = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        match pid {
            Some(pid) => {
                unsafe {
                    libc::kill(pid as i32, libc::SIGTERM);
                }
                info!("Sent SIGTERM to process {}.", pid);
                true
            }
            None => false,
        }
    }

    pub fn simulate_connection_loss(&self) -> Result<()> {
        self.messages.send(ServerMessage::ConnectionLost).map_err(|_| SessionError::Disconnected)
    }

    pub fn simulate_reconnect(&self) -> Result<()> {
        self.messages.send(ServerMessage::Reconnected).map_err(|_| SessionError::Disconnected)
    }
}

pub fn spawn_backend(config: &Config, messages: Sender<ServerMessage>) -> BackendHandle {
    let (requests, receiver) = unbounded();
    let running = Arc::new(Mutex::new(None));

    let shell = config.shell.clone();
    let worker_messages = messages.clone();
    let worker_running = Arc::clone(&running);
    thread::spawn(move || {
        for request in receiver.iter() {
            handle_request(&shell, request, &worker_messages, &worker_running);
        }
        info!("Backend request channel closed.");
    });

    BackendHandle {
        requests,
        messages,
        running,
    }
}

pub fn message_channel() -> (Sender<ServerMessage>, Receiver<ServerMessage>) {
    unbounded()
}

fn handle_request(shell: &str, request: Request, messages: &Sender<ServerMessage>, running: &Arc<Mutex<Option<u32>>>) {
    if request.function != RUN_SHELL {
        warn!("Unsupported request '{}'.", request.function);
        let payload = json!({ "ok": false, "error": format!("unsupported function {}", request.function) });
        respond(messages, &request, payload);
        return;
    }

    let Some(command) = request.args.get("command").and_then(Value::as_str) else {
        respond(messages, &request, json!({ "ok": false, "error": "missing command" }));
        return;
    };

    info!("Running '{}'.", command);
    match Command::new(shell)
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(mut child) => {
            *running.lock().unwrap_or_else(PoisonError::into_inner) = Some(child.id());

            let task_id = request.pass.get(TASK_ID_KEY).cloned().unwrap_or(Value::Null);
            let mut readers = Vec::new();
            if let Some(stdout) = child.stdout.take() {
                readers.push(forward_lines(stdout, "stdout", task_id.clone(), messages.clone()));
            }
            if let Some(stderr) = child.stderr.take() {
                readers.push(forward_lines(stderr, "stderr", task_id, messages.clone()));
            }

            let messages = messages.clone();
            let running = Arc::clone(running);
            let pid = child.id();
            thread::spawn(move || {
                let result = child.wait();
                {
                    let mut guard = running.lock().unwrap_or_else(PoisonError::into_inner);
                    if *guard == Some(pid) {
                        *guard = None;
                    }
                }
                for reader in readers {
                    let _ = reader.join();
                }

                let payload = match result {
                    Ok(status) => json!({ "ok": status.success(), "code": status.code() }),
                    Err(e) => {
                        error!("Failed to wait for child process: {}", e);
                        json!({ "ok": false, "error": e.to_string() })
                    }
                };
                respond(&messages, &request, payload);
            });
        }
        Err(e) => {
            error!("Failed to run command: {}", e);
            respond(messages, &request, json!({ "ok": false, "error": e.to_string() }));
        }
    }
}

fn forward_lines<R>(stream: R, origin: &'static str, task_id: Value, messages: Sender<ServerMessage>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    error!("Failed to read {} of child process: {}", origin, e);
                    break;
                }
            }
            let line = String::from_utf8_lossy(&buffer);
            let line = line.trim_end_matches(['\n', '\r']);
            let rawdata = json!({
                "message": format!("[{}] {}", origin, line),
                TASK_ID_KEY: task_id,
            });
            let notification = Notification::new(RUN_SHELL, OUTPUT_SIGNATURE, rawdata);
            if messages.send(ServerMessage::Notification(notification)).is_err() {
                break;
            }
        }
    })
}

fn respond(messages: &Sender<ServerMessage>, request: &Request, payload: Value) {
    let response = Response::new(&request.function, &request.signature, payload, request.pass.clone());
    if messages.send(ServerMessage::Response(response)).is_err() {
        error!("Dropped response for '{}', nobody is listening.", request.function);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn shell_request(command: &str, id: u64) -> Request {
        Request {
            function: RUN_SHELL.to_string(),
            signature: "Done".to_string(),
            args: json!({ "command": command }),
            pass: json!({ TASK_ID_KEY: id }),
        }
    }

    fn next_response(receiver: &Receiver<ServerMessage>) -> (Vec<String>, Response) {
        let mut lines = Vec::new();
        loop {
            match receiver.recv_timeout(Duration::from_secs(10)).unwrap() {
                ServerMessage::Notification(n) => lines.push(n.message().unwrap().to_string()),
                ServerMessage::Response(r) => return (lines, r),
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    #[test]
    fn output_precedes_response() {
        let (sender, receiver) = message_channel();
        let backend = spawn_backend(&Config::default(), sender);
        backend.request_sender().send(shell_request("echo hello; echo oops >&2", 7)).unwrap();

        let (mut lines, response) = next_response(&receiver);
        lines.sort();
        assert_eq!(lines, vec!["[stderr] oops", "[stdout] hello"]);
        assert_eq!(response.signature, "Done");
        assert_eq!(response.task_id(), Some(7));
        assert_eq!(response.payload["ok"], json!(true));
        assert_eq!(response.payload["code"], json!(0));
    }

    #[test]
    fn invalid_utf8_output_keeps_command_alive() {
        let (sender, receiver) = message_channel();
        let backend = spawn_backend(&Config::default(), sender);
        backend
            .request_sender()
            .send(shell_request("printf 'caf\\351\\n'; sleep 0.3; echo after", 5))
            .unwrap();

        let (lines, response) = next_response(&receiver);
        assert_eq!(lines, vec!["[stdout] caf\u{FFFD}", "[stdout] after"]);
        assert_eq!(response.payload["ok"], json!(true));
        assert_eq!(response.payload["code"], json!(0));
    }

    #[test]
    fn failing_command_reports_not_ok() {
        let (sender, receiver) = message_channel();
        let backend = spawn_backend(&Config::default(), sender);
        backend.request_sender().send(shell_request("exit 3", 1)).unwrap();

        let (_, response) = next_response(&receiver);
        assert_eq!(response.payload["ok"], json!(false));
        assert_eq!(response.payload["code"], json!(3));
    }

    #[test]
    fn unsupported_function_is_answered() {
        let (sender, receiver) = message_channel();
        let backend = spawn_backend(&Config::default(), sender);
        let mut request = shell_request("true", 2);
        request.function = "DeleteEverything".to_string();
        backend.request_sender().send(request).unwrap();

        let (_, response) = next_response(&receiver);
        assert_eq!(response.payload["ok"], json!(false));
        assert_eq!(response.task_id(), Some(2));
    }

    #[test]
    fn abort_without_child_does_nothing() {
        let (sender, _receiver) = message_channel();
        let backend = spawn_backend(&Config::default(), sender);
        assert!(!backend.abort());
    }
}
