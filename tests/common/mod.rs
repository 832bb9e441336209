//! Test utilities for libpi integration tests.
//!
//! [`FakeAgent`] plays the pi side of the RPC pipes in-process, so the whole
//! client transport runs without a real binary.

#![allow(dead_code)]

use std::time::Duration;

use libpi::process::AgentIo;
use libpi::{Client, ClientConfig};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

/// How long a test waits for something that should happen promptly.
pub const WAIT: Duration = Duration::from_secs(5);

/// Install a tracing subscriber driven by `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Start a client wired to a fake agent with default configuration.
pub fn connect() -> (Client, FakeAgent) {
    connect_with(ClientConfig::default())
}

pub fn connect_with(config: ClientConfig) -> (Client, FakeAgent) {
    init_tracing();
    let (client_end, agent_end) = tokio::io::duplex(64 * 1024);
    let (stdout, stdin) = tokio::io::split(client_end);
    let client = Client::from_io(AgentIo::new(stdin, stdout), config);
    (client, FakeAgent::new(agent_end))
}

/// The agent end of the pipes.
pub struct FakeAgent {
    commands: BufReader<ReadHalf<DuplexStream>>,
    output: WriteHalf<DuplexStream>,
}

impl FakeAgent {
    fn new(stream: DuplexStream) -> Self {
        let (commands, output) = tokio::io::split(stream);
        Self {
            commands: BufReader::new(commands),
            output,
        }
    }

    /// Next command the client wrote, or `None` once stdin is closed.
    pub async fn try_recv(&mut self) -> Option<Value> {
        let mut line = String::new();
        let read = self.commands.read_line(&mut line).await.ok()?;
        if read == 0 {
            return None;
        }
        Some(serde_json::from_str(&line).expect("client wrote invalid JSON"))
    }

    /// Next command, failing the test if none arrives in time.
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.try_recv())
            .await
            .expect("timed out waiting for a command")
            .expect("client closed stdin")
    }

    /// Write one JSON line to the client.
    pub async fn send(&mut self, line: Value) {
        let mut raw = serde_json::to_vec(&line).unwrap();
        raw.push(b'\n');
        self.send_raw(&raw).await;
    }

    pub async fn send_raw(&mut self, raw: &[u8]) {
        self.output.write_all(raw).await.unwrap();
        self.output.flush().await.unwrap();
    }

    /// Answer `request` successfully.
    pub async fn ok(&mut self, request: &Value, data: Option<Value>) {
        self.send(ok_response(request, data)).await;
    }

    /// Answer `request` with a failure.
    pub async fn fail(&mut self, request: &Value, error: &str) {
        self.send(fail_response(request, error)).await;
    }

    /// Answer every command with the lines `handler` returns, until the
    /// client closes stdin. Resolves to the commands received, in order.
    pub fn serve<F>(mut self, mut handler: F) -> JoinHandle<Vec<Value>>
    where
        F: FnMut(&Value) -> Vec<Value> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(request) = self.try_recv().await {
                for line in handler(&request) {
                    self.send(line).await;
                }
                seen.push(request);
            }
            seen
        })
    }
}

/// Scripted replies for one prompt turn.
pub struct Scenario {
    lines: Vec<Value>,
}

impl Scenario {
    /// Accept the prompt, as pi does before streaming events.
    pub fn accepted(request: &Value) -> Self {
        Self {
            lines: vec![ok_response(request, None)],
        }
    }

    pub fn event(mut self, line: Value) -> Self {
        self.lines.push(line);
        self
    }

    pub fn agent_start(self) -> Self {
        self.event(json!({"type": "agent_start"}))
    }

    pub fn compaction(self, reason: &str) -> Self {
        self.event(json!({"type": "auto_compaction_start", "reason": reason}))
            .event(json!({
                "type": "auto_compaction_end",
                "result": {"summary": "compacted", "firstKeptEntryId": "e1", "tokensBefore": 190000},
                "aborted": false,
                "willRetry": true
            }))
    }

    pub fn retry(self, attempt: u32) -> Self {
        self.event(json!({
            "type": "auto_retry_start",
            "attempt": attempt,
            "maxAttempts": 3,
            "delayMs": 10,
            "errorMessage": "overloaded"
        }))
        .event(json!({"type": "auto_retry_end", "success": true, "attempt": attempt}))
    }

    pub fn agent_end(self, text: &str) -> Self {
        self.event(agent_end(text, "stop", ""))
    }

    pub fn build(self) -> Vec<Value> {
        self.lines
    }
}

pub fn ok_response(request: &Value, data: Option<Value>) -> Value {
    let mut response = json!({
        "type": "response",
        "id": request["id"],
        "command": request["type"],
        "success": true,
    });
    if let Some(data) = data {
        response["data"] = data;
    }
    response
}

pub fn fail_response(request: &Value, error: &str) -> Value {
    json!({
        "type": "response",
        "id": request["id"],
        "command": request["type"],
        "success": false,
        "error": error,
    })
}

/// An `agent_end` whose last assistant message has the given text.
pub fn agent_end(text: &str, stop_reason: &str, error_message: &str) -> Value {
    json!({
        "type": "agent_end",
        "messages": [
            {"role": "user", "content": "question"},
            {
                "role": "assistant",
                "content": [{"type": "text", "text": text}],
                "stopReason": stop_reason,
                "errorMessage": error_message,
                "usage": {"input": 12, "output": 4, "cacheRead": 0, "cacheWrite": 0}
            }
        ]
    })
}
