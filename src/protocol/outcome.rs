//! Terminal outcome of a run.

use serde::Deserialize;
use serde_json::Value;

use super::events::{
    AgentEndEvent, AgentMessage, AutoCompactionEndEvent, AutoCompactionStartEvent,
    AutoRetryEndEvent, AutoRetryStartEvent,
};
use super::usage::Usage;
use crate::{Error, Result};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalStatus {
    Completed,
    Failed,
    Aborted,
}

impl TerminalStatus {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalStatus::Completed => "completed",
            TerminalStatus::Failed => "failed",
            TerminalStatus::Aborted => "aborted",
        }
    }

    fn from_message(stop_reason: &str, error_message: &str) -> Self {
        let reason = stop_reason.trim().to_lowercase();
        if reason == "aborted" {
            return TerminalStatus::Aborted;
        }
        if !error_message.trim().is_empty() {
            return TerminalStatus::Failed;
        }
        match reason.as_str() {
            "error" | "failed" => TerminalStatus::Failed,
            _ => TerminalStatus::Completed,
        }
    }
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical result of one run, derived from the last assistant message of
/// an `agent_end` event.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalOutcome {
    pub status: TerminalStatus,
    pub text: String,
    pub stop_reason: String,
    pub terminal_reason: String,
    pub error_message: String,
    pub usage: Option<Usage>,
}

impl TerminalOutcome {
    /// Derive the outcome from an `agent_end` transcript.
    pub fn from_agent_end(event: &AgentEndEvent) -> Result<Self> {
        let message = event
            .messages
            .iter()
            .rev()
            .find(|m| m.is_assistant())
            .ok_or_else(|| Error::protocol("assistant message not found in agent_end"))?;
        Self::from_message(message)
    }

    fn from_message(message: &AgentMessage) -> Result<Self> {
        Ok(Self {
            status: TerminalStatus::from_message(&message.stop_reason, &message.error_message),
            text: assistant_text(&message.content)?,
            stop_reason: message.stop_reason.trim().to_string(),
            terminal_reason: message.terminal_reason().to_string(),
            error_message: message.error_message.trim().to_string(),
            usage: message.usage.clone(),
        })
    }
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Plain text of a message: the string itself, or all `text` blocks joined.
fn assistant_text(content: &Value) -> Result<String> {
    match content {
        Value::Null => Ok(String::new()),
        Value::String(text) => Ok(text.clone()),
        other => {
            let blocks = Vec::<ContentBlock>::deserialize(other)?;
            Ok(blocks
                .into_iter()
                .filter(|b| b.kind == "text")
                .map(|b| b.text)
                .collect())
        }
    }
}

/// Text and usage of a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    pub text: String,
    pub usage: Option<Usage>,
}

impl From<TerminalOutcome> for RunResult {
    fn from(outcome: TerminalOutcome) -> Self {
        Self {
            text: outcome.text,
            usage: outcome.usage,
        }
    }
}

/// Terminal outcome plus the recovery signals observed during the run.
///
/// Each signal holds the last event of that kind seen before `agent_end`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDetailedResult {
    pub outcome: TerminalOutcome,
    pub auto_compaction_start: Option<AutoCompactionStartEvent>,
    pub auto_compaction_end: Option<AutoCompactionEndEvent>,
    pub auto_retry_start: Option<AutoRetryStartEvent>,
    pub auto_retry_end: Option<AutoRetryEndEvent>,
}

impl RunDetailedResult {
    pub(crate) fn new(outcome: TerminalOutcome) -> Self {
        Self {
            outcome,
            auto_compaction_start: None,
            auto_compaction_end: None,
            auto_retry_start: None,
            auto_retry_end: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn agent_end(messages: Value) -> AgentEndEvent {
        serde_json::from_value(json!({ "messages": messages })).unwrap()
    }

    #[test]
    fn completed_with_text_blocks() {
        let event = agent_end(json!([
            {"role": "user", "content": "hello"},
            {
                "role": "assistant",
                "content": [
                    {"type": "thinking", "thinking": "hmm"},
                    {"type": "text", "text": "hello "},
                    {"type": "text", "text": "from helper"}
                ],
                "usage": {"input": 10, "output": 5, "cacheRead": 0, "cacheWrite": 0}
            }
        ]));
        let outcome = TerminalOutcome::from_agent_end(&event).unwrap();
        assert_eq!(outcome.status, TerminalStatus::Completed);
        assert_eq!(outcome.text, "hello from helper");
        assert_eq!(outcome.usage.unwrap().input, 10);
    }

    #[test]
    fn string_content() {
        let event = agent_end(json!([{"role": "assistant", "content": "plain"}]));
        assert_eq!(TerminalOutcome::from_agent_end(&event).unwrap().text, "plain");
    }

    #[test]
    fn aborted_wins_over_error_message() {
        let event = agent_end(json!([{
            "role": "assistant",
            "content": [],
            "stopReason": "Aborted",
            "errorMessage": "interrupted"
        }]));
        let outcome = TerminalOutcome::from_agent_end(&event).unwrap();
        assert_eq!(outcome.status, TerminalStatus::Aborted);
        assert_eq!(outcome.error_message, "interrupted");
    }

    #[test]
    fn failed_statuses() {
        let with_message = agent_end(json!([{"role": "assistant", "errorMessage": "rate limited"}]));
        assert_eq!(
            TerminalOutcome::from_agent_end(&with_message).unwrap().status,
            TerminalStatus::Failed
        );

        let with_reason = agent_end(json!([{"role": "assistant", "stopReason": "error"}]));
        assert_eq!(
            TerminalOutcome::from_agent_end(&with_reason).unwrap().status,
            TerminalStatus::Failed
        );
    }

    #[test]
    fn uses_last_assistant_message() {
        let event = agent_end(json!([
            {"role": "assistant", "content": "first"},
            {"role": "toolResult", "content": "tool"},
            {"role": "assistant", "content": "second", "terminalReason": "done"}
        ]));
        let outcome = TerminalOutcome::from_agent_end(&event).unwrap();
        assert_eq!(outcome.text, "second");
        assert_eq!(outcome.terminal_reason, "done");
    }

    #[test]
    fn missing_assistant_is_protocol_violation() {
        let event = agent_end(json!([{"role": "user", "content": "hello"}]));
        let err = TerminalOutcome::from_agent_end(&event).unwrap_err();
        assert!(err.is_protocol_violation());
    }
}
