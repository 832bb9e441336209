//! Typed requests and the commands they encode to.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::wire::{command_kind, Command};
use crate::{Error, Result};

/// How a prompt is queued when the agent is already streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamingBehavior {
    /// Interrupt the current turn.
    Steer,
    /// Queue after the current turn.
    FollowUp,
}

impl StreamingBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamingBehavior::Steer => "steer",
            StreamingBehavior::FollowUp => "followUp",
        }
    }
}

/// An inline image attached to a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    /// Base64-encoded image bytes.
    pub data: String,
    pub mime_type: String,
}

impl ImageContent {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// A user message for `prompt`, `steer` or `follow_up`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptRequest {
    pub message: String,
    pub images: Vec<ImageContent>,
    /// Only valid for `prompt`.
    pub streaming_behavior: Option<StreamingBehavior>,
}

impl PromptRequest {
    /// A text-only request.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Attach an image.
    pub fn image(mut self, image: ImageContent) -> Self {
        self.images.push(image);
        self
    }

    /// Set how the prompt is queued while the agent is streaming.
    pub fn streaming_behavior(mut self, behavior: StreamingBehavior) -> Self {
        self.streaming_behavior = Some(behavior);
        self
    }

    fn validate(&self, allow_streaming_behavior: bool) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(Error::InvalidRequest("message is required".into()));
        }
        if !allow_streaming_behavior && self.streaming_behavior.is_some() {
            return Err(Error::InvalidRequest(
                "streaming behavior is not allowed for this command".into(),
            ));
        }
        for (index, image) in self.images.iter().enumerate() {
            if image.data.trim().is_empty() {
                return Err(Error::InvalidRequest(format!("images[{index}].data is required")));
            }
            if image.mime_type.trim().is_empty() {
                return Err(Error::InvalidRequest(format!(
                    "images[{index}].mimeType is required"
                )));
            }
        }
        Ok(())
    }

    fn encode(&self, kind: &str) -> Command {
        let mut command = Command::new(kind).with("message", self.message.clone());
        if let Some(behavior) = self.streaming_behavior {
            command.insert("streamingBehavior", behavior.as_str());
        }
        if !self.images.is_empty() {
            let images: Vec<Value> = self
                .images
                .iter()
                .map(|image| {
                    json!({
                        "type": "image",
                        "data": image.data,
                        "mimeType": image.mime_type,
                    })
                })
                .collect();
            command.insert("images", images);
        }
        command
    }
}

impl From<&str> for PromptRequest {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for PromptRequest {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// `prompt`: start a run.
pub fn prompt(request: &PromptRequest) -> Result<Command> {
    request.validate(true)?;
    Ok(request.encode(command_kind::PROMPT))
}

/// `steer`: interrupt the running turn with a new message.
pub fn steer(request: &PromptRequest) -> Result<Command> {
    request.validate(false)?;
    Ok(request.encode(command_kind::STEER))
}

/// `follow_up`: queue a message after the running turn.
pub fn follow_up(request: &PromptRequest) -> Result<Command> {
    request.validate(false)?;
    Ok(request.encode(command_kind::FOLLOW_UP))
}

/// `abort`: stop the running turn.
pub fn abort() -> Command {
    Command::new(command_kind::ABORT)
}

/// `get_state`: snapshot of the session.
pub fn get_state() -> Command {
    Command::new(command_kind::GET_STATE)
}

/// `new_session`: start a fresh session, optionally forked from `parent_session`.
pub fn new_session(parent_session: Option<&str>) -> Command {
    with_trimmed(
        Command::new(command_kind::NEW_SESSION),
        "parentSession",
        parent_session,
    )
}

/// `compact`: summarize the transcript to free context.
pub fn compact(custom_instructions: Option<&str>) -> Command {
    with_trimmed(
        Command::new(command_kind::COMPACT),
        "customInstructions",
        custom_instructions,
    )
}

/// `get_commands`: list the slash commands the agent knows.
pub fn get_commands() -> Command {
    Command::new(command_kind::GET_COMMANDS)
}

fn with_trimmed(command: Command, key: &str, value: Option<&str>) -> Command {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => command.with(key, value),
        _ => command,
    }
}

#[derive(Deserialize)]
pub(crate) struct NewSessionData {
    #[serde(default)]
    pub cancelled: bool,
}

#[derive(Deserialize)]
pub(crate) struct CommandsData {
    #[serde(default)]
    pub commands: Vec<super::state::SlashCommand>,
}
