//! JSON protocol types for pi's RPC mode.
//!
//! pi reads one JSON command per line on stdin and writes one JSON object per
//! line on stdout. Every command carries a string `type`; the client adds an
//! `id`. Every stdout line is either a correlated [`Response`]
//! (`"type": "response"`) or an [`Event`].
//!
//! # Frames
//!
//! - [`Command`]: outbound request, built by the helpers in [`commands`]
//! - [`Response`]: `{"type":"response","id","command","success","error"?,"data"?}`
//! - [`Event`]: anything else, kept as raw bytes and decoded on demand
//!
//! # Example
//!
//! ```
//! use libpi::protocol::{AgentEndEvent, Event, TerminalOutcome, TerminalStatus};
//!
//! let line = r#"{"type":"agent_end","messages":[{"role":"assistant","content":[{"type":"text","text":"Hi!"}]}]}"#;
//! let event = Event::new("agent_end", line);
//! let end: AgentEndEvent = event.decode().unwrap();
//! let outcome = TerminalOutcome::from_agent_end(&end).unwrap();
//! assert_eq!(outcome.status, TerminalStatus::Completed);
//! assert_eq!(outcome.text, "Hi!");
//! ```

pub mod commands;
mod events;
mod outcome;
mod state;
mod usage;
mod wire;

// Re-export all public types
pub use commands::{ImageContent, PromptRequest, StreamingBehavior};
pub use events::{
    event_kind, AgentEndEvent, AgentMessage, AssistantMessageDelta, AutoCompactionEndEvent,
    AutoCompactionStartEvent, AutoRetryEndEvent, AutoRetryStartEvent, Event, EventPayload,
    MessageUpdateEvent, ProcessDiedEvent, SubscriptionDropEvent,
};
pub use outcome::{RunDetailedResult, RunResult, TerminalOutcome, TerminalStatus};
pub use state::{CompactResult, ModelInfo, SessionState, SlashCommand};
pub use usage::{Cost, Usage};
pub use wire::{command_kind, Command, Response, RESPONSE_TYPE};

pub(crate) use wire::Envelope;
