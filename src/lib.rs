//! # libpi
//!
//! Async Rust client for the pi coding agent's RPC mode.
//!
//! A [`Client`] owns one long-lived `pi --mode rpc` process and talks to it
//! over newline-delimited JSON on stdin/stdout:
//! - Concurrent request/response correlation by request id
//! - Fan-out of agent events to subscribers with per-subscriber backpressure
//! - Prompt-and-wait runs that return the agent's final answer
//! - Fail-fast terminal states once the process dies or the client closes
//!
//! ## Quick Start
//!
//! ```ignore
//! use libpi::{Client, Context, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder().start()?;
//!     let result = client.run(&Context::new(), "What is 2+2?").await?;
//!     println!("{}", result.text);
//!     client.close().await
//! }
//! ```
//!
//! ## Events
//!
//! ```ignore
//! use libpi::{Client, Context, SubscriptionPolicy};
//! use libpi::protocol::{event_kind, MessageUpdateEvent};
//!
//! let mut events = client.subscribe(SubscriptionPolicy::ring(256))?;
//! client.prompt(&Context::new(), "Write a poem").await?;
//! while let Some(event) = events.recv().await {
//!     if event.is(event_kind::MESSAGE_UPDATE) {
//!         let update: MessageUpdateEvent = event.decode()?;
//!         print!("{}", update.assistant_message_event.delta);
//!     }
//!     if event.is(event_kind::AGENT_END) {
//!         break;
//!     }
//! }
//! ```
//!
//! ## Configuration
//!
//! ```ignore
//! use std::time::Duration;
//! use libpi::{Client, Mode, SessionMode};
//!
//! let client = Client::builder()
//!     .mode(Mode::Coding)
//!     .session(SessionMode::named("refactor"))
//!     .request_timeout(Duration::from_secs(30))
//!     .start()?;
//! ```

mod client;
pub mod config;
mod context;
mod error;
pub mod managed;
pub mod process;
pub mod protocol;
pub mod runtime;
pub mod stream;

pub use error::{Error, Result, PROCESS_DIED_MESSAGE};

// Re-export the main client types at crate root
pub use client::{Client, ClientBuilder, RUN_SUBSCRIPTION_BUFFER};
pub use context::Context;

// Re-export commonly used config types at crate root
pub use config::{ClientConfig, ClientConfigBuilder, Mode, SessionMode};

pub use protocol::{
    Command, Event, PromptRequest, Response, RunDetailedResult, RunResult, TerminalOutcome,
    TerminalStatus,
};
pub use stream::{Subscription, SubscriptionMode, SubscriptionPolicy};
