//! Process management for the pi CLI.
//!
//! This module handles spawning the pi subprocess in RPC mode and the
//! line-oriented pipes used to talk to it.
//!
//! # Architecture
//!
//! ```text
//! libpi                               pi --mode rpc
//! ┌──────────────┐                   ┌─────────────┐
//! │    Client    │──stdin (JSONL)───▶│             │
//! │              │◀─stdout (JSONL)───│             │
//! │              │◀─stderr (logs)────│             │
//! └──────────────┘                   └─────────────┘
//! ```
//!
//! # Protocol
//!
//! - Commands are written to stdin, one JSON object per line
//! - Responses and events arrive on stdout, one JSON object per line
//! - Stderr is captured for diagnostics and never parsed

mod io;
mod spawn;

pub use io::{AgentIo, FrameWriter, LineReader, StderrBuffer, MAX_STDERR_BYTES};
pub use spawn::{AgentProcess, LaunchSpec};

pub(crate) use spawn::{exit_cause, request_termination};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AgentProcess>();
        assert_send::<AgentIo>();
        assert_send::<LaunchSpec>();
    }
}
