//! Concurrency primitives shared by the transport and the event hub.
//!
//! - [`Queue`]: FIFO with blocking pop and idempotent close. Carries raw
//!   process events to the dispatch task and backs every subscriber inbox.
//! - [`PendingRegistry`]: request id → one-shot slot, with a single terminal
//!   error that fails every outstanding and future registration.

mod pending;
mod queue;

pub use pending::PendingRegistry;
pub use queue::{PushError, Queue};
