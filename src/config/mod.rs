//! Configuration for the pi client.
//!
//! This module provides:
//!
//! - [`ClientConfig`] and [`ClientConfigBuilder`] for configuring the client
//! - [`Mode`] presets that resolve to a provider, model and thinking level
//! - [`SessionMode`] for session persistence
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use libpi::config::{ClientConfig, Mode, SessionMode};
//!
//! let config = ClientConfig::builder()
//!     .mode(Mode::Coding)
//!     .session(SessionMode::named("refactor"))
//!     .request_timeout(Duration::from_secs(30))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.request_timeout(), Duration::from_secs(30));
//! ```
//!
//! # Environment
//!
//! The child does not inherit the full parent environment. Only the variables
//! in [`DEFAULT_ENV_ALLOWLIST`] and those starting with one of
//! [`DEFAULT_ENV_ALLOW_PREFIXES`] are passed through, followed by explicit
//! values set with [`ClientConfigBuilder::env`].

pub mod builder;
pub mod options;

pub use builder::{
    ClientConfig, ClientConfigBuilder, DEFAULT_APP_NAME, DEFAULT_ENV_ALLOWLIST,
    DEFAULT_ENV_ALLOW_PREFIXES, ENV_AGENT_DIR,
};
pub use options::{Mode, ModelSelection, SessionMode};
