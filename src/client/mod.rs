//! The pi RPC client.
//!
//! This module provides [`Client`], the main entry point for talking to a
//! long-lived `pi --mode rpc` process.
//!
//! # Example
//!
//! ```ignore
//! use libpi::{Client, Context, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder().start()?;
//!
//!     // One prompt, waiting for the agent to finish.
//!     let result = client.run(&Context::new(), "What is 2+2?").await?;
//!     println!("{}", result.text);
//!
//!     client.close().await
//! }
//! ```
//!
//! # Concurrency
//!
//! A client runs four background tasks: the stdout line reader, the event
//! dispatcher, stderr capture and (for spawned processes) the exit watcher.
//! Any number of tasks may call [`Client::send`] concurrently; responses are
//! correlated by request id and never wait on event subscribers.

mod builder;
mod rpc;
mod run;
mod send;
mod transport;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::process::{AgentIo, AgentProcess, FrameWriter, LaunchSpec, StderrBuffer};
use crate::protocol::Response;
use crate::runtime::{PendingRegistry, Queue};
use crate::stream::{Hub, Subscription, SubscriptionPolicy};
use crate::{Error, Result};

pub use builder::ClientBuilder;
pub use run::RUN_SUBSCRIPTION_BUFFER;

use transport::Dispatch;

type BoxedWrite = Box<dyn tokio::io::AsyncWrite + Send + Unpin>;

/// A connection to one pi process.
///
/// # Thread Safety
///
/// `Client` is `Send + Sync`. Share it with `Arc<Client>` to issue requests
/// from several tasks.
///
/// # Lifecycle
///
/// The client ends in exactly one terminal state: the process died
/// ([`Error::ProcessDied`]) or the caller closed it ([`Error::ClientClosed`]).
/// From then on every operation fails fast with that error.
///
/// # Cancellation
///
/// Dropping a `Client` without calling [`close`](Self::close) kills the
/// process and tears everything down without waiting.
#[derive(Debug)]
pub struct Client {
    shared: Arc<Shared>,
}

/// State shared between the client handle and its background tasks.
pub(crate) struct Shared {
    config: ClientConfig,
    registry: PendingRegistry<Response>,
    hub: Hub,
    queue: Queue<Dispatch>,
    writer: Mutex<FrameWriter<BoxedWrite>>,
    stderr: StderrBuffer,
    pid: Option<u32>,
    next_id: AtomicU64,
    run_active: AtomicBool,
    died: AtomicBool,
    close_started: AtomicBool,
    /// Cancelled when the caller starts closing the client.
    closed: CancellationToken,
    /// Cancelled to force-kill the child.
    kill: CancellationToken,
    reader_done: CancellationToken,
    dispatch_done: CancellationToken,
    /// Cancelled once the child has been reaped (or immediately without a child).
    exited: CancellationToken,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("pid", &self.pid)
            .field("pending", &self.registry.len())
            .field("subscribers", &self.hub.subscriber_count())
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a builder for configuring and starting a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Locate the pi CLI and start it in RPC mode.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CliNotFound`] if pi is not on `PATH`, or
    /// [`Error::ProcessSpawn`] if it could not be started.
    pub fn start(config: ClientConfig) -> Result<Self> {
        let spec = LaunchSpec::resolve(&config)?;
        Self::spawn(spec, config)
    }

    /// Start the process described by `spec`.
    ///
    /// `config` supplies timeouts; its launch options are ignored.
    pub fn spawn(spec: LaunchSpec, config: ClientConfig) -> Result<Self> {
        let (process, io) = AgentProcess::spawn(&spec)?;
        Ok(Self::launch(io, Some(process), config))
    }

    /// Run the client over arbitrary pipes instead of a child process.
    ///
    /// End of input on `io.stdout` is treated as process death.
    pub fn from_io(io: AgentIo, config: ClientConfig) -> Self {
        Self::launch(io, None, config)
    }

    fn launch(io: AgentIo, process: Option<AgentProcess>, config: ClientConfig) -> Self {
        let AgentIo {
            stdin,
            stdout,
            stderr,
        } = io;

        let shared = Arc::new(Shared {
            config,
            registry: PendingRegistry::new(),
            hub: Hub::new(),
            queue: Queue::new(),
            writer: Mutex::new(FrameWriter::new(stdin)),
            stderr: StderrBuffer::new(),
            pid: process.as_ref().and_then(AgentProcess::pid),
            next_id: AtomicU64::new(0),
            run_active: AtomicBool::new(false),
            died: AtomicBool::new(false),
            close_started: AtomicBool::new(false),
            closed: CancellationToken::new(),
            kill: CancellationToken::new(),
            reader_done: CancellationToken::new(),
            dispatch_done: CancellationToken::new(),
            exited: CancellationToken::new(),
        });

        if let Some(stderr) = stderr {
            let buffer = shared.stderr.clone();
            tokio::spawn(async move { buffer.capture(stderr).await });
        }
        tokio::spawn(transport::dispatch_events(Arc::clone(&shared)));
        tokio::spawn(transport::read_stdout(
            Arc::clone(&shared),
            stdout,
            process.is_some(),
        ));
        match process {
            Some(process) => {
                tokio::spawn(transport::watch_exit(Arc::clone(&shared), process));
            }
            None => shared.exited.cancel(),
        }

        Self { shared }
    }

    /// Subscribe to every event published after this call.
    ///
    /// # Errors
    ///
    /// Fails with the terminal error once the process has died or the client
    /// is closed, and with [`Error::InvalidSubscriptionPolicy`] for a bad policy.
    pub fn subscribe(&self, policy: SubscriptionPolicy) -> Result<Subscription> {
        if let Some(err) = self.shared.registry.current_error() {
            return Err(err);
        }
        if self.shared.closed.is_cancelled() {
            return Err(Error::ClientClosed);
        }
        policy.validate()?;
        self.shared.hub.subscribe(policy)
    }

    /// Everything the process has written to stderr so far.
    pub fn stderr(&self) -> String {
        self.shared.stderr.snapshot()
    }

    /// Process ID of the child, if this client spawned one.
    pub fn pid(&self) -> Option<u32> {
        self.shared.pid
    }

    /// Whether the client has reached a terminal state.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled() || self.shared.died.load(Ordering::Acquire)
    }

    /// The client's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Shut the client down. Idempotent.
    ///
    /// Closes stdin and asks the process to exit, waiting up to the shutdown
    /// grace period before killing it. Pending requests then fail with
    /// [`Error::ClientClosed`] (or the process-died error if that came first),
    /// and every subscription ends.
    pub async fn close(&self) -> Result<()> {
        let shared = &self.shared;
        if shared.close_started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!("closing client");
        shared.closed.cancel();

        let grace = shared.config.shutdown_grace;
        let shutdown_stdin = async {
            let mut writer = shared.writer.lock().await;
            writer.shutdown().await
        };
        match tokio::time::timeout(grace, shutdown_stdin).await {
            Ok(Err(e)) => tracing::debug!("closing stdin failed: {}", e),
            Err(_) => tracing::debug!("timed out closing stdin"),
            Ok(Ok(())) => {}
        }

        // A reaped child's pid may already belong to another process.
        let running = shared.pid.filter(|_| !shared.exited.is_cancelled());
        if let Some(pid) = running {
            if !crate::process::request_termination(pid) {
                shared.kill.cancel();
            }
            if tokio::time::timeout(grace, shared.exited.cancelled())
                .await
                .is_err()
            {
                tracing::warn!("pi (pid {}) did not exit within {:?}", pid, grace);
                shared.kill.cancel();
                shared.exited.cancelled().await;
            }
        }

        shared.teardown();
        if tokio::time::timeout(
            shared.config.dispatch_drain_timeout,
            shared.dispatch_done.cancelled(),
        )
        .await
        .is_err()
        {
            tracing::debug!("event dispatch did not drain before close returned");
        }
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let shared = &self.shared;
        if shared.close_started.swap(true, Ordering::AcqRel) {
            return;
        }
        shared.closed.cancel();
        shared.kill.cancel();
        shared.teardown();
    }
}

impl Shared {
    fn next_request_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("req-{n}")
    }

    /// The error a failed operation should report, if the client is done.
    fn terminal_error(&self) -> Option<Error> {
        self.registry.current_error().or_else(|| {
            self.closed
                .is_cancelled()
                .then_some(Error::ClientClosed)
        })
    }

    fn teardown(&self) {
        self.registry.close();
        self.hub.close();
        self.queue.close();
    }
}
