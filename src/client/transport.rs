//! Background tasks: stdout classification, event dispatch and exit watching.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncRead;

use super::Shared;
use crate::process::{exit_cause, AgentProcess, LineReader};
use crate::protocol::{Envelope, Event, Response, RESPONSE_TYPE};

/// One entry on the raw event queue.
#[derive(Debug)]
pub(crate) enum Dispatch {
    Event(Event),
    /// Publish the death event, then close the hub. Always the last entry.
    ProcessDied(Event),
}

/// Publish queued events in arrival order until the queue closes.
pub(crate) async fn dispatch_events(shared: Arc<Shared>) {
    while let Some(item) = shared.queue.pop().await {
        match item {
            Dispatch::Event(event) => shared.hub.publish(&event).await,
            Dispatch::ProcessDied(event) => {
                shared.hub.process_died(event).await;
                break;
            }
        }
    }
    tracing::debug!("event dispatch finished");
    shared.dispatch_done.cancel();
}

/// Read and classify stdout lines until EOF, a read error or close.
///
/// With a child process, EOF is left to the exit watcher so the death can
/// carry the exit status. A child that closed stdout but is still running
/// after the drain timeout is marked dead without a cause.
pub(crate) async fn read_stdout(
    shared: Arc<Shared>,
    stdout: impl AsyncRead + Unpin,
    has_child: bool,
) {
    let mut reader = LineReader::new(stdout);
    let eof = loop {
        let line = tokio::select! {
            biased;
            _ = shared.closed.cancelled() => break false,
            line = reader.read_line() => line,
        };
        match line {
            Ok(Some(line)) => shared.handle_line(line),
            Ok(None) => break true,
            Err(e) => {
                shared.mark_process_died(Some(e.to_string()));
                break false;
            }
        }
    };
    shared.reader_done.cancel();
    if !eof {
        return;
    }

    tracing::debug!("pi stdout closed");
    if has_child {
        let drain = shared.config.dispatch_drain_timeout;
        if tokio::time::timeout(drain, shared.exited.cancelled())
            .await
            .is_ok()
        {
            return;
        }
        tracing::debug!("pi still running {:?} after closing stdout", drain);
    }
    shared.mark_process_died(None);
}

/// Wait for the child to exit and record its death.
pub(crate) async fn watch_exit(shared: Arc<Shared>, process: AgentProcess) {
    let status = process.wait_or_kill(shared.kill.clone()).await;
    // The pid may be reused from here on.
    shared.exited.cancel();

    // Lines written just before exit must reach subscribers before process_died.
    let drain = shared.config.dispatch_drain_timeout;
    if tokio::time::timeout(drain, shared.reader_done.cancelled())
        .await
        .is_err()
    {
        tracing::debug!("stdout still open {:?} after exit", drain);
    }

    let cause = match status {
        Ok(status) => {
            tracing::debug!("pi exited with {}", status);
            exit_cause(&status)
        }
        Err(e) => Some(e.to_string()),
    };
    shared.mark_process_died(cause);
}

impl Shared {
    pub(crate) fn handle_line(&self, line: Bytes) {
        let kind = match serde_json::from_slice::<Envelope>(&line) {
            Ok(envelope) if !envelope.kind.trim().is_empty() => envelope.kind,
            Ok(_) | Err(_) => {
                tracing::debug!("unparseable line from pi ({} bytes)", line.len());
                self.enqueue(Event::parse_error(line));
                return;
            }
        };

        if kind != RESPONSE_TYPE {
            self.enqueue(Event::new(kind, line));
            return;
        }

        let response = match Response::decode(&line) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("malformed response: {}", e);
                self.enqueue(Event::response_parse_error(line));
                return;
            }
        };
        let id = response.id.clone();
        if !self.registry.resolve(&id, response) {
            tracing::debug!("no pending request for response {:?}", id);
            self.enqueue(Event::new(RESPONSE_TYPE, line));
        }
    }

    fn enqueue(&self, event: Event) {
        if !self.queue.push(Dispatch::Event(event)) {
            tracing::debug!("event queue closed, dropping event");
        }
    }

    /// Record the process death. Only the first call has any effect, and
    /// none after the caller started closing the client.
    pub(crate) fn mark_process_died(&self, cause: Option<String>) {
        if self.closed.is_cancelled() || self.died.swap(true, Ordering::AcqRel) {
            return;
        }
        match cause.as_deref() {
            Some(cause) => tracing::warn!("pi process died: {}", cause),
            None => tracing::warn!("pi process died"),
        }

        self.registry.mark_process_died(cause.clone());
        self.queue
            .push(Dispatch::ProcessDied(Event::process_died(cause.as_deref())));
        self.queue.close();
    }
}
