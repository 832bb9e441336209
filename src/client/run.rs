//! Prompt-and-wait runs.

use std::sync::atomic::{AtomicBool, Ordering};

use super::send::response_error;
use super::Client;
use crate::protocol::{
    command_kind, commands, event_kind, AgentEndEvent, AutoCompactionEndEvent,
    AutoCompactionStartEvent, AutoRetryEndEvent, AutoRetryStartEvent, Event, EventPayload,
    ProcessDiedEvent, PromptRequest, Response, RunDetailedResult, RunResult, TerminalOutcome,
};
use crate::stream::SubscriptionPolicy;
use crate::{Context, Error, Result};

/// Ring buffer size of the subscription a run reads events from.
pub const RUN_SUBSCRIPTION_BUFFER: usize = 256;

/// Holds the client's single run slot until dropped.
struct RunGuard<'a> {
    active: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(active: &'a AtomicBool) -> Result<Self> {
        active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::RunInProgress)?;
        Ok(Self { active })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

impl Client {
    /// Send a prompt and wait for the agent to finish it.
    ///
    /// Only one run may be active per client. If `ctx` ends first, an `abort`
    /// is sent (bounded by the abort timeout) before the context error is
    /// returned. `ctx` carries no default deadline here: a run lasts as long
    /// as the agent works.
    ///
    /// # Errors
    ///
    /// - [`Error::RunInProgress`] if another run is active
    /// - [`Error::Rpc`] if the agent rejects the prompt, immediately or
    ///   asynchronously after accepting it
    /// - the terminal error if the process dies or the client closes
    /// - [`Error::ProtocolViolation`] for an `agent_end` without an assistant
    ///   message
    pub async fn run(&self, ctx: &Context, request: impl Into<PromptRequest>) -> Result<RunResult> {
        let detailed = self.run_detailed(ctx, request).await?;
        Ok(detailed.outcome.into())
    }

    /// Like [`run`](Self::run), but returns the full terminal outcome and
    /// the compaction and retry events observed along the way.
    pub async fn run_detailed(
        &self,
        ctx: &Context,
        request: impl Into<PromptRequest>,
    ) -> Result<RunDetailedResult> {
        let _guard = RunGuard::acquire(&self.shared.run_active)?;
        let mut events = self.subscribe(SubscriptionPolicy::ring(RUN_SUBSCRIPTION_BUFFER))?;
        let command = commands::prompt(&request.into())?;

        let accepted = self.send(ctx, command).await?;
        tracing::debug!("run started with request {}", accepted.id);

        let mut signals = Signals::default();
        loop {
            let event = tokio::select! {
                biased;
                err = ctx.done() => {
                    self.abort_best_effort().await;
                    return Err(err);
                }
                event = events.recv() => event,
            };
            let Some(event) = event else {
                return Err(self
                    .shared
                    .terminal_error()
                    .unwrap_or_else(|| Error::protocol("event stream closed")));
            };

            match event.kind() {
                event_kind::AGENT_END => {
                    let end: AgentEndEvent = event.decode()?;
                    let outcome = TerminalOutcome::from_agent_end(&end)?;
                    return Ok(signals.finish(outcome));
                }
                event_kind::PROCESS_DIED => {
                    return Err(self.shared.registry.current_error().unwrap_or_else(|| {
                        let cause = event
                            .decode::<ProcessDiedEvent>()
                            .ok()
                            .and_then(|died| died.error);
                        Error::ProcessDied { cause }
                    }));
                }
                event_kind::RESPONSE => {
                    if let Some(err) = async_prompt_failure(&event, &accepted.id) {
                        return Err(err);
                    }
                }
                _ => signals.observe(&event),
            }
        }
    }

    /// Abort the running turn, ignoring the outcome.
    async fn abort_best_effort(&self) {
        if self.shared.terminal_error().is_some() {
            return;
        }
        let ctx = Context::with_timeout(self.shared.config.abort_timeout);
        if let Err(e) = self.abort(&ctx).await {
            tracing::debug!("abort after cancelled run failed: {}", e);
        }
    }
}

/// A failed `prompt` response for the run's own request id, delivered after
/// the prompt was first accepted.
fn async_prompt_failure(event: &Event, prompt_id: &str) -> Option<Error> {
    let response = Response::decode(event.payload()).ok()?;
    if response.id != prompt_id || response.command != command_kind::PROMPT || response.success {
        return None;
    }
    Some(response_error(&response))
}

/// Last compaction and retry events seen during a run.
#[derive(Default)]
struct Signals {
    compaction_start: Option<AutoCompactionStartEvent>,
    compaction_end: Option<AutoCompactionEndEvent>,
    retry_start: Option<AutoRetryStartEvent>,
    retry_end: Option<AutoRetryEndEvent>,
}

impl Signals {
    /// Record a recovery event. Undecodable payloads are skipped.
    fn observe(&mut self, event: &Event) {
        match event.kind() {
            event_kind::AUTO_COMPACTION_START => keep_last(&mut self.compaction_start, event),
            event_kind::AUTO_COMPACTION_END => keep_last(&mut self.compaction_end, event),
            event_kind::AUTO_RETRY_START => keep_last(&mut self.retry_start, event),
            event_kind::AUTO_RETRY_END => keep_last(&mut self.retry_end, event),
            _ => {}
        }
    }

    fn finish(self, outcome: TerminalOutcome) -> RunDetailedResult {
        let mut result = RunDetailedResult::new(outcome);
        result.auto_compaction_start = self.compaction_start;
        result.auto_compaction_end = self.compaction_end;
        result.auto_retry_start = self.retry_start;
        result.auto_retry_end = self.retry_end;
        result
    }
}

fn keep_last<T: EventPayload>(slot: &mut Option<T>, event: &Event) {
    match event.decode() {
        Ok(value) => *slot = Some(value),
        Err(e) => tracing::debug!("skipping malformed {} event: {}", event.kind(), e),
    }
}
