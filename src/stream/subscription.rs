//! A single subscriber: policy-governed inbox, forwarding task and the
//! caller-facing [`Subscription`] stream.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::hub::HubInner;
use super::policy::{SubscriptionMode, SubscriptionPolicy};
use crate::protocol::{event_kind, Event};
use crate::runtime::{PushError, Queue};

/// Hub-side state of one subscriber.
#[derive(Debug)]
pub(crate) struct Subscriber {
    pub(crate) id: u64,
    policy: SubscriptionPolicy,
    inbox: Queue<Event>,
    done: CancellationToken,
}

impl Subscriber {
    pub(crate) fn new(id: u64, policy: SubscriptionPolicy) -> Self {
        Self {
            id,
            policy,
            inbox: Queue::bounded(policy.buffer),
            done: CancellationToken::new(),
        }
    }

    /// Offer one event according to the subscriber's policy.
    ///
    /// Only [`SubscriptionMode::Block`] ever waits, and only until there is
    /// room or the subscriber is closed.
    pub(crate) async fn enqueue(&self, event: &Event) {
        let dropped = match self.policy.mode {
            SubscriptionMode::Drop => match self.inbox.try_push(event.clone()) {
                Err(PushError::Full(lost)) => Some(lost),
                _ => None,
            },
            SubscriptionMode::Ring => self.inbox.push_evicting(event.clone()).ok().flatten(),
            SubscriptionMode::Block => {
                self.inbox.push_wait(event.clone()).await;
                None
            }
        };

        if let Some(lost) = dropped {
            tracing::debug!(
                "subscriber {} ({} mode) dropped {} event",
                self.id,
                self.policy.mode,
                lost.kind()
            );
            self.emit_drop_event(&lost);
        }
    }

    fn emit_drop_event(&self, lost: &Event) {
        if !self.policy.emit_drop_event
            || lost.kind().is_empty()
            || lost.is(event_kind::SUBSCRIPTION_DROP)
        {
            return;
        }
        let notice = Event::subscription_drop(self.policy.mode.as_str(), lost.kind());
        // Best effort: the notice itself evicts the oldest entry.
        let _ = self.inbox.push_evicting(notice);
    }

    /// Queue the last event this subscriber will ever see.
    ///
    /// Ignores capacity, so it neither blocks nor evicts.
    pub(crate) fn enqueue_final(&self, event: Event) {
        self.inbox.push(event);
    }

    /// Stop accepting events and let the forwarder drain.
    pub(crate) fn close(&self) {
        self.inbox.close();
        self.done.cancel();
    }

    /// Stop accepting events but keep forwarding until the inbox is empty.
    ///
    /// Unlike [`close`](Self::close), nothing buffered is discarded: the
    /// forwarder waits for outbox room as usual and only gives up when the
    /// caller drops or cancels the subscription.
    pub(crate) fn finish(&self) {
        self.inbox.close();
    }

    /// Move events from the inbox to the outbox in order.
    ///
    /// After [`close`](Self::close), whatever is still buffered is handed
    /// over while the outbox has room. After [`finish`](Self::finish),
    /// everything is handed over. Then the outbox sender drops and the
    /// stream ends.
    pub(crate) async fn forward(self: Arc<Self>, outbox: mpsc::Sender<Event>) {
        while let Some(event) = self.inbox.pop().await {
            let permit = tokio::select! {
                biased;
                permit = outbox.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = self.done.cancelled() => {
                    self.drain(&outbox, event);
                    return;
                }
            };
            permit.send(event);
        }
        tracing::debug!("subscriber {} forwarder finished", self.id);
    }

    fn drain(&self, outbox: &mpsc::Sender<Event>, pending: Event) {
        if outbox.try_send(pending).is_err() {
            return;
        }
        while let Some(event) = self.inbox.try_pop() {
            if outbox.try_send(event).is_err() {
                return;
            }
        }
    }
}

/// Cancels one subscription. Cheap to clone; cancelling twice is a no-op.
#[derive(Debug, Clone)]
pub struct SubscriptionCanceller {
    subscriber: Arc<Subscriber>,
    hub: Weak<HubInner>,
}

impl SubscriptionCanceller {
    pub(crate) fn new(subscriber: Arc<Subscriber>, hub: Weak<HubInner>) -> Self {
        Self { subscriber, hub }
    }

    /// Detach from the hub and stop delivery.
    ///
    /// Events already buffered are still forwarded on a best-effort basis,
    /// then the stream ends.
    pub fn cancel(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.subscriber.id);
        }
        self.subscriber.close();
    }
}

/// An ordered stream of events for one subscriber.
///
/// Implements [`futures::Stream`]. The stream ends after the subscription is
/// cancelled, the hub closes, or the process dies (after delivering the
/// `process_died` event).
///
/// # Cancellation
///
/// Dropping a `Subscription` cancels it.
///
/// ```ignore
/// use futures::StreamExt;
///
/// let mut events = client.subscribe(SubscriptionPolicy::ring(64))?;
/// while let Some(event) = events.next().await {
///     println!("{}", event.kind());
/// }
/// ```
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<Event>,
    canceller: SubscriptionCanceller,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::Receiver<Event>, canceller: SubscriptionCanceller) -> Self {
        Self { rx, canceller }
    }

    /// Receive the next event, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Cancel this subscription. Idempotent.
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// A handle that can cancel this subscription from elsewhere.
    pub fn canceller(&self) -> SubscriptionCanceller {
        self.canceller.clone()
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.canceller.cancel();
    }
}
