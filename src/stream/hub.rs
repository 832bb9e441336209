//! Fan-out of events to independent subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::policy::SubscriptionPolicy;
use super::subscription::{Subscriber, Subscription, SubscriptionCanceller};
use crate::protocol::Event;
use crate::{Error, Result};

/// Holds the live subscribers and delivers each published event to all of them.
///
/// The subscriber set is guarded by one lock that is held only to copy or
/// mutate the map, never while an event is being enqueued, so a full
/// block-mode inbox cannot stall `subscribe`, cancellation or shutdown.
///
/// Subscribing spawns a forwarding task and must happen inside a Tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct Hub {
    inner: Arc<HubInner>,
}

#[derive(Debug, Default)]
pub(crate) struct HubInner {
    state: Mutex<HubState>,
}

#[derive(Debug, Default)]
struct HubState {
    subscribers: HashMap<u64, Arc<Subscriber>>,
    next_id: u64,
    closed: bool,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn remove(&self, id: u64) {
        self.lock().subscribers.remove(&id);
    }
}

impl Hub {
    /// Create an open hub with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    ///
    /// Fails with [`Error::InvalidSubscriptionPolicy`] for a bad policy and
    /// with [`Error::ClientClosed`] once the hub is closed.
    pub fn subscribe(&self, policy: SubscriptionPolicy) -> Result<Subscription> {
        policy.validate()?;

        let subscriber = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(Error::ClientClosed);
            }
            state.next_id += 1;
            let subscriber = Arc::new(Subscriber::new(state.next_id, policy));
            state
                .subscribers
                .insert(subscriber.id, Arc::clone(&subscriber));
            subscriber
        };

        let (tx, rx) = mpsc::channel(policy.buffer);
        tokio::spawn(Arc::clone(&subscriber).forward(tx));

        let canceller = SubscriptionCanceller::new(subscriber, Arc::downgrade(&self.inner));
        Ok(Subscription::new(rx, canceller))
    }

    /// Deliver `event` to every live subscriber.
    ///
    /// Waits only on block-mode subscribers whose inbox is full.
    pub async fn publish(&self, event: &Event) {
        for subscriber in self.snapshot() {
            subscriber.enqueue(event).await;
        }
    }

    /// Deliver a final event, then close the hub and every stream.
    ///
    /// Each stream ends only after everything buffered for it, the final
    /// event included, has reached the caller.
    pub async fn process_died(&self, event: Event) {
        for subscriber in self.close_and_snapshot() {
            subscriber.enqueue_final(event.clone());
            subscriber.finish();
        }
    }

    /// Close the hub without publishing. Idempotent.
    pub fn close(&self) {
        for subscriber in self.close_and_snapshot() {
            subscriber.close();
        }
    }

    /// Whether the hub rejects new subscriptions.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.inner.lock().subscribers.values().cloned().collect()
    }

    fn close_and_snapshot(&self) -> Vec<Arc<Subscriber>> {
        let mut state = self.inner.lock();
        state.closed = true;
        state.subscribers.drain().map(|(_, s)| s).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::protocol::{event_kind, SubscriptionDropEvent};

    fn event(kind: &str) -> Event {
        Event::new(kind, format!(r#"{{"type":"{kind}"}}"#))
    }

    async fn drain(subscription: &mut Subscription) -> Vec<String> {
        let mut kinds = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(50), subscription.recv()).await
        {
            kinds.push(event.kind().to_string());
        }
        kinds
    }

    #[test]
    fn hub_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Hub>();
        assert_send_sync::<SubscriptionCanceller>();
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber_in_order() {
        let hub = Hub::new();
        let mut first = hub.subscribe(SubscriptionPolicy::default()).unwrap();
        let mut second = hub.subscribe(SubscriptionPolicy::block(4)).unwrap();

        for kind in ["e1", "e2", "e3"] {
            hub.publish(&event(kind)).await;
        }

        assert_eq!(drain(&mut first).await, ["e1", "e2", "e3"]);
        assert_eq!(drain(&mut second).await, ["e1", "e2", "e3"]);
    }

    #[tokio::test]
    async fn drop_policy_emits_diagnostic_instead_of_event() {
        let hub = Hub::new();
        let mut subscription = hub
            .subscribe(SubscriptionPolicy::drop(1).with_drop_event(true))
            .unwrap();

        hub.publish(&event("e1")).await;
        hub.publish(&event("e2")).await;

        let mut saw_drop = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(50), subscription.recv()).await
        {
            assert_ne!(event.kind(), "e2");
            if event.is(event_kind::SUBSCRIPTION_DROP) {
                let notice: SubscriptionDropEvent = event.decode().unwrap();
                assert_eq!(notice.mode, "drop");
                assert_eq!(notice.dropped_type, "e2");
                saw_drop = true;
            }
        }
        assert!(saw_drop, "expected a subscription_drop event");
    }

    #[tokio::test]
    async fn drop_policy_without_diagnostic_is_silent() {
        let hub = Hub::new();
        let mut subscription = hub.subscribe(SubscriptionPolicy::drop(1)).unwrap();

        hub.publish(&event("e1")).await;
        hub.publish(&event("e2")).await;

        assert_eq!(drain(&mut subscription).await, ["e1"]);
    }

    #[tokio::test]
    async fn ring_policy_keeps_newest() {
        let hub = Hub::new();
        let mut subscription = hub.subscribe(SubscriptionPolicy::ring(1)).unwrap();

        for kind in ["e1", "e2", "e3"] {
            hub.publish(&event(kind)).await;
        }

        assert_eq!(drain(&mut subscription).await, ["e3"]);
    }

    #[tokio::test]
    async fn block_policy_preserves_everything_with_slow_consumer() {
        let hub = Hub::new();
        let mut subscription = hub.subscribe(SubscriptionPolicy::block(1)).unwrap();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for kind in ["e1", "e2", "e3", "e4", "e5"] {
                    hub.publish(&event(kind)).await;
                }
            })
        };

        let mut kinds = Vec::new();
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            kinds.push(subscription.recv().await.unwrap().kind().to_string());
        }
        publisher.await.unwrap();
        assert_eq!(kinds, ["e1", "e2", "e3", "e4", "e5"]);
    }

    #[tokio::test]
    async fn close_unblocks_blocked_publisher() {
        let hub = Hub::new();
        let _subscription = hub.subscribe(SubscriptionPolicy::block(1)).unwrap();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for i in 0..10 {
                    hub.publish(&event(&format!("e{i}"))).await;
                }
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!publisher.is_finished());

        hub.close();
        tokio::time::timeout(Duration::from_secs(1), publisher)
            .await
            .expect("publisher should be released by close")
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_ends_stream_and_detaches() {
        let hub = Hub::new();
        let mut subscription = hub.subscribe(SubscriptionPolicy::default()).unwrap();
        assert_eq!(hub.subscriber_count(), 1);

        hub.publish(&event("e1")).await;
        subscription.cancel();
        subscription.cancel();
        assert_eq!(hub.subscriber_count(), 0);

        hub.publish(&event("e2")).await;
        let remaining: Vec<_> = subscription.map(|e| e.kind().to_string()).collect().await;
        assert_eq!(remaining, ["e1"]);
    }

    #[tokio::test]
    async fn process_died_delivers_then_closes() {
        let hub = Hub::new();
        let mut subscription = hub.subscribe(SubscriptionPolicy::block(1)).unwrap();

        hub.publish(&event("e1")).await;
        hub.process_died(Event::process_died(None)).await;

        assert!(hub.is_closed());
        assert!(matches!(
            hub.subscribe(SubscriptionPolicy::default()),
            Err(Error::ClientClosed)
        ));

        assert_eq!(subscription.recv().await.unwrap().kind(), "e1");
        assert_eq!(
            subscription.recv().await.unwrap().kind(),
            event_kind::PROCESS_DIED
        );
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn process_died_waits_for_slow_block_consumer() {
        let hub = Hub::new();
        let mut subscription = hub.subscribe(SubscriptionPolicy::block(1)).unwrap();

        for kind in ["e1", "e2"] {
            hub.publish(&event(kind)).await;
        }
        hub.process_died(Event::process_died(Some("exit status: 1"))).await;
        // Give the forwarder time to fill the outbox before anything is read.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut kinds = Vec::new();
        while let Some(event) = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
            .await
            .unwrap()
        {
            kinds.push(event.kind().to_string());
        }
        assert_eq!(kinds, ["e1", "e2", event_kind::PROCESS_DIED]);
    }

    #[tokio::test]
    async fn cancel_after_process_died_ends_stream() {
        let hub = Hub::new();
        let mut subscription = hub.subscribe(SubscriptionPolicy::block(1)).unwrap();

        for kind in ["e1", "e2", "e3"] {
            hub.publish(&event(kind)).await;
        }
        hub.process_died(Event::process_died(None)).await;
        subscription.cancel();

        let ended = tokio::time::timeout(Duration::from_secs(1), async {
            while subscription.recv().await.is_some() {}
        })
        .await;
        assert!(ended.is_ok(), "stream should end after cancel");
    }

    #[tokio::test]
    async fn invalid_policy_rejected() {
        let hub = Hub::new();
        assert!(matches!(
            hub.subscribe(SubscriptionPolicy::block(0)),
            Err(Error::InvalidSubscriptionPolicy(_))
        ));
    }
}
