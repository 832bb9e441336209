//! Event fan-out to subscribers.
//!
//! Every stdout line that is not a correlated response becomes an
//! [`Event`](crate::protocol::Event) and is published, in arrival order, to
//! every live [`Subscription`].
//!
//! # Backpressure
//!
//! Each subscriber chooses a [`SubscriptionPolicy`] at subscribe time:
//!
//! - [`SubscriptionMode::Drop`] discards new events when its inbox is full
//! - [`SubscriptionMode::Block`] suspends the publisher until there is room
//! - [`SubscriptionMode::Ring`] evicts the oldest buffered event
//!
//! A slow subscriber only ever slows down event dispatch. Responses are
//! correlated before events are published, so no subscriber can stall a
//! pending request.
//!
//! # Cancellation
//!
//! Dropping a [`Subscription`] cancels it. Buffered events may still be
//! delivered before the stream ends.

mod hub;
mod policy;
mod subscription;

pub use hub::Hub;
pub use policy::{SubscriptionMode, SubscriptionPolicy, DEFAULT_SUBSCRIPTION_BUFFER};
pub use subscription::{Subscription, SubscriptionCanceller};
