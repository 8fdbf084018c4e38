//! # Change Subscriber
//!
//! Defines the subscription side of the change feed.

use crate::events::{ChangeEvent, ChangeFilter};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The change feed was closed.
    #[error("Change feed closed")]
    Closed,
}

/// What a subscription yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A change matching the subscription's filter.
    Change(ChangeEvent),
    /// This many changes were dropped before the subscriber read them.
    /// Which ones is unknown, so they may have matched the filter.
    Lagged(u64),
}

/// Trait for subscribing to changes from the feed.
pub trait ChangeSubscriber: Send + Sync {
    /// Subscribe to changes matching a filter.
    ///
    /// Dropping the returned handle unsubscribes.
    fn subscribe(&self, filter: ChangeFilter) -> Subscription;
}

/// Decrements the per-scope subscription count when dropped.
struct SubscriptionToken {
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    key: String,
}

impl Drop for SubscriptionToken {
    fn drop(&mut self) {
        let Ok(mut subs) = self.subscriptions.write() else {
            return;
        };
        let Some(count) = subs.get_mut(&self.key) else {
            debug!(scope = %self.key, "Subscription dropped");
            return;
        };

        *count = count.saturating_sub(1);
        if *count == 0 {
            subs.remove(&self.key);
        }
        debug!(scope = %self.key, "Subscription dropped");
    }
}

/// A subscription handle for receiving changes.
///
/// When dropped, the subscription is automatically cleaned up.
pub struct Subscription {
    /// The broadcast receiver.
    receiver: broadcast::Receiver<ChangeEvent>,

    /// Filter for this subscription.
    filter: ChangeFilter,

    token: SubscriptionToken,
}

impl Subscription {
    /// Create a new subscription.
    pub(crate) fn new(
        receiver: broadcast::Receiver<ChangeEvent>,
        filter: ChangeFilter,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
        key: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            token: SubscriptionToken { subscriptions, key },
        }
    }

    /// Receive the next change that matches the filter.
    ///
    /// # Returns
    ///
    /// - `Some(Received::Change(event))` - The next matching change
    /// - `Some(Received::Lagged(n))` - `n` changes were lost to overflow
    /// - `None` - The channel was closed (feed dropped)
    pub async fn recv(&mut self) -> Option<Received> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some changes dropped");
                    return Some(Received::Lagged(count));
                }
            };

            if self.filter.matches(&event) {
                return Some(Received::Change(event));
            }
        }
    }

    /// Try to receive the next change without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(received))` - A matching change, or a lag report
    /// - `Ok(None)` - No change available (would block)
    /// - `Err(SubscriptionError::Closed)` - The channel was closed
    pub fn try_recv(&mut self) -> Result<Option<Received>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    return Ok(Some(Received::Lagged(count)))
                }
            };

            if self.filter.matches(&event) {
                return Ok(Some(Received::Change(event)));
            }
        }
    }

    /// Get the filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    /// Stop receiving changes.
    pub fn unsubscribe(self) {
        debug!(scope = %self.token.key, "Unsubscribe requested");
    }

    /// Convert into a `Stream` of matching changes.
    #[must_use]
    pub fn into_stream(self) -> ChangeStream {
        ChangeStream::new(self)
    }
}

/// A stream wrapper for subscriptions.
///
/// Implements `tokio_stream::Stream` for use with stream combinators.
/// A lagged receiver yields `Received::Lagged` and keeps going.
pub struct ChangeStream {
    inner: Pin<Box<BroadcastStream<ChangeEvent>>>,
    filter: ChangeFilter,
    _token: SubscriptionToken,
}

impl ChangeStream {
    /// Create a new change stream from a subscription.
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        let Subscription {
            receiver,
            filter,
            token,
        } = subscription;
        Self {
            inner: Box::pin(BroadcastStream::new(receiver)),
            filter,
            _token: token,
        }
    }

    /// Get the filter for this stream.
    #[must_use]
    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }
}

impl Stream for ChangeStream {
    type Item = Received;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if this.filter.matches(&event) {
                        return Poll::Ready(Some(Received::Change(event)));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    debug!(lagged = count, "Stream lagged, some changes dropped");
                    return Poll::Ready(Some(Received::Lagged(count)));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
