//! In-memory notification ledger and dispatcher

use crate::domain::TransitionKind;
use crate::error::{DispatchError, DispatchResult};
use crate::ports::outbound::{NotificationDispatcher, NotificationLedger};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::PostId;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Authoritative record of announced transitions.
#[derive(Default)]
pub struct InMemoryNotificationLedger {
    sent: RwLock<HashSet<(PostId, TransitionKind)>>,
    checks: AtomicUsize,
    next_failure: Mutex<Option<String>>,
}

impl InMemoryNotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `(post, kind)`. Returns `false` if it was already claimed.
    pub fn mark_sent(&self, post_id: PostId, kind: TransitionKind) -> bool {
        self.sent.write().insert((post_id, kind))
    }

    pub fn is_sent(&self, post_id: PostId, kind: TransitionKind) -> bool {
        self.sent.read().contains(&(post_id, kind))
    }

    /// Number of `is_transition_not_sent` calls served.
    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::Relaxed)
    }

    /// Make the next check fail.
    pub fn fail_next(&self, reason: &str) {
        *self.next_failure.lock() = Some(reason.to_string());
    }
}

#[async_trait]
impl NotificationLedger for InMemoryNotificationLedger {
    async fn is_transition_not_sent(
        &self,
        post_id: PostId,
        kind: TransitionKind,
    ) -> DispatchResult<bool> {
        self.checks.fetch_add(1, Ordering::Relaxed);
        let failure = self.next_failure.lock().take();
        if let Some(reason) = failure {
            return Err(DispatchError::LedgerUnavailable { reason });
        }
        Ok(!self.is_sent(post_id, kind))
    }
}

/// One fan-out call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchRecord {
    pub post_id: PostId,
    pub kind: TransitionKind,
    pub title: String,
    pub recipients: usize,
}

/// Dispatcher that records every fan-out.
///
/// With a ledger attached, a successful dispatch claims the transition there,
/// the way the real fan-out writes the records the ledger reads.
pub struct RecordingDispatcher {
    recipients: usize,
    ledger: Option<Arc<InMemoryNotificationLedger>>,
    dispatched: RwLock<Vec<DispatchRecord>>,
    delay: Mutex<Duration>,
    next_failure: Mutex<Option<String>>,
}

impl RecordingDispatcher {
    /// Each dispatch reaches `recipients` users.
    pub fn new(recipients: usize) -> Self {
        Self {
            recipients,
            ledger: None,
            dispatched: RwLock::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            next_failure: Mutex::new(None),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<InMemoryNotificationLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Simulated latency of every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Make the next dispatch fail.
    pub fn fail_next(&self, reason: &str) {
        *self.next_failure.lock() = Some(reason.to_string());
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched.read().len()
    }

    pub fn dispatched(&self) -> Vec<DispatchRecord> {
        self.dispatched.read().clone()
    }

    /// Kinds dispatched for a post, in dispatch order.
    pub fn dispatched_kinds(&self, post_id: PostId) -> Vec<TransitionKind> {
        self.dispatched
            .read()
            .iter()
            .filter(|record| record.post_id == post_id)
            .map(|record| record.kind)
            .collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn create_lifecycle_notifications(
        &self,
        post_id: PostId,
        kind: TransitionKind,
        title: &str,
    ) -> DispatchResult<usize> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = self.next_failure.lock().take();
        if let Some(reason) = failure {
            return Err(DispatchError::DispatchRejected { reason });
        }

        if let Some(ledger) = &self.ledger {
            if !ledger.mark_sent(post_id, kind) {
                return Ok(0);
            }
        }

        self.dispatched.write().push(DispatchRecord {
            post_id,
            kind,
            title: title.to_string(),
            recipients: self.recipients,
        });
        Ok(self.recipients)
    }
}
