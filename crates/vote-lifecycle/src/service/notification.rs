//! Notification dedup engine
//!
//! Announces lifecycle transitions at most once per process, and as close
//! to once globally as the authoritative ledger allows.
//!
//! ## Guard Order
//!
//! | Step | Check | Network |
//! |------|-------|---------|
//! | 1 | session set has `post:kind` | no |
//! | 2 | phase matches the transition | no |
//! | 3 | post older than the grace window (deadline-ended only) | no |
//! | 4 | coalesce concurrent callers by `post:kind` | no |
//! | 5 | ledger reports not sent | yes |
//! | 6 | dispatch | yes |
//!
//! Errors in steps 5 and 6 are logged and reported as `false`; they never
//! touch the session set, so a later call can retry.
//!
//! Every caller joined to one execution receives its outcome. The first to
//! observe it reports it; that is usually the caller who started it, but if
//! that caller was dropped mid-flight a joined caller reports instead.

use crate::domain::{
    DispatchOutcome, OperationKey, PhaseClassifier, SingleFlight, TransitionKind,
};
use crate::metrics;
use crate::ports::outbound::{NotificationDispatcher, NotificationLedger, TimeSource};
use parking_lot::RwLock;
use shared_types::{PostId, Timestamp};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keys confirmed sent during this process's lifetime.
type SessionSet = Arc<RwLock<HashSet<OperationKey>>>;

/// Outcome of one coalesced check, shared by every joined caller.
#[derive(Clone, Debug)]
struct Announcement {
    outcome: DispatchOutcome,
    reported: Arc<AtomicBool>,
}

impl Announcement {
    fn new(outcome: DispatchOutcome) -> Self {
        Self {
            outcome,
            reported: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `true` for exactly one caller: the first to ask.
    fn claim(&self) -> bool {
        !self.reported.swap(true, Ordering::AcqRel)
    }
}

/// Lifecycle notification service.
pub struct NotificationService<L, D>
where
    L: NotificationLedger,
    D: NotificationDispatcher,
{
    ledger: Arc<L>,
    dispatcher: Arc<D>,
    clock: Arc<dyn TimeSource>,
    classifier: PhaseClassifier,
    expiry_grace_ms: u64,
    flights: SingleFlight<Announcement>,
    confirmed_sent: SessionSet,
}

impl<L, D> NotificationService<L, D>
where
    L: NotificationLedger + 'static,
    D: NotificationDispatcher + 'static,
{
    pub fn new(
        ledger: Arc<L>,
        dispatcher: Arc<D>,
        clock: Arc<dyn TimeSource>,
        classifier: PhaseClassifier,
        expiry_grace_ms: u64,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            clock,
            classifier,
            expiry_grace_ms,
            flights: SingleFlight::new(),
            confirmed_sent: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub async fn check_and_notify_persuasion_started(
        &self,
        post_id: PostId,
        title: &str,
        vote_deadline: Option<Timestamp>,
    ) -> bool {
        self.check_and_notify(
            post_id,
            TransitionKind::PersuasionStarted,
            title,
            vote_deadline,
            None,
        )
        .await
    }

    pub async fn check_and_notify_deadline_ended(
        &self,
        post_id: PostId,
        title: &str,
        vote_deadline: Option<Timestamp>,
        created_at: Option<Timestamp>,
    ) -> bool {
        self.check_and_notify(
            post_id,
            TransitionKind::DeadlineEnded,
            title,
            vote_deadline,
            created_at,
        )
        .await
    }

    /// Whether `post:kind` is in the session set.
    pub fn is_confirmed_sent(&self, post_id: PostId, kind: TransitionKind) -> bool {
        self.confirmed_sent
            .read()
            .contains(&OperationKey::new(post_id, kind))
    }

    pub fn confirmed_sent_count(&self) -> usize {
        self.confirmed_sent.read().len()
    }

    /// Checks currently executing.
    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }

    /// Returns `true` iff this call is the one reporting a dispatch.
    async fn check_and_notify(
        &self,
        post_id: PostId,
        kind: TransitionKind,
        title: &str,
        vote_deadline: Option<Timestamp>,
        created_at: Option<Timestamp>,
    ) -> bool {
        let key = OperationKey::new(post_id, kind);

        if self.confirmed_sent.read().contains(&key) {
            debug!(key = %key, "Already sent this session");
            metrics::record_notification(kind.as_str(), "suppressed");
            return false;
        }

        let now = self.clock.now();
        let phase = self.classifier.classify(vote_deadline, now);
        if phase != kind.required_phase() {
            return false;
        }

        if kind == TransitionKind::DeadlineEnded && self.within_grace(created_at, now) {
            debug!(key = %key, "Post too new for deadline notification");
            metrics::record_notification(kind.as_str(), "suppressed");
            return false;
        }

        let ledger = Arc::clone(&self.ledger);
        let dispatcher = Arc::clone(&self.dispatcher);
        let confirmed_sent = Arc::clone(&self.confirmed_sent);
        let flight_key = key.clone();
        let title = title.to_string();

        let coalesced = self
            .flights
            .run(key.as_str(), move || async move {
                let outcome = announce(
                    ledger.as_ref(),
                    dispatcher.as_ref(),
                    &confirmed_sent,
                    flight_key,
                    post_id,
                    kind,
                    &title,
                )
                .await;
                Announcement::new(outcome)
            })
            .await;

        let announcement = &coalesced.value;
        if !announcement.claim() {
            debug!(
                key = %key,
                role = ?coalesced.role,
                outcome = announcement.outcome.label(),
                "Joined in-flight check"
            );
            return false;
        }

        metrics::record_notification(kind.as_str(), announcement.outcome.label());
        match &announcement.outcome {
            DispatchOutcome::Dispatched { recipients } => {
                info!(key = %key, recipients, "Lifecycle notification dispatched");
                true
            }
            DispatchOutcome::AlreadySent => {
                debug!(key = %key, "Ledger reports already sent");
                false
            }
            DispatchOutcome::Failed { reason } => {
                warn!(key = %key, reason = %reason, "Lifecycle notification failed");
                false
            }
        }
    }

    /// A creation time later than `now` counts as within the window.
    fn within_grace(&self, created_at: Option<Timestamp>, now: Timestamp) -> bool {
        created_at.is_some_and(|created| now.saturating_sub(created) < self.expiry_grace_ms)
    }
}

/// The coalesced body: ledger check, then dispatch.
async fn announce<L, D>(
    ledger: &L,
    dispatcher: &D,
    confirmed_sent: &RwLock<HashSet<OperationKey>>,
    key: OperationKey,
    post_id: PostId,
    kind: TransitionKind,
    title: &str,
) -> DispatchOutcome
where
    L: NotificationLedger + ?Sized,
    D: NotificationDispatcher + ?Sized,
{
    // A previous flight may have finished between the fast path and here
    if confirmed_sent.read().contains(&key) {
        return DispatchOutcome::AlreadySent;
    }

    match ledger.is_transition_not_sent(post_id, kind).await {
        Ok(true) => {}
        Ok(false) => {
            confirmed_sent.write().insert(key);
            return DispatchOutcome::AlreadySent;
        }
        Err(err) => {
            return DispatchOutcome::Failed {
                reason: err.to_string(),
            }
        }
    }

    match dispatcher
        .create_lifecycle_notifications(post_id, kind, title)
        .await
    {
        Ok(recipients) => {
            confirmed_sent.write().insert(key);
            DispatchOutcome::Dispatched { recipients }
        }
        Err(err) => DispatchOutcome::Failed {
            reason: err.to_string(),
        },
    }
}
