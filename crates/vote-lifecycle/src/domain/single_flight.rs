//! Single-flight coalescing
//!
//! Collapses concurrent identical async operations into one shared
//! execution. The mechanism only: it knows nothing about notifications.
//!
//! ```text
//! caller A ──coalesce("k")──┐
//! caller B ──coalesce("k")──┼──→ [one execution of op] ──→ same result to A, B, C
//! caller C ──coalesce("k")──┘
//! ```
//!
//! The key is registered in the same critical section that checks for it,
//! and removed when the shared execution finishes (success, error, or the
//! execution being dropped), so a later call with the same key starts fresh.

use crate::metrics;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use tracing::debug;

/// How a caller took part in a coalesced execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlightRole {
    /// This caller started the execution.
    Leader,
    /// This caller joined an execution already in flight.
    Follower,
}

/// Result of a coalesced call together with the caller's role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coalesced<T> {
    pub value: T,
    pub role: FlightRole,
}

impl<T> Coalesced<T> {
    pub fn is_leader(&self) -> bool {
        self.role == FlightRole::Leader
    }
}

struct Flight<T: Clone> {
    generation: u64,
    future: Shared<BoxFuture<'static, T>>,
}

struct Flights<T: Clone> {
    next_generation: u64,
    entries: HashMap<String, Flight<T>>,
}

/// Removes its flight from the map when the execution ends.
struct FlightGuard<T: Clone> {
    flights: Weak<Mutex<Flights<T>>>,
    key: String,
    generation: u64,
}

impl<T: Clone> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        let Some(flights) = self.flights.upgrade() else {
            return;
        };
        let mut flights = flights.lock();
        // A newer flight may own the key by now
        let owned = flights
            .entries
            .get(&self.key)
            .is_some_and(|flight| flight.generation == self.generation);
        if owned {
            flights.entries.remove(&self.key);
            debug!(key = %self.key, "Flight completed");
        }
    }
}

/// Deduplicates concurrent operations by key.
///
/// Cloning yields another handle to the same in-flight map.
pub struct SingleFlight<T: Clone> {
    flights: Arc<Mutex<Flights<T>>>,
}

impl<T: Clone> Clone for SingleFlight<T> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(Flights {
                next_generation: 0,
                entries: HashMap::new(),
            })),
        }
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.flights.lock().entries.len()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.flights.lock().entries.contains_key(key)
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Run `op` under `key`, or share the pending result if `key` is in flight.
    pub async fn coalesce<F, Fut>(&self, key: &str, op: F) -> T
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.run(key, op).await.value
    }

    /// Like `coalesce`, but also reports whether this caller led the execution.
    pub async fn run<F, Fut>(&self, key: &str, op: F) -> Coalesced<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (future, role) = self.join_or_start(key, op);
        Coalesced {
            value: future.await,
            role,
        }
    }

    fn join_or_start<F, Fut>(&self, key: &str, op: F) -> (Shared<BoxFuture<'static, T>>, FlightRole)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut flights = self.flights.lock();

        if let Some(flight) = flights.entries.get(key) {
            debug!(key = %key, "Joining flight in progress");
            metrics::record_single_flight_join();
            return (flight.future.clone(), FlightRole::Follower);
        }

        let generation = flights.next_generation;
        flights.next_generation = flights.next_generation.wrapping_add(1);

        let guard = FlightGuard {
            flights: Arc::downgrade(&self.flights),
            key: key.to_string(),
            generation,
        };
        // `op` is not invoked until the first poll, outside this lock.
        let future = async move {
            let _guard = guard;
            op().await
        }
        .boxed()
        .shared();

        flights.entries.insert(
            key.to_string(),
            Flight {
                generation,
                future: future.clone(),
            },
        );
        debug!(key = %key, "Flight started");
        (future, FlightRole::Leader)
    }
}
