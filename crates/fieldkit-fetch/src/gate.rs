//! Single-flight coordination.
//!
//! At most one flight is open per gate. The first caller to [`claim`] becomes
//! the owner and does the work; everyone who claims while that flight is open
//! gets a [`SharedOutcome`] that resolves to the owner's published value.
//!
//! [`claim`]: SingleFlightGate::claim

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

struct Flight<T> {
    id: u64,
    tx: watch::Sender<Option<T>>,
}

/// The owner went away without publishing an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

impl fmt::Display for Abandoned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("in-flight operation was abandoned by its owner")
    }
}

impl std::error::Error for Abandoned {}

pub struct SingleFlightGate<T> {
    slot: Mutex<Option<Arc<Flight<T>>>>,
    next_id: AtomicU64,
}

/// Result of [`SingleFlightGate::claim`].
pub enum Claim<'a, T: Clone> {
    /// This caller opened the flight and must finish it.
    Owner(OwnerHandle<'a, T>),
    /// A flight is already open; wait for its outcome.
    InFlight(SharedOutcome<T>),
}

impl<T: Clone> Default for SingleFlightGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SingleFlightGate<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens a flight, or joins the one already open.
    ///
    /// Installing the flight and checking for an existing one happen under
    /// the same lock, so two concurrent claimers can never both own.
    pub fn claim(&self) -> Claim<'_, T> {
        let mut slot = self.slot.lock();

        if let Some(flight) = slot.as_ref() {
            return Claim::InFlight(SharedOutcome {
                flight_id: flight.id,
                rx: flight.tx.subscribe(),
            });
        }

        let (tx, _) = watch::channel(None);
        let flight = Arc::new(Flight {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            tx,
        });
        *slot = Some(Arc::clone(&flight));
        tracing::trace!(flight = flight.id, "opened flight");

        Claim::Owner(OwnerHandle {
            gate: self,
            flight,
            finished: false,
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Forgets the open flight, if any. The next claim opens a new one.
    ///
    /// Waiters of the forgotten flight still receive its outcome; the old
    /// owner's eventual release leaves the new slot untouched.
    pub fn reset(&self) {
        if let Some(flight) = self.slot.lock().take() {
            tracing::debug!(flight = flight.id, "flight forgotten by reset");
        }
    }

    /// Clears the slot only if it still holds `flight`.
    fn release(&self, flight: &Arc<Flight<T>>) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, flight)) {
            *slot = None;
        }
    }
}

/// Exclusive right to finish a flight.
///
/// Dropping the handle without calling [`complete`](Self::complete) closes
/// the flight; its waiters then observe [`Abandoned`].
pub struct OwnerHandle<'a, T: Clone> {
    gate: &'a SingleFlightGate<T>,
    flight: Arc<Flight<T>>,
    finished: bool,
}

impl<T: Clone> OwnerHandle<'_, T> {
    /// Identifier of this flight, unique per gate.
    pub fn id(&self) -> u64 {
        self.flight.id
    }

    /// Publishes `outcome` to every waiter and closes the flight.
    pub fn complete(mut self, outcome: T) {
        // Close first so late claimers start over instead of joining a
        // finished flight; current waiters already hold a receiver.
        self.gate.release(&self.flight);
        self.flight.tx.send_replace(Some(outcome));
        self.finished = true;
    }
}

impl<T: Clone> Drop for OwnerHandle<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(flight = self.flight.id, "owner dropped without an outcome");
            self.gate.release(&self.flight);
        }
    }
}

/// A waiter's view of someone else's flight.
pub struct SharedOutcome<T> {
    flight_id: u64,
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> SharedOutcome<T> {
    pub fn flight_id(&self) -> u64 {
        self.flight_id
    }

    /// Waits for the owner's outcome.
    pub async fn wait(mut self) -> Result<T, Abandoned> {
        let published = self
            .rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|value| value.clone());

        published
            .or_else(|| self.rx.borrow().clone())
            .ok_or(Abandoned)
    }
}
