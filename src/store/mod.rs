mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use error::StoreError;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedVenueState = Arc<RwLock<VenueState>>;

/// Storage abstraction the admission pipeline runs against — exactly the
/// operations conflict checking and insertion need. Injected as a trait
/// object so tests can substitute a fake store.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Returns None if the venue does not exist or has been retired.
    async fn find_venue(&self, venue_id: Ulid) -> Result<Option<VenueInfo>, StoreError>;

    /// Active (non-cancelled) reservations overlapping the slot. Consistent
    /// with `insert` on the same venue under concurrency.
    async fn find_overlapping(
        &self,
        venue_id: Ulid,
        slot: TimeSlot,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Persist a new reservation. Fails with `SlotTaken` when a concurrent
    /// insert claimed an overlapping slot after the caller's conflict check.
    async fn insert(&self, draft: NewReservation) -> Result<Reservation, StoreError>;
}

// ── WAL writer task ──────────────────────────────────────────────

pub(super) enum LogOp {
    Commit {
        event: Event,
        done: oneshot::Sender<io::Result<()>>,
    },
    Rewrite {
        snapshot: Vec<Event>,
        done: oneshot::Sender<io::Result<()>>,
    },
    AppendCount {
        reply: oneshot::Sender<u64>,
    },
}

const LOG_BATCH: usize = 64;

/// Dedicated task owning the WAL. Ops arrive over an mpsc channel;
/// consecutive commits stage together and settle with a single fsync, so
/// under load the fsync cost is shared across every admission in the batch.
async fn log_writer(mut wal: Wal, mut rx: mpsc::Receiver<LogOp>) {
    let mut inbox = Vec::with_capacity(LOG_BATCH);
    loop {
        inbox.clear();
        if rx.recv_many(&mut inbox, LOG_BATCH).await == 0 {
            return; // ledger dropped
        }
        let mut batch: Vec<oneshot::Sender<io::Result<()>>> = Vec::new();
        let mut poisoned: Option<io::Error> = None;
        for op in inbox.drain(..) {
            match op {
                LogOp::Commit { event, done } => {
                    if poisoned.is_none()
                        && let Err(e) = wal.stage(&event)
                    {
                        poisoned = Some(e);
                    }
                    batch.push(done);
                }
                other => {
                    settle(&mut wal, &mut batch, poisoned.take());
                    maintain(&mut wal, other);
                }
            }
        }
        settle(&mut wal, &mut batch, poisoned.take());
    }
}

/// Sync staged commits and answer every waiter in the batch. A staging
/// failure poisons the whole batch: the buffer may hold a torn frame, so
/// none of its commits can be acknowledged. The sync still runs, keeping
/// leftover buffered bytes out of the next batch.
fn settle(
    wal: &mut Wal,
    batch: &mut Vec<oneshot::Sender<io::Result<()>>>,
    poisoned: Option<io::Error>,
) {
    if batch.is_empty() {
        return;
    }
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let synced = wal.sync();
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    let verdict = match (poisoned, synced) {
        (Some(e), _) | (None, Err(e)) => Err(e),
        (None, Ok(())) => Ok(()),
    };
    for done in batch.drain(..) {
        let _ = done.send(match &verdict {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        });
    }
}

fn maintain(wal: &mut Wal, op: LogOp) {
    match op {
        LogOp::Rewrite { snapshot, done } => {
            let result =
                Wal::write_snapshot(wal.path(), &snapshot).and_then(|()| wal.install_snapshot());
            let _ = done.send(result);
        }
        LogOp::AppendCount { reply } => {
            let _ = reply.send(wal.appends_since_compact());
        }
        LogOp::Commit { .. } => unreachable!("commits settle in the batch loop"),
    }
}

// ── Ledger ───────────────────────────────────────────────────────

/// The per-tenant booking ledger: in-memory venue states, durably backed by
/// an append-only WAL. Each venue's state sits behind its own `RwLock`, so
/// venues admit independently; the insert path holds a venue's write lock
/// across the conflict re-check and the WAL append, which is what closes the
/// check-then-insert race.
#[derive(Debug)]
pub struct Ledger {
    state: DashMap<Ulid, SharedVenueState>,
    wal_tx: mpsc::Sender<LogOp>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → venue id
    booking_to_venue: DashMap<Ulid, Ulid>,
}

/// Apply an event to a venue's state. The caller holds the venue lock (or,
/// during replay, exclusive ownership of the whole map).
fn apply_to_venue(vs: &mut VenueState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BookingAdmitted { booking } => {
            vs.insert_reservation(booking.clone());
            index.insert(booking.id, booking.venue_id);
        }
        Event::BookingCancelled { id, .. } => {
            vs.mark_cancelled(*id);
        }
        Event::VenueRetired { .. } => {
            vs.retired = true;
        }
        // VenueRegistered creates the state; nothing to apply here.
        Event::VenueRegistered { .. } => {}
    }
}

impl Ledger {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        // Rebuild state from the log before any lock exists: plain values
        // first, wrapped and published only once replay is done.
        let mut venues: HashMap<Ulid, VenueState> = HashMap::new();
        let index = DashMap::new();
        for event in Wal::replay(&wal_path)? {
            match event {
                Event::VenueRegistered { id, name, vendor } => {
                    venues.insert(id, VenueState::new(id, name, vendor));
                }
                other => {
                    if let Some(vs) = venues.get_mut(&other.venue_id()) {
                        apply_to_venue(vs, &other, &index);
                    }
                }
            }
        }

        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(log_writer(wal, wal_rx));

        let state = DashMap::new();
        for (id, vs) in venues {
            state.insert(id, Arc::new(RwLock::new(vs)));
        }
        Ok(Self {
            state,
            wal_tx,
            notify,
            booking_to_venue: index,
        })
    }

    /// Durably commit one event through the writer task.
    async fn commit(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(LogOp::Commit {
                event: event.clone(),
                done: tx,
            })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    pub fn get_venue(&self, id: &Ulid) -> Option<SharedVenueState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn venue_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_venue.get(booking_id).map(|e| *e.value())
    }

    /// Commit, apply to the locked state, then publish to the change feed.
    /// On commit failure the in-memory state is untouched.
    pub(super) async fn commit_and_apply(
        &self,
        venue_id: Ulid,
        vs: &mut VenueState,
        event: &Event,
    ) -> Result<(), StoreError> {
        self.commit(event).await?;
        apply_to_venue(vs, event, &self.booking_to_venue);
        self.notify.publish(venue_id, event);
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for Ledger {
    async fn find_venue(&self, venue_id: Ulid) -> Result<Option<VenueInfo>, StoreError> {
        Ok(self.find_venue_info(&venue_id).await)
    }

    async fn find_overlapping(
        &self,
        venue_id: Ulid,
        slot: TimeSlot,
    ) -> Result<Vec<Reservation>, StoreError> {
        self.active_in_window(venue_id, slot).await
    }

    async fn insert(&self, draft: NewReservation) -> Result<Reservation, StoreError> {
        self.insert_booking(draft).await
    }
}
