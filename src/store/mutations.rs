use chrono::Utc;
use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{first_active_conflict, validate_slot};
use super::{Ledger, LogOp, StoreError};

use std::sync::Arc;

impl Ledger {
    pub async fn register_venue(
        &self,
        id: Ulid,
        name: String,
        vendor: Vendor,
    ) -> Result<VenueInfo, StoreError> {
        if self.state.len() >= MAX_VENUES_PER_TENANT {
            return Err(StoreError::LimitExceeded("too many venues"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(StoreError::LimitExceeded("venue name too long"));
        }
        if vendor.name.len() > MAX_NAME_LEN {
            return Err(StoreError::LimitExceeded("vendor name too long"));
        }
        if self.state.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }

        let event = Event::VenueRegistered {
            id,
            name: name.clone(),
            vendor: vendor.clone(),
        };
        self.commit(&event).await?;
        let vs = VenueState::new(id, name, vendor);
        let info = vs.info();
        self.state.insert(id, Arc::new(RwLock::new(vs)));
        self.notify.publish(id, &event);
        Ok(info)
    }

    /// Soft delete: the venue and its reservations stay on the ledger, but
    /// every read path treats it as not found from here on. The venue's
    /// change feed delivers the retirement event and then closes.
    pub async fn retire_venue(&self, id: Ulid) -> Result<(), StoreError> {
        let vs = self.get_venue(&id).ok_or(StoreError::VenueNotFound(id))?;
        let mut guard = vs.write().await;
        if guard.retired {
            return Err(StoreError::VenueNotFound(id));
        }

        let event = Event::VenueRetired { id };
        self.commit_and_apply(id, &mut guard, &event).await?;
        self.notify.retire(&id);
        Ok(())
    }

    /// Admit a reservation. The overlap check runs under the venue's write
    /// lock, which stays held across the WAL append — two concurrent inserts
    /// for overlapping slots serialize here, and the loser gets `SlotTaken`.
    pub async fn insert_booking(&self, draft: NewReservation) -> Result<Reservation, StoreError> {
        validate_slot(&draft.slot)?;
        for field in [&draft.customer_name, &draft.customer_phone, &draft.customer_email] {
            if let Some(v) = field
                && v.len() > MAX_CONTACT_LEN
            {
                return Err(StoreError::LimitExceeded("customer field too long"));
            }
        }
        if let Some(ref n) = draft.notes
            && n.len() > MAX_NOTES_LEN
        {
            return Err(StoreError::LimitExceeded("notes too long"));
        }

        let vs = self
            .get_venue(&draft.venue_id)
            .ok_or(StoreError::VenueNotFound(draft.venue_id))?;
        let mut guard = vs.write().await;
        if guard.retired {
            return Err(StoreError::VenueNotFound(draft.venue_id));
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_VENUE {
            return Err(StoreError::LimitExceeded("too many reservations on venue"));
        }

        if let Some(existing) = first_active_conflict(&guard, &draft.slot) {
            return Err(StoreError::SlotTaken(existing));
        }

        let reservation = Reservation {
            id: Ulid::new(),
            venue_id: draft.venue_id,
            slot: draft.slot,
            duration_hours: draft.duration_hours,
            total_amount: draft.total_amount,
            status: draft.status,
            booking_type: draft.booking_type,
            customer_name: draft.customer_name,
            customer_phone: draft.customer_phone,
            customer_email: draft.customer_email,
            notes: draft.notes,
            created_at: Utc::now(),
        };

        let event = Event::BookingAdmitted {
            booking: reservation.clone(),
        };
        self.commit_and_apply(draft.venue_id, &mut guard, &event)
            .await?;
        Ok(reservation)
    }

    /// Flip a reservation to CANCELLED, freeing its slot. Idempotent:
    /// re-cancelling is a no-op success and writes no duplicate WAL event.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<Ulid, StoreError> {
        let venue_id = self
            .venue_for_booking(&id)
            .ok_or(StoreError::BookingNotFound(id))?;
        let vs = self
            .get_venue(&venue_id)
            .ok_or(StoreError::VenueNotFound(venue_id))?;
        let mut guard = vs.write().await;

        let already_cancelled = guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.status == BookingStatus::Cancelled)
            .ok_or(StoreError::BookingNotFound(id))?;
        if already_cancelled {
            return Ok(venue_id);
        }

        let event = Event::BookingCancelled { id, venue_id };
        self.commit_and_apply(venue_id, &mut guard, &event).await?;
        Ok(venue_id)
    }

    /// Rewrite the WAL down to the events needed to recreate current state.
    /// Venues are snapshotted one at a time under their read locks, so
    /// admissions on other venues proceed while the snapshot is collected.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let mut snapshot = Vec::new();

        let venue_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in venue_ids {
            let Some(vs) = self.get_venue(&id) else {
                continue;
            };
            let guard = vs.read().await;

            snapshot.push(Event::VenueRegistered {
                id: guard.id,
                name: guard.name.clone(),
                vendor: guard.vendor.clone(),
            });
            snapshot.extend(guard.reservations.iter().map(|r| Event::BookingAdmitted {
                booking: r.clone(),
            }));
            if guard.retired {
                snapshot.push(Event::VenueRetired { id: guard.id });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(LogOp::Rewrite { snapshot, done: tx })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(LogOp::AppendCount { reply: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
