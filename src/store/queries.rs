use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{merge_overlapping, subtract_windows};
use super::{Ledger, StoreError};

impl Ledger {
    /// VenueInfo for a live venue; None for unknown or retired.
    pub async fn find_venue_info(&self, id: &Ulid) -> Option<VenueInfo> {
        let vs = self.get_venue(id)?;
        let guard = vs.read().await;
        if guard.retired { None } else { Some(guard.info()) }
    }

    /// Active reservations overlapping the window. Missing or retired venues
    /// yield an empty list (the admission pipeline resolves the venue first).
    pub(super) async fn active_in_window(
        &self,
        venue_id: Ulid,
        slot: TimeSlot,
    ) -> Result<Vec<Reservation>, StoreError> {
        let vs = match self.get_venue(&venue_id) {
            Some(vs) => vs,
            None => return Ok(vec![]),
        };
        let guard = vs.read().await;
        if guard.retired {
            return Ok(vec![]);
        }
        Ok(guard.active_overlapping(&slot).cloned().collect())
    }

    /// All reservations for a live venue, any status.
    pub async fn list_reservations(
        &self,
        venue_id: Ulid,
    ) -> Result<(VenueInfo, Vec<Reservation>), StoreError> {
        let vs = self
            .get_venue(&venue_id)
            .ok_or(StoreError::VenueNotFound(venue_id))?;
        let guard = vs.read().await;
        if guard.retired {
            return Err(StoreError::VenueNotFound(venue_id));
        }
        Ok((guard.info(), guard.reservations.clone()))
    }

    /// Free sub-windows of `window`: the window minus the union of active
    /// reservation slots, optionally dropping stretches shorter than
    /// `min_duration`.
    pub async fn free_windows(
        &self,
        venue_id: Ulid,
        window: TimeSlot,
        min_duration: Option<chrono::Duration>,
    ) -> Result<Vec<TimeSlot>, StoreError> {
        if window.duration().num_hours() > MAX_QUERY_WINDOW_HOURS {
            return Err(StoreError::LimitExceeded("query window too wide"));
        }
        let vs = self
            .get_venue(&venue_id)
            .ok_or(StoreError::VenueNotFound(venue_id))?;
        let guard = vs.read().await;
        if guard.retired {
            return Err(StoreError::VenueNotFound(venue_id));
        }

        let mut busy: Vec<TimeSlot> = guard
            .active_overlapping(&window)
            .map(|r| {
                TimeSlot::new(
                    r.slot.start.max(window.start),
                    r.slot.end.min(window.end),
                )
            })
            .collect();
        busy.sort_by_key(|s| s.start);
        let busy = merge_overlapping(&busy);

        let mut free = subtract_windows(&[window], &busy);
        if let Some(min) = min_duration {
            free.retain(|s| s.duration() >= min);
        }
        Ok(free)
    }
}
