use ulid::Ulid;

use crate::limits::*;
use crate::model::{TimeSlot, VenueState};

use super::StoreError;

pub(crate) fn validate_slot(slot: &TimeSlot) -> Result<(), StoreError> {
    if slot.start.timestamp_millis() < MIN_VALID_TIMESTAMP_MS
        || slot.end.timestamp_millis() > MAX_VALID_TIMESTAMP_MS
    {
        return Err(StoreError::InvalidSlot("timestamp out of range"));
    }
    if slot.duration().num_hours() > MAX_SLOT_DURATION_HOURS {
        return Err(StoreError::InvalidSlot("slot too wide"));
    }
    Ok(())
}

/// First active reservation whose slot overlaps `slot`, if any.
pub(super) fn first_active_conflict(vs: &VenueState, slot: &TimeSlot) -> Option<Ulid> {
    vs.active_overlapping(slot).next().map(|r| r.id)
}

/// Merge sorted overlapping/adjacent windows into disjoint windows.
pub fn merge_overlapping(sorted: &[TimeSlot]) -> Vec<TimeSlot> {
    let mut merged: Vec<TimeSlot> = Vec::new();
    for &slot in sorted {
        if let Some(last) = merged.last_mut()
            && slot.start <= last.end
        {
            last.end = last.end.max(slot.end);
            continue;
        }
        merged.push(slot);
    }
    merged
}

/// Subtract `to_remove` (sorted, disjoint) from `base` (sorted, disjoint).
pub fn subtract_windows(base: &[TimeSlot], to_remove: &[TimeSlot]) -> Vec<TimeSlot> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(TimeSlot::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(TimeSlot::new(current_start, current_end));
        }
    }

    result
}
