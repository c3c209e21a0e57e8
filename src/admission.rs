use std::sync::Arc;

use chrono::Duration;
use serde::Deserialize;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::{ReservationStore, StoreError};

/// Canonical order for the missing-fields message. The literal ordering is
/// part of the response contract.
const REQUIRED_FIELDS: [&str; 4] = ["venueId", "startTime", "duration", "totalAmount"];

/// Loosely-typed request body as it arrives off the wire. Everything is
/// optional here; `AdmissionRequest::validate` turns a draft into a typed
/// request or a client error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingDraft {
    pub venue_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration: Option<i64>,
    pub total_amount: Option<f64>,
    pub status: Option<String>,
    pub booking_type: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug)]
pub enum AdmissionError {
    MissingFields(Vec<&'static str>),
    InvalidDateTime { field: &'static str },
    InvalidDuration(&'static str),
    InvalidAmount,
    InvalidStatus(String),
    InvalidBookingType(String),
    VenueNotFound,
    SlotConflict,
    Persistence(String),
}

impl std::fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdmissionError::MissingFields(fields) => {
                write!(f, "Missing required fields: {}", fields.join(", "))
            }
            AdmissionError::InvalidDateTime { field } => {
                write!(f, "Invalid date format for {field}")
            }
            AdmissionError::InvalidDuration(msg) => f.write_str(msg),
            AdmissionError::InvalidAmount => f.write_str("Total amount must be non-negative"),
            AdmissionError::InvalidStatus(raw) => write!(f, "Invalid status: {raw}"),
            AdmissionError::InvalidBookingType(raw) => write!(f, "Invalid booking type: {raw}"),
            AdmissionError::VenueNotFound => f.write_str("Venue not found"),
            AdmissionError::SlotConflict => {
                f.write_str("Venue is not available for the selected time slot")
            }
            // Logged server-side; clients get a generic 500 body instead.
            AdmissionError::Persistence(e) => write!(f, "persistence failure: {e}"),
        }
    }
}

impl std::error::Error for AdmissionError {}

impl AdmissionError {
    fn persistence(e: StoreError) -> Self {
        AdmissionError::Persistence(e.to_string())
    }
}

/// Typed, immutable admission request. Only constructible through
/// `validate`, so anything holding one has passed shape and format checks.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub venue_id: Ulid,
    pub slot: TimeSlot,
    pub duration_hours: i64,
    pub total_amount: f64,
    pub status: BookingStatus,
    pub booking_type: BookingType,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub notes: Option<String>,
}

impl AdmissionRequest {
    /// Stages 1–2 of the pipeline: shape, then type/format. Venue-id parsing
    /// happens last so format errors take precedence over resolution errors.
    pub fn validate(draft: BookingDraft) -> Result<Self, AdmissionError> {
        let mut missing = Vec::new();
        if draft.venue_id.is_none() {
            missing.push(REQUIRED_FIELDS[0]);
        }
        if draft.start_time.is_none() {
            missing.push(REQUIRED_FIELDS[1]);
        }
        if draft.duration.is_none() {
            missing.push(REQUIRED_FIELDS[2]);
        }
        if draft.total_amount.is_none() {
            missing.push(REQUIRED_FIELDS[3]);
        }
        if !missing.is_empty() {
            return Err(AdmissionError::MissingFields(missing));
        }
        let (Some(venue_raw), Some(start_raw), Some(duration), Some(total_amount)) = (
            draft.venue_id,
            draft.start_time,
            draft.duration,
            draft.total_amount,
        ) else {
            unreachable!("missing fields already rejected");
        };

        if duration <= 0 {
            return Err(AdmissionError::InvalidDuration(
                "Duration must be a positive number of hours",
            ));
        }
        if duration > MAX_SLOT_DURATION_HOURS {
            return Err(AdmissionError::InvalidDuration(
                "Duration exceeds the maximum booking length",
            ));
        }
        if !total_amount.is_finite() || total_amount < 0.0 {
            return Err(AdmissionError::InvalidAmount);
        }

        let start = parse_timestamp(&start_raw)
            .ok_or(AdmissionError::InvalidDateTime { field: "startTime" })?;
        let end_supplied = draft.end_time.is_some();
        let end = match draft.end_time {
            Some(raw) => {
                let end = parse_timestamp(&raw)
                    .ok_or(AdmissionError::InvalidDateTime { field: "endTime" })?;
                if end <= start {
                    return Err(AdmissionError::InvalidDuration(
                        "End time must be after start time",
                    ));
                }
                // Cross-check, not derived: the caller's duration must agree
                // with the supplied window exactly.
                if (end - start).num_seconds() != duration * 3600 {
                    return Err(AdmissionError::InvalidDuration(
                        "Duration does not match start and end times",
                    ));
                }
                end
            }
            None => start + Duration::hours(duration),
        };
        if start.timestamp_millis() < MIN_VALID_TIMESTAMP_MS {
            return Err(AdmissionError::InvalidDateTime { field: "startTime" });
        }
        if end.timestamp_millis() > MAX_VALID_TIMESTAMP_MS {
            // Blame the field the caller actually sent.
            return Err(AdmissionError::InvalidDateTime {
                field: if end_supplied { "endTime" } else { "startTime" },
            });
        }

        let status = match draft.status {
            None => BookingStatus::Confirmed,
            Some(raw) => {
                BookingStatus::parse(&raw).ok_or_else(|| AdmissionError::InvalidStatus(raw))?
            }
        };
        let booking_type = match draft.booking_type {
            None => BookingType::Standard,
            Some(raw) => BookingType::parse(&raw)
                .ok_or_else(|| AdmissionError::InvalidBookingType(raw))?,
        };

        // The id is opaque to callers: one that cannot parse cannot name any
        // venue, so it resolves the same way as an unknown venue.
        let venue_id =
            Ulid::from_string(&venue_raw).map_err(|_| AdmissionError::VenueNotFound)?;

        Ok(Self {
            venue_id,
            slot: TimeSlot::new(start, end),
            duration_hours: duration,
            total_amount,
            status,
            booking_type,
            customer_name: draft.customer_name,
            customer_phone: draft.customer_phone,
            customer_email: draft.customer_email,
            notes: draft.notes,
        })
    }

    fn into_new_reservation(self) -> NewReservation {
        NewReservation {
            venue_id: self.venue_id,
            slot: self.slot,
            duration_hours: self.duration_hours,
            total_amount: self.total_amount,
            status: self.status,
            booking_type: self.booking_type,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            customer_email: self.customer_email,
            notes: self.notes,
        }
    }
}

/// The admitted reservation together with its venue (and the venue's owning
/// vendor) for response enrichment.
#[derive(Debug, Clone)]
pub struct AdmittedBooking {
    pub reservation: Reservation,
    pub venue: VenueInfo,
}

/// The single orchestration point: a linear validation pipeline with
/// early-exit failure stages. Stateless per request; all coordination lives
/// in the store.
pub struct AdmissionService {
    store: Arc<dyn ReservationStore>,
}

impl AdmissionService {
    pub fn new(store: Arc<dyn ReservationStore>) -> Self {
        Self { store }
    }

    pub async fn admit(&self, draft: BookingDraft) -> Result<AdmittedBooking, AdmissionError> {
        // Stages 1–2: shape + type/format
        let request = AdmissionRequest::validate(draft)?;

        // Stage 3: venue resolution
        let venue = self
            .store
            .find_venue(request.venue_id)
            .await
            .map_err(AdmissionError::persistence)?
            .ok_or(AdmissionError::VenueNotFound)?;

        // Stage 4: conflict check
        let clashes = self
            .store
            .find_overlapping(request.venue_id, request.slot)
            .await
            .map_err(AdmissionError::persistence)?;
        if !clashes.is_empty() {
            return Err(AdmissionError::SlotConflict);
        }

        // Stage 5: constraint-backed insert
        match self.store.insert(request.into_new_reservation()).await {
            Ok(reservation) => Ok(AdmittedBooking { reservation, venue }),
            // A concurrent admit claimed the slot between stages 4 and 5.
            Err(StoreError::SlotTaken(_)) => Err(AdmissionError::SlotConflict),
            Err(StoreError::VenueNotFound(_)) => Err(AdmissionError::VenueNotFound),
            Err(StoreError::InvalidSlot(msg)) => Err(AdmissionError::InvalidDuration(msg)),
            Err(e) => Err(AdmissionError::persistence(e)),
        }
    }
}
