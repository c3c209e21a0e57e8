use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open time window `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "TimeSlot start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[allow(dead_code)]
    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Parse a caller-supplied timestamp: RFC 3339 with offset, or a naive
/// `YYYY-MM-DDTHH:MM:SS[.fff]` interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING_PAYMENT" => Some(Self::PendingPayment),
            "CONFIRMED" => Some(Self::Confirmed),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether this status counts toward slot conflicts.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingType {
    Standard,
    Practice,
    Match,
}

impl BookingType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "STANDARD" => Some(Self::Standard),
            "PRACTICE" => Some(Self::Practice),
            "MATCH" => Some(Self::Match),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Practice => "PRACTICE",
            Self::Match => "MATCH",
        }
    }
}

/// The vendor owning a venue. Carried for response enrichment only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: Ulid,
    pub name: String,
}

/// A committed reservation. Rows are never deleted; cancellation flips the
/// status and frees the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
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
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Insert input: everything the store needs to mint a `Reservation`.
/// The id and `created_at` are assigned by the store at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
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

#[derive(Debug, Clone)]
pub struct VenueState {
    pub id: Ulid,
    pub name: String,
    pub vendor: Vendor,
    /// Soft-deleted venues stay in memory so their reservations survive,
    /// but every read path treats them as not found.
    pub retired: bool,
    /// All reservations (any status), sorted by `slot.start`.
    pub reservations: Vec<Reservation>,
}

impl VenueState {
    pub fn new(id: Ulid, name: String, vendor: Vendor) -> Self {
        Self {
            id,
            name,
            vendor,
            retired: false,
            reservations: Vec::new(),
        }
    }

    /// Insert keeping the list sorted by `slot.start`.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.slot.start, |r| r.slot.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    /// Flip a reservation to CANCELLED. Returns false if the id is unknown
    /// or the reservation was already cancelled.
    pub fn mark_cancelled(&mut self, id: Ulid) -> bool {
        match self.reservations.iter_mut().find(|r| r.id == id) {
            Some(r) if r.status != BookingStatus::Cancelled => {
                r.status = BookingStatus::Cancelled;
                true
            }
            _ => false,
        }
    }

    /// Reservations whose slot overlaps the query window, any status.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &TimeSlot) -> impl Iterator<Item = &Reservation> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .reservations
            .partition_point(|r| r.slot.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.slot.end > query.start)
    }

    /// Overlapping reservations that count toward conflicts.
    pub fn active_overlapping(&self, query: &TimeSlot) -> impl Iterator<Item = &Reservation> {
        self.overlapping(query).filter(|r| r.status.is_active())
    }

    pub fn info(&self) -> VenueInfo {
        VenueInfo {
            id: self.id,
            name: self.name.clone(),
            vendor: self.vendor.clone(),
        }
    }
}

/// The event types — flat, one model struct deep at most. This is the WAL
/// record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    VenueRegistered {
        id: Ulid,
        name: String,
        vendor: Vendor,
    },
    VenueRetired {
        id: Ulid,
    },
    BookingAdmitted {
        booking: Reservation,
    },
    BookingCancelled {
        id: Ulid,
        venue_id: Ulid,
    },
}

impl Event {
    /// The venue this event belongs to.
    pub fn venue_id(&self) -> Ulid {
        match self {
            Event::VenueRegistered { id, .. } | Event::VenueRetired { id } => *id,
            Event::BookingAdmitted { booking } => booking.venue_id,
            Event::BookingCancelled { venue_id, .. } => *venue_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueInfo {
    pub id: Ulid,
    pub name: String,
    pub vendor: Vendor,
}
