use ulid::Ulid;

#[derive(Debug)]
pub enum StoreError {
    VenueNotFound(Ulid),
    BookingNotFound(Ulid),
    AlreadyExists(Ulid),
    /// An active reservation (the carried id) already claims an overlapping
    /// slot. Raised under the venue's write lock — the exclusion-constraint
    /// analogue that makes check-then-insert safe.
    SlotTaken(Ulid),
    InvalidSlot(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::VenueNotFound(id) => write!(f, "venue not found: {id}"),
            StoreError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            StoreError::SlotTaken(id) => write!(f, "slot taken by reservation: {id}"),
            StoreError::InvalidSlot(msg) => write!(f, "invalid slot: {msg}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
