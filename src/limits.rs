//! Hard limits protecting the ledger from pathological input.

/// Max venues a single tenant may register.
pub const MAX_VENUES_PER_TENANT: usize = 10_000;

/// Max reservations held by one venue (any status).
pub const MAX_RESERVATIONS_PER_VENUE: usize = 100_000;

/// Max length of venue and vendor names.
pub const MAX_NAME_LEN: usize = 256;

/// Max length of customer contact fields (name, phone, email).
pub const MAX_CONTACT_LEN: usize = 256;

/// Max length of free-form booking notes.
pub const MAX_NOTES_LEN: usize = 2048;

/// Max number of tenants (lazily created ledgers).
pub const MAX_TENANTS: usize = 1024;

/// Max length of a tenant name before sanitization.
pub const MAX_TENANT_NAME_LEN: usize = 256;

/// Earliest timestamp a slot may start at (2000-01-01T00:00:00Z, Unix ms).
pub const MIN_VALID_TIMESTAMP_MS: i64 = 946_684_800_000;

/// Latest timestamp a slot may end at (2100-01-01T00:00:00Z, Unix ms).
pub const MAX_VALID_TIMESTAMP_MS: i64 = 4_102_444_800_000;

/// Longest slot a single reservation may claim.
pub const MAX_SLOT_DURATION_HOURS: i64 = 24 * 14;

/// Widest window an availability query may scan.
pub const MAX_QUERY_WINDOW_HOURS: i64 = 24 * 90;

/// Max HTTP request body size in bytes.
pub const MAX_BODY_BYTES: usize = 64 * 1024;
