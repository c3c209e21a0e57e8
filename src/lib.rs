//! venued — multi-tenant booking admission service for sports venues.
//!
//! Admits reservation requests against a per-tenant, WAL-backed ledger,
//! guaranteeing no two active reservations on a venue ever overlap.

pub mod admission;
pub mod compactor;
pub mod http;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod tenant;
pub mod wal;
