use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::compactor;
use crate::limits::*;
use crate::notify::NotifyHub;
use crate::store::Ledger;

/// Derive the WAL file name for a tenant. Filtering keeps only
/// `[A-Za-z0-9_-]`, so a header like `../../etc` cannot escape the data
/// directory; a name that filters down to nothing is rejected.
fn wal_file_name(tenant: &str) -> io::Result<String> {
    if tenant.len() > MAX_TENANT_NAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "tenant name too long",
        ));
    }
    let stem: String = tenant
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
        .collect();
    if stem.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty tenant name",
        ));
    }
    Ok(format!("{stem}.wal"))
}

/// Per-tenant ledgers, keyed by the `x-tenant` request header. Each tenant
/// owns a Ledger, a WAL file, and a compactor task; tenants never share
/// state.
pub struct TenantManager {
    ledgers: DashMap<String, Arc<Ledger>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            ledgers: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    /// Resolve a tenant's ledger, creating it on first sight. Creation runs
    /// under the map entry, so two racing requests for a brand-new tenant
    /// share one ledger instead of opening the WAL file twice.
    pub fn get_or_create(&self, tenant: &str) -> io::Result<Arc<Ledger>> {
        if let Some(found) = self.ledgers.get(tenant) {
            return Ok(found.clone());
        }
        let file = wal_file_name(tenant)?;
        if self.ledgers.len() >= MAX_TENANTS {
            return Err(io::Error::other("too many tenants"));
        }

        match self.ledgers.entry(tenant.to_string()) {
            Entry::Occupied(ready) => Ok(ready.get().clone()),
            Entry::Vacant(slot) => {
                let ledger = Arc::new(Ledger::new(
                    self.data_dir.join(file),
                    Arc::new(NotifyHub::new()),
                )?);

                let worker = ledger.clone();
                let threshold = self.compact_threshold;
                tokio::spawn(async move {
                    compactor::run_compactor(worker, threshold).await;
                });

                slot.insert(ledger.clone());
                metrics::gauge!(crate::observability::TENANTS_ACTIVE)
                    .set(self.ledgers.len() as f64);
                Ok(ledger)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use ulid::Ulid;

    fn manager(name: &str) -> (TenantManager, PathBuf) {
        let dir = std::env::temp_dir().join("venued_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        (TenantManager::new(dir.clone(), 1000), dir)
    }

    fn draft(venue_id: Ulid) -> NewReservation {
        NewReservation {
            venue_id,
            slot: TimeSlot::new(
                Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap(),
            ),
            duration_hours: 2,
            total_amount: 100.0,
            status: BookingStatus::Confirmed,
            booking_type: BookingType::Standard,
            customer_name: None,
            customer_phone: None,
            customer_email: None,
            notes: None,
        }
    }

    fn vendor() -> Vendor {
        Vendor {
            id: Ulid::new(),
            name: "Metro Sports".into(),
        }
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let (tm, _dir) = manager("isolation");
        let club_a = tm.get_or_create("club_a").unwrap();
        let club_b = tm.get_or_create("club_b").unwrap();

        // The same venue id, the same slot — one per tenant, no conflict.
        let vid = Ulid::new();
        club_a
            .register_venue(vid, "Court 1".into(), vendor())
            .await
            .unwrap();
        club_b
            .register_venue(vid, "Court 1".into(), vendor())
            .await
            .unwrap();
        club_a.insert_booking(draft(vid)).await.unwrap();
        club_b.insert_booking(draft(vid)).await.unwrap();
    }

    #[tokio::test]
    async fn ledger_created_lazily() {
        let (tm, dir) = manager("lazy");
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        tm.get_or_create("my_club").unwrap();
        assert!(dir.join("my_club.wal").exists());
    }

    #[tokio::test]
    async fn repeated_lookup_returns_the_same_ledger() {
        let (tm, _dir) = manager("same_ledger");
        let first = tm.get_or_create("foo").unwrap();
        let again = tm.get_or_create("foo").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[tokio::test]
    async fn traversal_characters_are_stripped() {
        let (tm, dir) = manager("sanitize");

        tm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());

        // Nothing left after filtering
        assert!(tm.get_or_create("../..").is_err());
    }

    #[tokio::test]
    async fn overlong_tenant_name_rejected() {
        let (tm, _dir) = manager("name_too_long");
        let err = tm
            .get_or_create(&"x".repeat(MAX_TENANT_NAME_LEN + 1))
            .unwrap_err();
        assert!(err.to_string().contains("tenant name too long"));
    }

    #[tokio::test]
    async fn tenant_count_is_capped() {
        let (tm, _dir) = manager("count_limit");
        for i in 0..MAX_TENANTS {
            tm.get_or_create(&format!("t{i}")).unwrap();
        }
        let err = tm.get_or_create("one_more").unwrap_err();
        assert!(err.to_string().contains("too many tenants"));
    }
}
