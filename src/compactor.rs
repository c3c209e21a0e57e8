use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::store::Ledger;

/// Background task that rewrites a tenant's WAL once enough appends pile up.
pub async fn run_compactor(ledger: Arc<Ledger>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = ledger.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match ledger.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}
