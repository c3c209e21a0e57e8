use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use ulid::Ulid;

use super::*;
use crate::model::*;
use crate::notify::NotifyHub;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("venued_test_store");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_ledger(name: &str) -> Ledger {
    let path = test_wal_path(name);
    let notify = Arc::new(NotifyHub::new());
    Ledger::new(path, notify).unwrap()
}

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, hour, min, 0).unwrap()
}

fn slot(start_hour: u32, end_hour: u32) -> TimeSlot {
    TimeSlot::new(at(start_hour, 0), at(end_hour, 0))
}

fn vendor() -> Vendor {
    Vendor {
        id: Ulid::new(),
        name: "Metro Sports".into(),
    }
}

fn draft(venue_id: Ulid, slot: TimeSlot) -> NewReservation {
    NewReservation {
        venue_id,
        slot,
        duration_hours: (slot.duration().num_seconds() / 3600).max(1),
        total_amount: 120.0,
        status: BookingStatus::Confirmed,
        booking_type: BookingType::Standard,
        customer_name: None,
        customer_phone: None,
        customer_email: None,
        notes: None,
    }
}

#[tokio::test]
async fn register_and_find_venue() {
    let ledger = new_ledger("register_find.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    let info = ledger.find_venue_info(&vid).await.unwrap();
    assert_eq!(info.id, vid);
    assert_eq!(info.name, "Court 1");
    assert!(ledger.find_venue_info(&Ulid::new()).await.is_none());
}

#[tokio::test]
async fn register_duplicate_rejected() {
    let ledger = new_ledger("register_dup.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();
    let result = ledger.register_venue(vid, "Court 1".into(), vendor()).await;
    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
}

#[tokio::test]
async fn retired_venue_not_found() {
    let ledger = new_ledger("retire.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    ledger.retire_venue(vid).await.unwrap();
    assert!(ledger.find_venue_info(&vid).await.is_none());

    // Retiring again reports not-found
    let result = ledger.retire_venue(vid).await;
    assert!(matches!(result, Err(StoreError::VenueNotFound(_))));

    // Booking a retired venue reports not-found too
    let result = ledger.insert_booking(draft(vid, slot(10, 12))).await;
    assert!(matches!(result, Err(StoreError::VenueNotFound(_))));
}

#[tokio::test]
async fn insert_and_find_overlapping() {
    let ledger = new_ledger("insert_overlap.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    let admitted = ledger.insert_booking(draft(vid, slot(15, 17))).await.unwrap();
    assert_eq!(admitted.venue_id, vid);
    assert_eq!(admitted.status, BookingStatus::Confirmed);

    let hits = ledger.find_overlapping(vid, slot(16, 18)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, admitted.id);

    let hits = ledger.find_overlapping(vid, slot(17, 19)).await.unwrap();
    assert!(hits.is_empty()); // back-to-back is free
}

#[tokio::test]
async fn overlapping_insert_rejected() {
    let ledger = new_ledger("insert_conflict.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    let first = ledger.insert_booking(draft(vid, slot(15, 17))).await.unwrap();
    let result = ledger.insert_booking(draft(vid, slot(16, 18))).await;
    match result {
        Err(StoreError::SlotTaken(id)) => assert_eq!(id, first.id),
        other => panic!("expected SlotTaken, got {other:?}"),
    }
}

#[tokio::test]
async fn back_to_back_inserts_succeed() {
    let ledger = new_ledger("back_to_back.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    ledger.insert_booking(draft(vid, slot(10, 12))).await.unwrap();
    ledger.insert_booking(draft(vid, slot(12, 14))).await.unwrap();
    ledger.insert_booking(draft(vid, slot(8, 10))).await.unwrap();
}

#[tokio::test]
async fn pending_payment_blocks_slot() {
    let ledger = new_ledger("pending_blocks.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    let mut pending = draft(vid, slot(10, 12));
    pending.status = BookingStatus::PendingPayment;
    ledger.insert_booking(pending).await.unwrap();

    let result = ledger.insert_booking(draft(vid, slot(11, 13))).await;
    assert!(matches!(result, Err(StoreError::SlotTaken(_))));
}

#[tokio::test]
async fn cancelled_booking_frees_slot() {
    let ledger = new_ledger("cancel_frees.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    let admitted = ledger.insert_booking(draft(vid, slot(10, 12))).await.unwrap();
    let freed_venue = ledger.cancel_booking(admitted.id).await.unwrap();
    assert_eq!(freed_venue, vid);

    // Slot is bookable again; the cancelled row survives
    ledger.insert_booking(draft(vid, slot(10, 12))).await.unwrap();
    let (_, reservations) = ledger.list_reservations(vid).await.unwrap();
    assert_eq!(reservations.len(), 2);
    assert_eq!(
        reservations.iter().filter(|r| r.is_active()).count(),
        1
    );
}

#[tokio::test]
async fn cancel_unknown_booking_fails() {
    let ledger = new_ledger("cancel_unknown.wal");
    let result = ledger.cancel_booking(Ulid::new()).await;
    assert!(matches!(result, Err(StoreError::BookingNotFound(_))));
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let ledger = new_ledger("cancel_idem.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();
    let admitted = ledger.insert_booking(draft(vid, slot(10, 12))).await.unwrap();

    assert_eq!(ledger.cancel_booking(admitted.id).await.unwrap(), vid);
    assert_eq!(ledger.cancel_booking(admitted.id).await.unwrap(), vid);
}

#[tokio::test]
async fn invalid_slot_rejected() {
    let ledger = new_ledger("invalid_slot.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    let ancient = TimeSlot::new(
        Utc.with_ymd_and_hms(1999, 1, 1, 10, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(1999, 1, 1, 12, 0, 0).unwrap(),
    );
    let result = ledger.insert_booking(draft(vid, ancient)).await;
    assert!(matches!(result, Err(StoreError::InvalidSlot(_))));
}

#[tokio::test]
async fn wal_replay_restores_state() {
    let path = test_wal_path("replay_restore.wal");
    let vid = Ulid::new();
    let cancelled_id;
    {
        let ledger = Ledger::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        ledger
            .register_venue(vid, "Court 1".into(), vendor())
            .await
            .unwrap();
        ledger.insert_booking(draft(vid, slot(10, 12))).await.unwrap();
        let second = ledger.insert_booking(draft(vid, slot(14, 16))).await.unwrap();
        cancelled_id = second.id;
        ledger.cancel_booking(cancelled_id).await.unwrap();
    }

    let reopened = Ledger::new(path, Arc::new(NotifyHub::new())).unwrap();
    let (info, reservations) = reopened.list_reservations(vid).await.unwrap();
    assert_eq!(info.name, "Court 1");
    assert_eq!(reservations.len(), 2);
    let cancelled = reservations.iter().find(|r| r.id == cancelled_id).unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    // The freed slot is bookable after replay, and the index still resolves
    // replayed bookings for cancellation.
    reopened.insert_booking(draft(vid, slot(14, 16))).await.unwrap();
    let first_id = reservations.iter().find(|r| r.is_active()).unwrap().id;
    reopened.cancel_booking(first_id).await.unwrap();
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compact_preserve.wal");
    let vid = Ulid::new();
    let retired_vid = Ulid::new();
    {
        let ledger = Ledger::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        ledger
            .register_venue(vid, "Court 1".into(), vendor())
            .await
            .unwrap();
        ledger
            .register_venue(retired_vid, "Court 2".into(), vendor())
            .await
            .unwrap();
        ledger.retire_venue(retired_vid).await.unwrap();
        let admitted = ledger.insert_booking(draft(vid, slot(10, 12))).await.unwrap();
        ledger.cancel_booking(admitted.id).await.unwrap();
        ledger.insert_booking(draft(vid, slot(10, 12))).await.unwrap();

        assert!(ledger.wal_appends_since_compact().await > 0);
        ledger.compact_wal().await.unwrap();
        assert_eq!(ledger.wal_appends_since_compact().await, 0);
    }

    let reopened = Ledger::new(path, Arc::new(NotifyHub::new())).unwrap();
    let (_, reservations) = reopened.list_reservations(vid).await.unwrap();
    assert_eq!(reservations.len(), 2);
    assert_eq!(reservations.iter().filter(|r| r.is_active()).count(), 1);
    assert!(reopened.find_venue_info(&retired_vid).await.is_none());
}

#[tokio::test]
async fn free_windows_subtracts_active() {
    let ledger = new_ledger("free_windows.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    ledger.insert_booking(draft(vid, slot(10, 12))).await.unwrap();
    ledger.insert_booking(draft(vid, slot(14, 15))).await.unwrap();
    let cancelled = ledger.insert_booking(draft(vid, slot(16, 17))).await.unwrap();
    ledger.cancel_booking(cancelled.id).await.unwrap();

    let free = ledger.free_windows(vid, slot(9, 18), None).await.unwrap();
    assert_eq!(free, vec![slot(9, 10), slot(12, 14), slot(15, 18)]);

    // Cancelled slots don't block; a min-duration filter drops short stretches
    let free = ledger
        .free_windows(vid, slot(9, 18), Some(chrono::Duration::hours(3)))
        .await
        .unwrap();
    assert_eq!(free, vec![slot(15, 18)]);
}

#[tokio::test]
async fn free_windows_unknown_venue_fails() {
    let ledger = new_ledger("free_windows_unknown.wal");
    let result = ledger.free_windows(Ulid::new(), slot(9, 18), None).await;
    assert!(matches!(result, Err(StoreError::VenueNotFound(_))));
}

#[tokio::test]
async fn notify_emits_committed_events() {
    let ledger = new_ledger("notify_commit.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    let mut rx = ledger.notify.watch(vid);
    let admitted = ledger.insert_booking(draft(vid, slot(10, 12))).await.unwrap();

    match rx.recv().await.unwrap() {
        Event::BookingAdmitted { booking } => assert_eq!(booking.id, admitted.id),
        other => panic!("expected BookingAdmitted, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_overlapping_admits_exactly_one() {
    let ledger = Arc::new(new_ledger("concurrent_one_winner.wal"));
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    // 16 pairwise-overlapping slots: all contain 11:59.
    let mut handles = Vec::new();
    for i in 0..16u32 {
        let ledger = ledger.clone();
        let s = TimeSlot::new(at(10, (i * 3) % 60), at(12, 0));
        handles.push(tokio::spawn(async move {
            ledger.insert_booking(draft(vid, s)).await
        }));
    }

    let mut admitted = 0;
    let mut conflicts = 0;
    for outcome in futures::future::join_all(handles).await {
        match outcome.unwrap() {
            Ok(_) => admitted += 1,
            Err(StoreError::SlotTaken(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(admitted, 1, "exactly one overlapping admit must win");
    assert_eq!(conflicts, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_disjoint_admits_all_win() {
    let ledger = Arc::new(new_ledger("concurrent_disjoint.wal"));
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8u32 {
        let ledger = ledger.clone();
        let s = slot(8 + i, 9 + i);
        handles.push(tokio::spawn(async move {
            ledger.insert_booking(draft(vid, s)).await
        }));
    }

    for h in handles {
        h.await.unwrap().unwrap();
    }
    let (_, reservations) = ledger.list_reservations(vid).await.unwrap();
    assert_eq!(reservations.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn venues_admit_independently() {
    let ledger = Arc::new(new_ledger("independent_venues.wal"));
    let a = Ulid::new();
    let b = Ulid::new();
    ledger.register_venue(a, "Court A".into(), vendor()).await.unwrap();
    ledger.register_venue(b, "Court B".into(), vendor()).await.unwrap();

    // The same window on different venues never conflicts.
    let ra = {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.insert_booking(draft(a, slot(10, 12))).await })
    };
    let rb = {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.insert_booking(draft(b, slot(10, 12))).await })
    };
    ra.await.unwrap().unwrap();
    rb.await.unwrap().unwrap();
}

#[tokio::test]
async fn store_trait_paths_match_inherent() {
    let ledger = new_ledger("trait_paths.wal");
    let vid = Ulid::new();
    ledger
        .register_venue(vid, "Court 1".into(), vendor())
        .await
        .unwrap();

    let store: &dyn ReservationStore = &ledger;
    assert!(store.find_venue(vid).await.unwrap().is_some());
    assert!(store.find_venue(Ulid::new()).await.unwrap().is_none());

    store.insert(draft(vid, slot(10, 12))).await.unwrap();
    let hits = store.find_overlapping(vid, slot(11, 13)).await.unwrap();
    assert_eq!(hits.len(), 1);

    let result = store.insert(draft(vid, slot(11, 13))).await;
    assert!(matches!(result, Err(StoreError::SlotTaken(_))));
}
