use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use ulid::Ulid;

use crate::admission::{AdmissionError, AdmissionService, BookingDraft};
use crate::limits::MAX_BODY_BYTES;
use crate::model::{Reservation, TimeSlot, Vendor, VenueInfo, parse_timestamp};
use crate::observability;
use crate::store::{Ledger, StoreError};
use crate::tenant::TenantManager;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tenants: Arc<TenantManager>,
}

/// Create the application router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    // Permissive CORS for the dashboard frontends; tighten per deployment.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/bookings", post(create_booking))
        .route("/bookings/{id}", delete(cancel_booking))
        .route("/venues", post(register_venue))
        .route("/venues/{id}", delete(retire_venue))
        .route("/venues/{id}/bookings", get(list_bookings))
        .route("/venues/{id}/availability", get(availability))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ── Helpers ──────────────────────────────────────────────────────

fn tenant_of(headers: &HeaderMap) -> &str {
    headers
        .get("x-tenant")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("default")
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn resolve_ledger(state: &AppState, headers: &HeaderMap) -> Result<Arc<Ledger>, Response> {
    let tenant = tenant_of(headers);
    state.tenants.get_or_create(tenant).map_err(|e| {
        tracing::error!("tenant ledger unavailable for {tenant}: {e}");
        error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    })
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn vendor_json(v: &Vendor) -> serde_json::Value {
    json!({ "id": v.id.to_string(), "name": v.name })
}

fn venue_json(v: &VenueInfo) -> serde_json::Value {
    json!({
        "id": v.id.to_string(),
        "name": v.name,
        "vendor": vendor_json(&v.vendor),
    })
}

fn booking_json(r: &Reservation, venue: Option<&VenueInfo>) -> serde_json::Value {
    let mut body = json!({
        "id": r.id.to_string(),
        "venueId": r.venue_id.to_string(),
        "startTime": rfc3339(r.slot.start),
        "endTime": rfc3339(r.slot.end),
        "duration": r.duration_hours,
        "totalAmount": r.total_amount,
        "status": r.status.as_str(),
        "bookingType": r.booking_type.as_str(),
        "customerName": r.customer_name,
        "customerPhone": r.customer_phone,
        "customerEmail": r.customer_email,
        "notes": r.notes,
        "createdAt": rfc3339(r.created_at),
    });
    if let Some(venue) = venue {
        body["venue"] = venue_json(venue);
    }
    body
}

fn admission_status(err: &AdmissionError) -> StatusCode {
    match err {
        AdmissionError::MissingFields(_)
        | AdmissionError::InvalidDateTime { .. }
        | AdmissionError::InvalidDuration(_)
        | AdmissionError::InvalidAmount
        | AdmissionError::InvalidStatus(_)
        | AdmissionError::InvalidBookingType(_) => StatusCode::BAD_REQUEST,
        AdmissionError::VenueNotFound => StatusCode::NOT_FOUND,
        AdmissionError::SlotConflict => StatusCode::CONFLICT,
        AdmissionError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ── Handlers ─────────────────────────────────────────────────────

async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

/// POST /bookings — the admission pipeline.
async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ledger = match resolve_ledger(&state, &headers) {
        Ok(l) => l,
        Err(resp) => return resp,
    };
    let draft: BookingDraft = match serde_json::from_slice(&body) {
        Ok(d) => d,
        Err(_) => return error_body(StatusCode::BAD_REQUEST, "Invalid JSON body"),
    };

    let service = AdmissionService::new(ledger);
    let started = std::time::Instant::now();
    let result = service.admit(draft).await;
    metrics::histogram!(observability::ADMISSION_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    let outcome = observability::admission_label(result.as_ref().map(|_| ()));
    metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);

    match result {
        Ok(admitted) => {
            tracing::info!(
                booking = %admitted.reservation.id,
                venue = %admitted.venue.id,
                "booking admitted"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "booking": booking_json(&admitted.reservation, Some(&admitted.venue)),
                })),
            )
                .into_response()
        }
        Err(AdmissionError::Persistence(detail)) => {
            tracing::error!("admission persistence failure: {detail}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
        Err(err) => error_body(admission_status(&err), err.to_string()),
    }
}

/// DELETE /bookings/{id} — cancel, freeing the slot. The row survives.
async fn cancel_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let ledger = match resolve_ledger(&state, &headers) {
        Ok(l) => l,
        Err(resp) => return resp,
    };
    let Ok(booking_id) = Ulid::from_string(&id) else {
        return error_body(StatusCode::NOT_FOUND, "Booking not found");
    };

    match ledger.cancel_booking(booking_id).await {
        Ok(venue_id) => {
            metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
            tracing::info!(booking = %booking_id, venue = %venue_id, "booking cancelled");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(StoreError::BookingNotFound(_)) => {
            error_body(StatusCode::NOT_FOUND, "Booking not found")
        }
        Err(e) => {
            tracing::error!("cancel failed for {booking_id}: {e}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VendorDraft {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VenueDraft {
    id: Option<String>,
    name: Option<String>,
    vendor: Option<VendorDraft>,
}

/// POST /venues — register a venue under its vendor.
async fn register_venue(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ledger = match resolve_ledger(&state, &headers) {
        Ok(l) => l,
        Err(resp) => return resp,
    };
    let draft: VenueDraft = match serde_json::from_slice(&body) {
        Ok(d) => d,
        Err(_) => return error_body(StatusCode::BAD_REQUEST, "Invalid JSON body"),
    };

    let mut missing = Vec::new();
    if draft.name.is_none() {
        missing.push("name");
    }
    let vendor_name = draft.vendor.as_ref().and_then(|v| v.name.clone());
    if vendor_name.is_none() {
        missing.push("vendor.name");
    }
    if !missing.is_empty() {
        return error_body(
            StatusCode::BAD_REQUEST,
            format!("Missing required fields: {}", missing.join(", ")),
        );
    }
    let (Some(name), Some(vendor_name)) = (draft.name, vendor_name) else {
        unreachable!("missing fields already rejected");
    };

    let venue_id = match draft.id {
        Some(raw) => match Ulid::from_string(&raw) {
            Ok(id) => id,
            Err(_) => return error_body(StatusCode::BAD_REQUEST, "Invalid venue id"),
        },
        None => Ulid::new(),
    };
    let vendor_id = match draft.vendor.and_then(|v| v.id) {
        Some(raw) => match Ulid::from_string(&raw) {
            Ok(id) => id,
            Err(_) => return error_body(StatusCode::BAD_REQUEST, "Invalid vendor id"),
        },
        None => Ulid::new(),
    };

    let vendor = Vendor {
        id: vendor_id,
        name: vendor_name,
    };
    match ledger.register_venue(venue_id, name, vendor).await {
        Ok(info) => {
            tracing::info!(venue = %info.id, "venue registered");
            (
                StatusCode::CREATED,
                Json(json!({ "venue": venue_json(&info) })),
            )
                .into_response()
        }
        Err(StoreError::AlreadyExists(_)) => {
            error_body(StatusCode::CONFLICT, "Venue already exists")
        }
        Err(StoreError::LimitExceeded(msg)) => error_body(StatusCode::BAD_REQUEST, msg),
        Err(e) => {
            tracing::error!("venue registration failed: {e}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// DELETE /venues/{id} — soft delete; the venue's reservations survive.
async fn retire_venue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let ledger = match resolve_ledger(&state, &headers) {
        Ok(l) => l,
        Err(resp) => return resp,
    };
    let Ok(venue_id) = Ulid::from_string(&id) else {
        return error_body(StatusCode::NOT_FOUND, "Venue not found");
    };

    match ledger.retire_venue(venue_id).await {
        Ok(()) => {
            tracing::info!(venue = %venue_id, "venue retired");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(StoreError::VenueNotFound(_)) => error_body(StatusCode::NOT_FOUND, "Venue not found"),
        Err(e) => {
            tracing::error!("retire failed for {venue_id}: {e}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /venues/{id}/bookings — all reservations, any status.
async fn list_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let ledger = match resolve_ledger(&state, &headers) {
        Ok(l) => l,
        Err(resp) => return resp,
    };
    let Ok(venue_id) = Ulid::from_string(&id) else {
        return error_body(StatusCode::NOT_FOUND, "Venue not found");
    };

    match ledger.list_reservations(venue_id).await {
        Ok((info, reservations)) => {
            let bookings: Vec<_> = reservations.iter().map(|r| booking_json(r, None)).collect();
            (
                StatusCode::OK,
                Json(json!({ "venue": venue_json(&info), "bookings": bookings })),
            )
                .into_response()
        }
        Err(StoreError::VenueNotFound(_)) => error_body(StatusCode::NOT_FOUND, "Venue not found"),
        Err(e) => {
            tracing::error!("listing failed for {venue_id}: {e}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AvailabilityParams {
    from: Option<String>,
    to: Option<String>,
    min_duration_minutes: Option<i64>,
}

/// GET /venues/{id}/availability — free windows inside [from, to).
async fn availability(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<AvailabilityParams>,
) -> Response {
    let ledger = match resolve_ledger(&state, &headers) {
        Ok(l) => l,
        Err(resp) => return resp,
    };
    let Ok(venue_id) = Ulid::from_string(&id) else {
        return error_body(StatusCode::NOT_FOUND, "Venue not found");
    };

    let mut missing = Vec::new();
    if params.from.is_none() {
        missing.push("from");
    }
    if params.to.is_none() {
        missing.push("to");
    }
    if !missing.is_empty() {
        return error_body(
            StatusCode::BAD_REQUEST,
            format!("Missing required fields: {}", missing.join(", ")),
        );
    }
    let (Some(from_raw), Some(to_raw)) = (params.from, params.to) else {
        unreachable!("missing fields already rejected");
    };

    let Some(from) = parse_timestamp(&from_raw) else {
        return error_body(StatusCode::BAD_REQUEST, "Invalid date format for from");
    };
    let Some(to) = parse_timestamp(&to_raw) else {
        return error_body(StatusCode::BAD_REQUEST, "Invalid date format for to");
    };
    if to <= from {
        return error_body(
            StatusCode::BAD_REQUEST,
            "Query window end must be after start",
        );
    }
    let min_duration = match params.min_duration_minutes {
        Some(m) if m <= 0 => {
            return error_body(StatusCode::BAD_REQUEST, "minDurationMinutes must be positive");
        }
        Some(m) => Some(chrono::Duration::minutes(m)),
        None => None,
    };

    match ledger
        .free_windows(venue_id, TimeSlot::new(from, to), min_duration)
        .await
    {
        Ok(free) => {
            let windows: Vec<_> = free
                .iter()
                .map(|s| json!({ "startTime": rfc3339(s.start), "endTime": rfc3339(s.end) }))
                .collect();
            (
                StatusCode::OK,
                Json(json!({ "venueId": venue_id.to_string(), "free": windows })),
            )
                .into_response()
        }
        Err(StoreError::VenueNotFound(_)) => error_body(StatusCode::NOT_FOUND, "Venue not found"),
        Err(StoreError::LimitExceeded(msg)) => error_body(StatusCode::BAD_REQUEST, msg),
        Err(e) => {
            tracing::error!("availability failed for {venue_id}: {e}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
