//! Booking webhook: POST /webhook/call-booked from the scheduling service.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::http::GatewayState;

pub const CAL_SIGNATURE_HEADER: &str = "x-cal-signature-256";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingEvent {
    #[serde(default)]
    trigger_event: Option<String>,
    #[serde(default)]
    payload: BookingPayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingPayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    attendees: Vec<serde_json::Value>,
}

/// Check a hex HMAC-SHA256 of `body` keyed with `secret` (constant-time).
pub fn verify_signature(secret: &str, body: &[u8], provided: &str) -> bool {
    let provided = provided.trim();
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let Ok(expected) = hex::decode(provided) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn validate_signature(
    headers: &HeaderMap,
    body: &[u8],
    expected_secret: Option<&str>,
) -> Result<(), (StatusCode, String)> {
    let Some(secret) = expected_secret else {
        return Ok(());
    };
    let provided = headers
        .get(CAL_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if verify_signature(secret, body, provided) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            "invalid webhook signature".to_string(),
        ))
    }
}

pub(super) async fn handle_call_booked(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, (StatusCode, String)> {
    if let Err(rejected) = validate_signature(&headers, &body, state.webhook_secret.as_deref()) {
        tracing::warn!(
            event = "relay.webhook.signature_rejected",
            "booking webhook signature verification failed"
        );
        return Err(rejected);
    }
    let event: BookingEvent = serde_json::from_slice(&body).map_err(|error| {
        tracing::error!(
            event = "relay.webhook.parse_failed",
            error = %error,
            bytes = body.len(),
            "booking webhook payload could not be processed"
        );
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to process webhook".to_string(),
        )
    })?;
    tracing::info!(
        event = "relay.webhook.call_booked",
        trigger = event.trigger_event.as_deref().unwrap_or("unknown"),
        title = event.payload.title.as_deref().unwrap_or(""),
        start_time = event.payload.start_time.as_deref().unwrap_or(""),
        attendees = event.payload.attendees.len(),
        "call booked"
    );
    Ok("Webhook received")
}
