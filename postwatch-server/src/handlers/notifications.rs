use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use postwatch_core::{DispatchOutcome, Notification};
use tracing::{debug, warn};

use crate::infra::app_state::AppState;

pub const HEADER_CHANNEL_ID: &str = "x-goog-channel-id";
pub const HEADER_RESOURCE_STATE: &str = "x-goog-resource-state";
pub const HEADER_CHANGED: &str = "x-goog-changed";
pub const HEADER_MESSAGE_NUMBER: &str = "x-goog-message-number";
pub const HEADER_RESOURCE_ID: &str = "x-goog-resource-id";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

pub fn notification_from_headers(headers: &HeaderMap) -> Notification {
    let mut notification = Notification::new(
        header(headers, HEADER_CHANNEL_ID).trim(),
        header(headers, HEADER_RESOURCE_STATE).trim(),
        header(headers, HEADER_CHANGED),
    );
    notification.message_number = headers
        .get(HEADER_MESSAGE_NUMBER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    notification
}

/// Push notification endpoint.
///
/// Always acknowledges with `200`; the remote store retries anything else.
/// Refresh work runs on a tracked task so the acknowledgement never waits
/// for the pipeline.
pub async fn receive_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let notification = notification_from_headers(&headers);
    debug!(
        channel_id = %notification.channel_id,
        state = %notification.resource_state,
        changed = ?notification.changed,
        message_number = ?notification.message_number,
        resource_id = header(&headers, HEADER_RESOURCE_ID),
        body = %String::from_utf8_lossy(&body),
        "received push notification"
    );

    let watched = match state.dispatcher.admit(&notification) {
        Ok(watched) => watched,
        Err(_) => return StatusCode::OK,
    };

    if state.shutdown.is_triggered() {
        warn!(post = %watched.key(), "shutting down, dropping post update");
        return StatusCode::OK;
    }

    let dispatcher = state.dispatcher.clone();
    state.tasks.spawn(async move {
        let outcome = dispatcher.process(&watched).await;
        if let DispatchOutcome::Debounced = outcome {
            debug!(post = %watched.key(), "update absorbed by cooldown");
        }
    });

    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn headers_map_onto_a_notification() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Goog-Channel-ID", HeaderValue::from_static("AbCdEfGhIjKl"));
        headers.insert("X-Goog-Resource-State", HeaderValue::from_static("update"));
        headers.insert("X-Goog-Changed", HeaderValue::from_static("properties, content"));
        headers.insert("X-Goog-Message-Number", HeaderValue::from_static("42"));

        let notification = notification_from_headers(&headers);

        assert_eq!(notification.channel_id.as_str(), "AbCdEfGhIjKl");
        assert!(notification.is_update());
        assert_eq!(notification.relevant_changes(), vec!["properties", "content"]);
        assert_eq!(notification.message_number.as_deref(), Some("42"));
    }

    #[test]
    fn missing_headers_produce_an_ignorable_notification() {
        let notification = notification_from_headers(&HeaderMap::new());
        assert!(!notification.is_update());
        assert!(notification.changed.is_empty());
        assert!(notification.message_number.is_none());
    }
}
