//! Notification channel: push trigger and the SSE stream surfaces attach to.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use harbor_events::{NotificationBus, NotificationEvent, PushAlert};
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::app::dto::{PushRequest, PushResponse};
use crate::app::errors::json_error;
use crate::app::services::AppServices;

/// POST /__harbor/push
pub async fn push(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<PushRequest>,
) -> axum::response::Response {
    if req.title.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "validation_error", "title must not be empty");
    }

    let subscribers = services.bus.subscriber_count();
    let alert = PushAlert {
        title: req.title,
        body: req.body,
        target: req.target,
    };
    if let Err(err) = services.bus.broadcast(NotificationEvent::push(alert)) {
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "publish_error",
            format!("{err:?}"),
        );
    }

    (
        StatusCode::ACCEPTED,
        Json(PushResponse {
            success: true,
            subscribers,
        }),
    )
        .into_response()
}

/// GET /__harbor/events
///
/// One SSE event per notification; the SSE event name is the notification
/// `type` and the data is its JSON form. Events published before the
/// surface attached are not replayed.
pub async fn stream_events(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    // Attach before responding so nothing published after this point is missed.
    let subscription = services.bus.subscribe();
    let (tx, rx) = unbounded_channel::<Result<SseEvent, Infallible>>();

    tokio::task::spawn_blocking(move || {
        loop {
            match subscription.recv_timeout(Duration::from_millis(1000)) {
                Ok(event) => {
                    let json_str = match serde_json::to_string(&event) {
                        Ok(s) => s,
                        Err(_) => continue,
                    };
                    let sse_event = SseEvent::default().event(event.kind.as_str()).data(json_str);
                    if tx.send(Ok(sse_event)).is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!("notification stream detached");
    });

    let stream = UnboundedReceiverStream::new(rx);
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}
