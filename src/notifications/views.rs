use crate::common::auth::protect;
use crate::common::state::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use utoipa_axum::{router::OpenApiRouter, routes};

pub fn router(state: &AppState) -> OpenApiRouter {
    let router = OpenApiRouter::new()
        .routes(routes!(stream_events))
        .with_state(state.clone());

    protect(router, state, "events")
}

/// Stream change notifications as server-sent events
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Event stream; each event is named after its kind and carries a JSON ChangeEvent", content_type = "text/event-stream", body = super::models::ChangeEvent),
        (status = 401, description = "Unauthorized")
    ),
    tag = "events"
)]
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut receiver = state.events.subscribe();

    let stream = async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => match Event::default().event(event.kind()).json_data(&event) {
                    Ok(sse_event) => yield Ok(sse_event),
                    Err(e) => tracing::warn!("Could not encode {} event: {e}", event.kind()),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event subscriber lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
