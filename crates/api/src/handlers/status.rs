//! Live node status over server-sent events.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use nodes::{NodeType, STATUS_TOPIC};

use crate::{ApiError, AppState};

/// `GET /api/v1/channels/{channel}/status`
///
/// Streams `{nodeId, status}` events for one node-type channel, starting
/// from the moment of subscription. Events missed by a lagging client are
/// skipped.
pub async fn stream(
    Path(channel): Path<String>,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if !NodeType::ALL.iter().any(|t| t.channel() == channel) {
        return Err(ApiError::NotFound(format!("unknown status channel '{channel}'")));
    }

    debug!(%channel, "status subscriber connected");
    let events = BroadcastStream::new(state.publisher.subscribe(&channel)).filter_map(|received| async move {
        let event = received.ok()?;
        Event::default().event(STATUS_TOPIC).json_data(&event).ok().map(Ok)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
