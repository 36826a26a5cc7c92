use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::stream::{self, Stream};
use ledger_dispatch::SseEvent;

use crate::errors::to_response;
use crate::state::AppState;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// `GET /v1/jobs/{job_id}/events` — server-sent progress stream (spec §4.10:
/// "SSE fan-out", with the `X-P95-JOB-MS` edge-budget header from spec §6).
pub async fn job_events(State(state): State<AppState>, Path(job_id): Path<String>) -> impl IntoResponse {
    let receiver = match ledger_dispatch::stream_events(state.kv.clone(), job_id, KEEPALIVE_INTERVAL).await {
        Ok(receiver) => receiver,
        Err(e) => return to_response(&e).into_response(),
    };

    let p95 = ledger_kv::durations::p95_ms(&state.kv, state.settings.sse_edge_budget_ms)
        .await
        .unwrap_or(state.settings.sse_edge_budget_ms);

    let stream = async_stream(receiver);
    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEPALIVE_INTERVAL));

    (
        [
            ("Cache-Control", "no-store".to_string()),
            ("X-P95-JOB-MS", p95.to_string()),
        ],
        sse,
    )
        .into_response()
}

fn async_stream(
    receiver: tokio::sync::mpsc::Receiver<SseEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(receiver, |mut receiver| async move {
        let event = receiver.recv().await?;
        let sse_event = match event {
            SseEvent::Data(payload) => Event::default().event("progress").data(payload),
            SseEvent::Keepalive => Event::default().comment("keepalive"),
        };
        Some((Ok(sse_event), receiver))
    })
}
