//! Server-sent progress stream.
//!
//! `GET /api/clips/:task_id/events` attaches the single live sink for a task.
//! The first event is the current snapshot and the stream closes after the
//! terminal event. Dropping the connection detaches the sink only; the task
//! keeps running and can be re-subscribed.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;
use tracing::debug;

use cliptrim_models::{ProgressEvent, TaskId};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn to_sse_event(event: &ProgressEvent) -> Event {
    Event::default()
        .json_data(event)
        .unwrap_or_else(|_| Event::default().comment("serialization failed"))
}

/// Yield events until (and including) the first terminal one. `guard` lives
/// as long as the stream.
fn progress_stream<G>(
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
    guard: G,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static
where
    G: Send + 'static,
{
    stream::unfold((receiver, guard, false), |(mut receiver, guard, finished)| async move {
        if finished {
            return None;
        }
        let event = receiver.recv().await?;
        let finished = event.is_terminal();
        Some((Ok(to_sse_event(&event)), (receiver, guard, finished)))
    })
}

pub async fn clip_events(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let task_id = TaskId::parse(&task_id).ok_or_else(|| ApiError::not_found("Task not found"))?;
    if state.bus.snapshot(&task_id).is_none() {
        return Err(ApiError::not_found("Task not found"));
    }
    let subscription = state
        .bus
        .subscribe(&task_id)
        .ok_or_else(|| ApiError::Unavailable("Server is shutting down".to_string()))?;

    metrics::record_stream_opened();
    debug!(task_id = %task_id, generation = subscription.generation, "Progress stream opened");

    let bus = state.bus.clone();
    let guard = scopeguard::guard(
        (subscription.task_id, subscription.generation),
        move |(task_id, generation)| {
            bus.unregister(&task_id, generation);
            metrics::record_stream_closed();
            debug!(task_id = %task_id, generation, "Progress stream closed");
        },
    );

    let stream = progress_stream(subscription.receiver, guard);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("keep-alive")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use cliptrim_models::TaskStatus;

    #[tokio::test]
    async fn test_stream_ends_after_terminal_event_and_drops_guard() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ProgressEvent::new(TaskStatus::Downloading, 35, "Downloading")).unwrap();
        tx.send(ProgressEvent::complete("clip.mp4")).unwrap();
        tx.send(ProgressEvent::new(TaskStatus::Cleaning, 96, "late")).unwrap();

        let dropped = Arc::new(AtomicBool::new(false));
        let flag = dropped.clone();
        let guard = scopeguard::guard((), move |_| flag.store(true, Ordering::SeqCst));

        let events: Vec<_> = progress_stream(rx, guard).collect().await;
        assert_eq!(events.len(), 2);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stream_ends_when_sink_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ProgressEvent::new(TaskStatus::Starting, 0, "Task accepted")).unwrap();
        drop(tx);

        let events: Vec<_> = progress_stream(rx, ()).collect().await;
        assert_eq!(events.len(), 1);
    }
}
