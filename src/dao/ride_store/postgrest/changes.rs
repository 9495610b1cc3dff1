//! Change feed fed by a server-sent-events endpoint publishing
//! `{"table": "...", "type": "INSERT|UPDATE|DELETE"}` frames.

use std::{sync::Arc, time::Duration};

use futures::{Stream, StreamExt, pin_mut};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::dao::changes::{ChangeEvent, ChangeFeed, ChannelStatus, Subscription, Table};

use super::{error::PostgrestError, store::PostgrestRideStore};

const SUBSCRIPTION_BUFFER: usize = 32;

/// Splits an event stream into the `data` payloads of its complete events.
#[derive(Debug, Default)]
struct EventStreamDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl EventStreamDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut complete = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if !self.data.is_empty() {
                    complete.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data.push(value.trim_start().to_string());
            }
            // Comments (`:`), `event:` and `id:` fields carry nothing we need.
        }
        complete
    }
}

/// Decode a byte stream into change events.
fn change_events<S, B, E>(bytes: S) -> impl Stream<Item = Result<ChangeEvent, ChangeStreamError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ChangeStreamError>,
{
    async_stream::stream! {
        let mut decoder = EventStreamDecoder::default();
        pin_mut!(bytes);
        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err::<ChangeEvent, ChangeStreamError>(err.into());
                    return;
                }
            };
            for payload in decoder.feed(chunk.as_ref()) {
                yield serde_json::from_str::<ChangeEvent>(&payload).map_err(|source| {
                    ChangeStreamError::Decode(PostgrestError::DecodeChange { payload, source })
                });
            }
        }
    }
}

#[derive(Debug)]
enum ChangeStreamError {
    Transport(reqwest::Error),
    Decode(PostgrestError),
}

impl From<reqwest::Error> for ChangeStreamError {
    fn from(err: reqwest::Error) -> Self {
        ChangeStreamError::Transport(err)
    }
}

/// Change feed reading the deployment's table-change event stream.
#[derive(Clone)]
pub struct PostgrestChangeFeed {
    store: PostgrestRideStore,
    url: Arc<str>,
    subscribe_timeout: Duration,
}

impl PostgrestChangeFeed {
    /// Returns `None` when no change-stream endpoint is configured.
    pub fn new(store: &PostgrestRideStore, subscribe_timeout: Duration) -> Option<Self> {
        let url = store.config.changes_url.as_deref()?;
        Some(Self {
            store: store.clone(),
            url: Arc::from(url),
            subscribe_timeout,
        })
    }
}

impl ChangeFeed for PostgrestChangeFeed {
    fn subscribe(&self, tables: Vec<Table>) -> Subscription {
        let (event_tx, event_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Connecting);
        let feed = self.clone();

        let task = tokio::spawn(async move {
            let names = tables
                .iter()
                .map(|table| table.name())
                .collect::<Vec<_>>()
                .join(",");
            let request = feed
                .store
                .client
                .get(feed.url.as_ref())
                .query(&[("tables", names.as_str())])
                .header("apikey", feed.store.anon_key.as_ref())
                .header("Accept", "text/event-stream")
                .bearer_auth(feed.store.bearer())
                .send();

            let response = match tokio::time::timeout(feed.subscribe_timeout, request).await {
                Err(_) => {
                    warn!(url = %feed.url, "change stream did not answer in time");
                    let _ = status_tx.send(ChannelStatus::TimedOut);
                    return;
                }
                Ok(Err(err)) => {
                    warn!(url = %feed.url, error = %err, "change stream connection failed");
                    let _ = status_tx.send(ChannelStatus::ChannelError);
                    return;
                }
                Ok(Ok(response)) if !response.status().is_success() => {
                    warn!(url = %feed.url, status = %response.status(), "change stream refused");
                    let _ = status_tx.send(ChannelStatus::ChannelError);
                    return;
                }
                Ok(Ok(response)) => response,
            };

            info!(tables = %names, "change stream subscribed");
            let _ = status_tx.send(ChannelStatus::Subscribed);

            let events = change_events(response.bytes_stream());
            pin_mut!(events);
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) if tables.contains(&event.table) => {
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(event) => debug!(?event, "ignoring change on unwatched table"),
                    Err(ChangeStreamError::Decode(err)) => {
                        warn!(error = %err, "skipping malformed change frame");
                    }
                    Err(ChangeStreamError::Transport(err)) => {
                        warn!(error = %err, "change stream interrupted");
                        let _ = status_tx.send(ChannelStatus::ChannelError);
                        return;
                    }
                }
            }
            let _ = status_tx.send(ChannelStatus::Closed);
        });

        Subscription::new(event_rx, status_rx, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::changes::ChangeKind;

    #[test]
    fn decoder_handles_split_frames_and_comments() {
        let mut decoder = EventStreamDecoder::default();
        assert!(decoder.feed(b": keep-alive\n\nda").is_empty());
        assert!(decoder.feed(b"ta: {\"table\":\"rides\",").is_empty());
        let frames = decoder.feed(b"\"type\":\"INSERT\"}\r\n\r\n");
        assert_eq!(frames, vec![r#"{"table":"rides","type":"INSERT"}"#.to_string()]);
    }

    #[tokio::test]
    async fn stream_yields_events_and_skips_garbage() {
        let chunks: Vec<Result<&[u8], reqwest::Error>> = vec![
            Ok(&b"data: {\"table\":\"ride_participants\",\"type\":\"DELETE\"}\n\n"[..]),
            Ok(&b"data: not json\n\n"[..]),
            Ok(&b"event: change\ndata: {\"table\":\"rides\",\"type\":\"UPDATE\"}\n\n"[..]),
        ];
        let events: Vec<_> = change_events(futures::stream::iter(chunks)).collect().await;

        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            Ok(ChangeEvent { table: Table::RideParticipants, kind: ChangeKind::Delete })
        ));
        assert!(matches!(events[1], Err(ChangeStreamError::Decode(_))));
        assert!(matches!(
            events[2],
            Ok(ChangeEvent { table: Table::Rides, kind: ChangeKind::Update })
        ));
    }
}
