// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Firebase Realtime Database adapter.
//!
//! Reads stream over the REST API as server-sent events
//! (`Accept: text/event-stream`); writes are plain REST calls:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `subscribe` | `GET {path}.json` streaming `put` / `patch` events |
//! | `get` | `GET {path}.json` |
//! | `set` | `PUT {path}.json` |
//! | `push` | `POST {path}.json` returning `{ "name": "<key>" }` |
//!
//! Each subscription owns one listener task. A dropped connection, a
//! `cancel` or an `auth_revoked` event publishes `None` (the path goes
//! offline) and the listener reconnects after `reconnect_delay`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::tree::{value_at, write_at};
use super::{segments, PathSubscription, RealtimeStore, StoreError, StoreResult};

/// Timeout for one-shot REST calls. Streams have no timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

pub struct FirebaseStore {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
    reconnect_delay: Duration,
}

impl FirebaseStore {
    /// Adapter for the database at `base_url`
    /// (e.g. `https://harmony-aura-default-rtdb.firebaseio.com`).
    pub fn new(base_url: &str, auth_token: Option<String>) -> StoreResult<Self> {
        let mut url = Url::parse(base_url)
            .map_err(|e| StoreError::InvalidPath(format!("database url `{base_url}`: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(StoreError::InvalidPath(format!(
                "database url `{base_url}` cannot be a base"
            )));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let client = Client::builder()
            .build()
            .map_err(|e| StoreError::Connectivity(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: url,
            auth_token: auth_token.filter(|t| !t.trim().is_empty()),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        })
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    fn url_for(&self, path: &str) -> StoreResult<Url> {
        let joined = segments(path)?.join("/");
        let mut url = self
            .base_url
            .join(&format!("{joined}.json"))
            .map_err(|e| StoreError::InvalidPath(format!("{path}: {e}")))?;
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }
}

#[async_trait]
impl RealtimeStore for FirebaseStore {
    fn subscribe(&self, path: &str) -> PathSubscription {
        let (tx, rx) = watch::channel(None);
        let token = CancellationToken::new();

        match self.url_for(path) {
            Ok(url) => {
                let listener = Listener {
                    client: self.client.clone(),
                    url,
                    path: path.to_string(),
                    reconnect_delay: self.reconnect_delay,
                    tx,
                    announced: AtomicBool::new(false),
                };
                tokio::spawn(listener.run(token.clone()));
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Refusing to subscribe to invalid path");
            }
        }

        PathSubscription::new(rx, Some(token.drop_guard()))
    }

    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let response = self
            .client
            .get(self.url_for(path)?)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(connectivity)?;
        let value: Value = check_status(response).await?.json().await.map_err(connectivity)?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let response = self
            .client
            .put(self.url_for(path)?)
            .timeout(REQUEST_TIMEOUT)
            .json(&value)
            .send()
            .await
            .map_err(connectivity)?;
        check_status(response).await?;
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        #[derive(Deserialize)]
        struct PushResponse {
            name: String,
        }

        let response = self
            .client
            .post(self.url_for(path)?)
            .timeout(REQUEST_TIMEOUT)
            .json(&value)
            .send()
            .await
            .map_err(connectivity)?;
        let pushed: PushResponse = check_status(response).await?.json().await.map_err(connectivity)?;
        Ok(pushed.name)
    }
}

fn connectivity(e: reqwest::Error) -> StoreError {
    StoreError::Connectivity(e.to_string())
}

async fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        body,
    })
}

// =============================================================================
// Streaming listener
// =============================================================================

struct Listener {
    client: Client,
    url: Url,
    path: String,
    reconnect_delay: Duration,
    tx: watch::Sender<Option<Value>>,
    announced: AtomicBool,
}

impl Listener {
    async fn run(self, token: CancellationToken) {
        debug!(path = %self.path, "Realtime listener starting");

        loop {
            let outcome = tokio::select! {
                _ = token.cancelled() => break,
                _ = self.tx.closed() => break,
                outcome = self.stream_once() => outcome,
            };

            if let Err(e) = outcome {
                warn!(
                    path = %self.path,
                    error = %e,
                    retry_in_ms = self.reconnect_delay.as_millis() as u64,
                    "Realtime stream interrupted"
                );
            }
            self.publish(None);

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {},
                _ = token.cancelled() => break,
            }
        }

        debug!(path = %self.path, "Realtime listener stopped");
    }

    async fn stream_once(&self) -> StoreResult<()> {
        let response = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(connectivity)?;
        let mut response = check_status(response).await?;
        info!(path = %self.path, "Realtime stream connected");

        let mut decoder = SseDecoder::default();
        let mut cache = Value::Null;
        loop {
            let Some(chunk) = response.chunk().await.map_err(connectivity)? else {
                return Err(StoreError::Connectivity("stream closed by server".to_string()));
            };
            for event in decoder.feed(&chunk) {
                if apply_event(&mut cache, &event)? {
                    self.publish(value_at(&cache, &[]).cloned());
                }
            }
        }
    }

    /// The first publish always notifies so an empty path still counts as
    /// loaded; later ones only when the value actually changed.
    fn publish(&self, value: Option<Value>) {
        if !self.announced.swap(true, Ordering::Relaxed) {
            self.tx.send_replace(value);
            return;
        }
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` parser. Events may be split across
/// network chunks arbitrarily.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block[..end])) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event: event.unwrap_or_else(|| "message".to_string()),
        data: data.join("\n"),
    })
}

#[derive(Deserialize)]
struct StreamUpdate {
    path: String,
    data: Value,
}

/// Apply one RTDB stream event to the cached value at the subscribed path.
/// Returns whether the cache changed.
fn apply_event(cache: &mut Value, event: &SseEvent) -> StoreResult<bool> {
    match event.event.as_str() {
        "put" => {
            let update: StreamUpdate = serde_json::from_str(&event.data)?;
            write_at(cache, &segments(&update.path)?, update.data);
            Ok(true)
        }
        "patch" => {
            let update: StreamUpdate = serde_json::from_str(&event.data)?;
            let base = segments(&update.path)?;
            let Value::Object(children) = update.data else {
                return Ok(false);
            };
            for (child, value) in children {
                let mut segs = base.clone();
                segs.extend(segments(&child)?);
                write_at(cache, &segs, value);
            }
            Ok(true)
        }
        "keep-alive" => Ok(false),
        "cancel" => Err(StoreError::Connectivity(format!(
            "stream cancelled by server: {}",
            event.data
        ))),
        "auth_revoked" => Err(StoreError::Connectivity(
            "stream credential revoked".to_string(),
        )),
        other => {
            debug!(event = %other, "Ignoring unknown stream event");
            Ok(false)
        }
    }
}
