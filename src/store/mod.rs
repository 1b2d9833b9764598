// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Realtime Store Contract
//!
//! The shared key-value store that edge devices, the backend simulator and
//! this service all talk through. Values are JSON documents addressed by
//! slash-separated paths; subscribers see the whole document at a path every
//! time anything beneath it changes.
//!
//! ## Implementations
//!
//! - [`InMemoryStore`] - process-local tree, used by tests and demo mode
//! - [`FirebaseStore`] - Firebase Realtime Database over REST + SSE
//!
//! ## Semantics
//!
//! - Writing `null` deletes a path; a path with no data reads as `None`
//! - `push` appends a child under a store-assigned key and returns that key
//! - Subscriptions are latest-value: intermediate states may be skipped
//! - Transport failures are retried by the adapter, never by callers, and
//!   surface to subscribers as the path going absent

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::DropGuard;

pub mod firebase;
pub mod memory;
mod tree;

pub use firebase::FirebaseStore;
pub use memory::InMemoryStore;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unreachable: {0}")]
    Connectivity(String),

    /// The store answered with a non-success status.
    #[error("store rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid store path: {0}")]
    InvalidPath(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Live view of one path.
///
/// The first value (including `None` for an empty path) is delivered as a
/// change so consumers can tell "loaded but empty" from "not loaded yet".
/// Dropping the subscription stops any background listener behind it.
pub struct PathSubscription {
    receiver: watch::Receiver<Option<Value>>,
    _listener: Option<DropGuard>,
}

impl PathSubscription {
    pub(crate) fn new(receiver: watch::Receiver<Option<Value>>, listener: Option<DropGuard>) -> Self {
        Self {
            receiver,
            _listener: listener,
        }
    }

    /// Split into the raw receiver and the listener guard.
    ///
    /// The guard must be kept alive for as long as updates are wanted.
    pub fn into_parts(self) -> (watch::Receiver<Option<Value>>, Option<DropGuard>) {
        (self.receiver, self._listener)
    }

    /// Wait for the next value. Returns `None` once the source is gone.
    pub async fn next(&mut self) -> Option<Option<Value>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Latest value without waiting.
    pub fn current(&self) -> Option<Value> {
        self.receiver.borrow().clone()
    }
}

/// Publish/subscribe access to the realtime store.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Subscribe to the value at `path`. Must be called inside a tokio runtime.
    fn subscribe(&self, path: &str) -> PathSubscription;

    /// One-shot read.
    async fn get(&self, path: &str) -> StoreResult<Option<Value>>;

    /// Replace the value at `path`.
    async fn set(&self, path: &str, value: Value) -> StoreResult<()>;

    /// Append `value` under a new store-assigned child of `path`.
    async fn push(&self, path: &str, value: Value) -> StoreResult<String>;
}

/// Split a store path into non-empty segments.
pub(crate) fn segments(path: &str) -> StoreResult<Vec<&str>> {
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segs
        .iter()
        .any(|s| s.contains(['.', '#', '$', '[', ']']))
    {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segs)
}
