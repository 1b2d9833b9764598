// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process realtime store.
//!
//! Keeps the whole site as one JSON tree and fans changes out to path
//! watchers. Used by the test suite and by `STORE_BACKEND=memory`, where an
//! optional seed document stands in for the devices.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;
use uuid::Uuid;

use super::tree::{value_at, write_at};
use super::{segments, PathSubscription, RealtimeStore, StoreError, StoreResult};

struct Watcher {
    path: Vec<String>,
    sender: watch::Sender<Option<Value>>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    watchers: Vec<Watcher>,
    failing_prefix: Option<Vec<String>>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `root` as the whole tree.
    pub fn with_root(root: Value) -> Self {
        let store = Self::new();
        store.write(&[], root);
        store
    }

    /// Synchronous write, for seeding and for tests that emulate devices.
    pub fn put(&self, path: &str, value: Value) -> StoreResult<()> {
        let segs = segments(path)?;
        self.write(&segs, value);
        Ok(())
    }

    /// Synchronous read.
    pub fn read(&self, path: &str) -> StoreResult<Option<Value>> {
        let segs = segments(path)?;
        let inner = self.lock();
        Ok(value_at(&inner.root, &segs).cloned())
    }

    /// Make every write at or below `prefix` fail with a connectivity error
    /// until cleared with `None`. Reads and subscriptions are unaffected.
    pub fn fail_writes_under(&self, prefix: Option<&str>) -> StoreResult<()> {
        let prefix: Option<Vec<String>> = match prefix {
            Some(p) => Some(segments(p)?.into_iter().map(str::to_string).collect()),
            None => None,
        };
        self.lock().failing_prefix = prefix;
        Ok(())
    }

    /// Number of live path watchers.
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.lock();
        inner.watchers.retain(|w| !w.sender.is_closed());
        inner.watchers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(inner: &Inner, segs: &[&str], path: &str) -> StoreResult<()> {
        let blocked = inner.failing_prefix.as_ref().is_some_and(|prefix| {
            segs.len() >= prefix.len() && prefix.iter().zip(segs).all(|(a, b)| a == b)
        });
        if blocked {
            return Err(StoreError::Connectivity(format!("write to `{path}` refused")));
        }
        Ok(())
    }

    fn write(&self, segs: &[&str], value: Value) {
        let mut inner = self.lock();
        write_at(&mut inner.root, segs, value);

        let Inner { root, watchers, .. } = &mut *inner;
        watchers.retain(|w| !w.sender.is_closed());
        for watcher in watchers.iter() {
            let path: Vec<&str> = watcher.path.iter().map(String::as_str).collect();
            let latest = value_at(root, &path).cloned();
            watcher.sender.send_if_modified(|current| {
                if *current == latest {
                    false
                } else {
                    *current = latest;
                    true
                }
            });
        }
    }
}

#[async_trait]
impl RealtimeStore for InMemoryStore {
    fn subscribe(&self, path: &str) -> PathSubscription {
        let segs = match segments(path) {
            Ok(segs) => segs,
            Err(e) => {
                warn!(path = %path, error = %e, "Refusing to subscribe to invalid path");
                let (_, receiver) = watch::channel(None);
                return PathSubscription::new(receiver, None);
            }
        };
        let mut inner = self.lock();

        let initial = value_at(&inner.root, &segs).cloned();
        let (sender, mut receiver) = watch::channel(initial);
        receiver.mark_changed();

        inner.watchers.push(Watcher {
            path: segs.iter().map(|s| s.to_string()).collect(),
            sender,
        });
        PathSubscription::new(receiver, None)
    }

    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        self.read(path)
    }

    async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let segs = segments(path)?;
        Self::check_writable(&self.lock(), &segs, path)?;
        self.write(&segs, value);
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        let key = format!("-{}", Uuid::new_v4().simple());
        let mut segs = segments(path)?;
        Self::check_writable(&self.lock(), &segs, path)?;

        segs.push(&key);
        self.write(&segs, value);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn first_value_is_delivered_as_a_change() {
        let store = InMemoryStore::new();
        store.put("site/env", json!({ "ambient_temp_c": 31.0 })).unwrap();

        let mut empty = store.subscribe("site/iot/vitals");
        assert_eq!(empty.next().await, Some(None));

        let mut env = store.subscribe("site/env");
        assert_eq!(env.next().await, Some(Some(json!({ "ambient_temp_c": 31.0 }))));
    }

    #[tokio::test]
    async fn writes_below_and_above_a_watched_path_notify_it() {
        let store = InMemoryStore::new();
        let mut workers = store.subscribe("site/workers");
        assert_eq!(workers.next().await, Some(None));

        store.set("site/workers/W1", json!({ "heart_rate_bpm": 80 })).await.unwrap();
        assert_eq!(
            workers.next().await,
            Some(Some(json!({ "W1": { "heart_rate_bpm": 80 } })))
        );

        store.set("site", Value::Null).await.unwrap();
        assert_eq!(workers.next().await, Some(None));
    }

    #[tokio::test]
    async fn unrelated_writes_do_not_wake_watchers() {
        let store = InMemoryStore::new();
        let mut vitals = store.subscribe("site/iot/vitals");
        vitals.next().await;

        store.set("site/env/weather", json!("Rain")).await.unwrap();
        let (mut receiver, _) = vitals.into_parts();
        assert!(!receiver.has_changed().unwrap());
        assert!(receiver.borrow_and_update().is_none());
    }

    #[tokio::test]
    async fn push_assigns_unique_keys() {
        let store = InMemoryStore::new();
        let a = store.push("site/commands", json!({ "n": 1 })).await.unwrap();
        let b = store.push("site/commands", json!({ "n": 2 })).await.unwrap();
        assert_ne!(a, b);

        let commands = store.get("site/commands").await.unwrap().unwrap();
        assert_eq!(commands.as_object().unwrap().len(), 2);
        assert_eq!(commands[&a]["n"], 1);
    }

    #[tokio::test]
    async fn injected_write_failures_are_scoped() {
        let store = InMemoryStore::new();
        store.fail_writes_under(Some("site/commands")).unwrap();

        let err = store.push("site/commands", json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::Connectivity(_)));
        assert!(store.set("site/rest_requests/r1/status", json!("DENIED")).await.is_ok());

        store.fail_writes_under(None).unwrap();
        assert!(store.push("site/commands", json!({ "ok": true })).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_released() {
        let store = InMemoryStore::new();
        let sub = store.subscribe("site/workers");
        assert_eq!(store.watcher_count(), 1);
        drop(sub);
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn invalid_paths_get_a_closed_subscription() {
        let store = InMemoryStore::with_root(json!({ "site": { "env": { "weather": "Clear" } } }));
        let mut sub = store.subscribe("site/workers/W1.json");

        assert_eq!(store.watcher_count(), 0);
        assert_eq!(sub.current(), None);
        assert_eq!(sub.next().await, None);
    }

    #[test]
    fn with_root_seeds_the_tree() {
        let store = InMemoryStore::with_root(json!({ "site": { "env": { "weather": "Clear" } } }));
        assert_eq!(store.read("site/env/weather").unwrap(), Some(json!("Clear")));
    }
}
