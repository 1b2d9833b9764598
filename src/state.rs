// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::sync::watch;

use crate::dispatch::CommandDispatcher;
use crate::telemetry::SiteSnapshot;

#[derive(Clone)]
pub struct AppState {
    /// Latest fused view published by the telemetry subscription.
    pub telemetry: watch::Receiver<Arc<SiteSnapshot>>,
    pub dispatcher: Arc<CommandDispatcher>,
}

impl AppState {
    pub fn new(telemetry: watch::Receiver<Arc<SiteSnapshot>>, dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            telemetry,
            dispatcher,
        }
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<SiteSnapshot> {
        self.telemetry.borrow().clone()
    }
}
