// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process registry of pending operator tasks.
//!
//! The host OS renders these as actionable items next to the service; we
//! only track which are pending and why. Rebuilt on restart from stored
//! state, never persisted.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;
use utoipa::ToSchema;

/// A task waiting on the operator.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct PendingTask {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    inner: Mutex<BTreeMap<String, String>>,
}

impl TaskRegistry {
    /// Register a task; replaces the reason if already pending.
    pub fn create(&self, id: &str, reason: &str) {
        self.inner
            .lock()
            .expect("task registry lock")
            .insert(id.to_string(), reason.to_string());
    }

    /// Remove a task. Returns whether it was pending.
    pub fn clear(&self, id: &str) -> bool {
        self.inner
            .lock()
            .expect("task registry lock")
            .remove(id)
            .is_some()
    }

    pub fn list(&self) -> Vec<PendingTask> {
        self.inner
            .lock()
            .expect("task registry lock")
            .iter()
            .map(|(id, reason)| PendingTask {
                id: id.clone(),
                reason: reason.clone(),
            })
            .collect()
    }
}
