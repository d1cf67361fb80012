// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Handle for a long-lived background listener.

use tokio::task::JoinHandle;

/// Owns a listener task. The task stops when the handle is released or dropped.
#[must_use = "dropping a Subscription stops the listener"]
pub struct Subscription {
    name: &'static str,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(name: &'static str, task: JoinHandle<()>) -> Self {
        Self {
            name,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the listener and wait for it to wind down.
    pub async fn release(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Cancelled is the expected outcome
            let _ = task.await;
            tracing::debug!(subscription = self.name, "Subscription released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
