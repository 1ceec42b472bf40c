//! Per-invocation correlation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Span, info, warn};
use uuid::Uuid;

/// Identity and labels of one command invocation.
///
/// Every event logged inside [`RunContext::span`] carries the invocation id,
/// so concurrent runs in the same log stream can be told apart.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    /// Unique id of this invocation.
    pub invocation_id: Uuid,
    /// Command being run, e.g. `plan`.
    pub command: String,
    /// When the invocation started.
    pub started_at: DateTime<Utc>,
    /// Free-form labels.
    pub labels: BTreeMap<String, String>,
}

impl RunContext {
    /// Start a context for `command`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            command: command.into(),
            started_at: Utc::now(),
            labels: BTreeMap::new(),
        }
    }

    /// Attach a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Milliseconds since [`RunContext::new`]. Never negative.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0)
    }

    /// First eight hex digits of the invocation id.
    #[must_use]
    pub fn short_id(&self) -> String {
        let simple = self.invocation_id.simple().to_string();
        simple.chars().take(8).collect()
    }

    /// Span carrying the invocation id and command.
    #[must_use]
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "shimload",
            invocation = %self.short_id(),
            command = %self.command,
        )
    }
}

/// Keeps a [`RunContext`] span entered and logs the outcome when finished.
///
/// Dropping the guard without calling [`RunGuard::finish`] logs the
/// invocation as abandoned.
#[must_use = "the span is exited when the guard is dropped"]
pub struct RunGuard {
    context: RunContext,
    entered: Option<tracing::span::EnteredSpan>,
}

impl RunGuard {
    /// Enter the context's span.
    pub fn new(context: RunContext) -> Self {
        let entered = context.span().entered();
        info!(labels = ?context.labels, "Invocation started");
        Self {
            context,
            entered: Some(entered),
        }
    }

    /// The guarded context.
    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Log completion and exit the span.
    pub fn finish(mut self, success: bool) {
        let elapsed_ms = self.context.elapsed_ms();
        if success {
            info!(elapsed_ms, "Invocation finished");
        } else {
            warn!(elapsed_ms, "Invocation failed");
        }
        self.entered = None;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.entered.is_some() {
            warn!(elapsed_ms = self.context.elapsed_ms(), "Invocation abandoned");
        }
    }
}
