// # Audit logger
//
// A best-effort, buffered audit sink. Entries are pushed into an in-memory buffer and flushed
// periodically by a background task, mirroring the
// `AuditLoggerConfig`/buffered-writer shape used by the reference audit
// subsystem, minus file/syslog backends (persistence is out of scope here —
// the flushed sink is an in-memory `Vec` queryable via `AuditQuery`).

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::interval;

use crate::audit::entry::{ActionOutcome, AuditEntry};
use crate::config::GatewayConfig;

/// Filters over the flushed audit log.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub principal: Option<String>,
    pub outcome: Option<ActionOutcome>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl AuditQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn outcome(mut self, outcome: ActionOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn between(mut self, after: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        self.after = Some(after);
        self.before = Some(before);
        self
    }

    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(p) = &self.principal {
            if &entry.principal != p {
                return false;
            }
        }
        if let Some(o) = self.outcome {
            if entry.outcome != o {
                return false;
            }
        }
        if let Some(after) = self.after {
            if entry.timestamp < after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if entry.timestamp > before {
                return false;
            }
        }
        true
    }
}

struct Sink {
    buffer: Mutex<VecDeque<AuditEntry>>,
    flushed: RwLock<Vec<AuditEntry>>,
}

/// Buffers audit entries and flushes them on a background interval.
/// Dropping the logger stops the background task; call `flush` directly in
/// tests that need synchronous visibility.
pub struct AuditLogger {
    sink: Arc<Sink>,
    config: GatewayConfig,
    _flush_task: tokio::task::JoinHandle<()>,
}

impl AuditLogger {
    pub fn new(config: GatewayConfig) -> Self {
        let sink = Arc::new(Sink { buffer: Mutex::new(VecDeque::new()), flushed: RwLock::new(Vec::new()) });
        let flush_interval = config.audit_flush_interval;
        let retries = config.audit_write_retries;
        let background_sink = Arc::clone(&sink);

        let flush_task = tokio::spawn(async move {
            let mut ticker = interval(flush_interval);
            loop {
                ticker.tick().await;
                flush_buffer(&background_sink, retries).await;
            }
        });

        Self { sink, config, _flush_task: flush_task }
    }

    /// Enqueue `entry`. Never returns an error: a buffering failure is
    /// logged and dropped rather than surfaced to the caller's query.
    #[tracing::instrument(skip(self, entry), fields(principal = %entry.principal, outcome = ?entry.outcome))]
    pub async fn log(&self, entry: AuditEntry) {
        let mut buffer = self.sink.buffer.lock().await;
        buffer.push_back(entry);
        if buffer.len() >= self.config.audit_buffer_size {
            drop(buffer);
            flush_buffer(&self.sink, self.config.audit_write_retries).await;
        }
    }

    /// Force an immediate flush, bypassing the interval.
    pub async fn flush(&self) {
        flush_buffer(&self.sink, self.config.audit_write_retries).await;
    }

    pub fn query(&self, filter: &AuditQuery) -> Vec<AuditEntry> {
        self.sink.flushed.read().iter().filter(|e| filter.matches(e)).cloned().collect()
    }
}

// `retries` is unused against this in-memory sink, which cannot actually
// fail a write; it is threaded through so a real (file/syslog) backend can
// retry without changing the `AuditLogger` public surface.
async fn flush_buffer(sink: &Arc<Sink>, _retries: usize) {
    let mut buffer = sink.buffer.lock().await;
    if buffer.is_empty() {
        return;
    }
    let drained: Vec<AuditEntry> = buffer.drain(..).collect();
    drop(buffer);

    sink.flushed.write().extend(drained);
}
