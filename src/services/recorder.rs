use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clickhouse::Client;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::models::log_event::{
    AdminActionEvent, AdminActionRow, ErrorEvent, ErrorRow, HttpRequestEvent, HttpRequestRow,
};

/// A sanitized row waiting to be written.
#[derive(Debug, Clone)]
pub enum LogEventRow {
    HttpRequest(HttpRequestRow),
    AdminAction(AdminActionRow),
    Error(ErrorRow),
}

impl LogEventRow {
    pub fn table(&self) -> &'static str {
        match self {
            LogEventRow::HttpRequest(_) => "http_requests",
            LogEventRow::AdminAction(_) => "admin_actions",
            LogEventRow::Error(_) => "errors",
        }
    }
}

/// Destination for sanitized rows. Kept as a trait so the writer task can
/// be exercised without a live store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn write(&self, row: LogEventRow) -> anyhow::Result<()>;
}

/// Writes rows through the official client, one row per insert. The store
/// handles concurrent inserts; no coordination is needed here.
pub struct ClickHouseSink {
    client: Client,
}

impl ClickHouseSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventSink for ClickHouseSink {
    async fn write(&self, row: LogEventRow) -> anyhow::Result<()> {
        match row {
            LogEventRow::HttpRequest(row) => {
                let mut insert = self.client.insert("http_requests")?;
                insert.write(&row).await?;
                insert.end().await?;
            }
            LogEventRow::AdminAction(row) => {
                let mut insert = self.client.insert("admin_actions")?;
                insert.write(&row).await?;
                insert.end().await?;
            }
            LogEventRow::Error(row) => {
                let mut insert = self.client.insert("errors")?;
                insert.write(&row).await?;
                insert.end().await?;
            }
        }
        Ok(())
    }
}

/// Accepts events from the request path and hands them to a background
/// writer through a bounded queue. Enqueueing never blocks and never fails
/// the caller; when the queue is full the oldest pending event is dropped
/// and counted.
pub struct LogRecorder {
    queue: Mutex<VecDeque<LogEventRow>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl LogRecorder {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn record_http_request(&self, event: HttpRequestEvent) {
        self.enqueue(LogEventRow::HttpRequest(event.into()));
    }

    pub fn record_admin_action(&self, event: AdminActionEvent) {
        self.enqueue(LogEventRow::AdminAction(event.into()));
    }

    pub fn record_error(&self, event: ErrorEvent) {
        self.enqueue(LogEventRow::Error(event.into()));
    }

    /// Total events discarded because the queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn pending_events(&self) -> usize {
        self.queue.lock().expect("log queue poisoned").len()
    }

    /// Removes and returns everything currently queued. Used by tests that
    /// run without a writer task.
    pub fn drain_pending(&self) -> Vec<LogEventRow> {
        self.queue
            .lock()
            .expect("log queue poisoned")
            .drain(..)
            .collect()
    }

    fn enqueue(&self, row: LogEventRow) {
        {
            let mut queue = self.queue.lock().expect("log queue poisoned");
            if queue.len() >= self.capacity {
                queue.pop_front();
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    dropped_total = total,
                    capacity = self.capacity,
                    "Log queue full, dropped oldest pending event"
                );
            }
            queue.push_back(row);
        }
        self.notify.notify_one();
    }

    async fn next(&self) -> LogEventRow {
        loop {
            let notified = self.notify.notified();
            if let Some(row) = self.queue.lock().expect("log queue poisoned").pop_front() {
                return row;
            }
            notified.await;
        }
    }

    /// Spawns the background writer draining this queue into `sink`. A
    /// failed insert is logged and dropped; retrying inline would block
    /// everything queued behind it.
    pub fn spawn_writer(self: &Arc<Self>, sink: Arc<dyn EventSink>) -> JoinHandle<()> {
        let recorder = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let row = recorder.next().await;
                let table = row.table();
                if let Err(err) = sink.write(row).await {
                    tracing::error!(error = ?err, table, "Failed to write log event");
                }
            }
        })
    }
}
