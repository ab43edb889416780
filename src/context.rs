//! Per-request correlation: id, start time, and the audit sink hooks report into.

use crate::audit::{ActivityEntry, ActivityRecord, AuditSink};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Header carrying the request id in and out.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Lives for one inbound request; every audit entry written through it shares its id.
#[derive(Clone)]
pub struct RequestContext {
    request_id: String,
    started: Instant,
    start_time: DateTime<Utc>,
    audit: Arc<dyn AuditSink>,
}

impl RequestContext {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self::with_request_id(uuid::Uuid::new_v4().to_string(), audit)
    }

    pub fn with_request_id(request_id: impl Into<String>, audit: Arc<dyn AuditSink>) -> Self {
        RequestContext {
            request_id: request_id.into(),
            started: Instant::now(),
            start_time: Utc::now(),
            audit,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn processing_time(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record an activity entry on a detached task. Sink failures are logged and
    /// swallowed; the returned handle only matters to callers that must observe the write.
    pub fn log_activity(&self, entry: ActivityEntry) -> JoinHandle<()> {
        let record = ActivityRecord::stamp(entry, &self.request_id);
        let audit = self.audit.clone();
        let request_id = self.request_id.clone();
        tokio::spawn(async move {
            if let Err(e) = audit.record(record).await {
                tracing::warn!(request_id = %request_id, error = %e, "activity log failed");
            }
        })
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("start_time", &self.start_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::error::AppError;
    use async_trait::async_trait;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _record: ActivityRecord) -> Result<(), AppError> {
            Err(AppError::Store("audit table missing".into()))
        }
    }

    #[tokio::test]
    async fn entries_share_the_request_id() {
        let sink = MemoryAuditSink::new();
        let ctx = RequestContext::with_request_id("req-1", Arc::new(sink.clone()));
        ctx.log_activity(ActivityEntry::new("create", "product")).await.unwrap();
        ctx.log_activity(ActivityEntry::new("create", "stock_entry")).await.unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.request_id == "req-1"));
    }

    struct SlowSink(MemoryAuditSink);

    #[async_trait]
    impl AuditSink for SlowSink {
        async fn record(&self, record: ActivityRecord) -> Result<(), AppError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.0.record(record).await
        }
    }

    #[tokio::test]
    async fn slow_sink_does_not_hold_up_the_caller() {
        let sink = MemoryAuditSink::new();
        let ctx = RequestContext::new(Arc::new(SlowSink(sink.clone())));
        let started = Instant::now();
        let pending = ctx.log_activity(ActivityEntry::new("update", "product"));
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(sink.records().is_empty());
        pending.await.unwrap();
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn sink_failure_is_swallowed() {
        let ctx = RequestContext::new(Arc::new(FailingSink));
        ctx.log_activity(ActivityEntry::new("delete", "product")).await.unwrap();
        assert!(!ctx.request_id().is_empty());
    }
}
