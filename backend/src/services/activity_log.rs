use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{models::activity_log::ActivityEvent, repositories::activity_log as activity_log_repo};

/// Append-only activity sink. Implementations must be safe to call from any
/// request handler; consumers treat every append as fire-and-forget.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(&self, event: ActivityEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct PgActivityLog {
    pool: PgPool,
}

impl PgActivityLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLog for PgActivityLog {
    async fn append(&self, event: ActivityEvent) -> anyhow::Result<()> {
        activity_log_repo::insert_activity_event(&self.pool, &event).await?;
        Ok(())
    }
}

/// Detaches the write from the request. A failed append is logged and
/// dropped; it never blocks or fails the authentication operation.
pub fn record(log: &Arc<dyn ActivityLog>, event: ActivityEvent) {
    let log = Arc::clone(log);
    tokio::spawn(async move {
        let event_type = event.event_type.clone();
        if let Err(err) = log.append(event).await {
            tracing::warn!(error = ?err, event_type = %event_type, "Failed to record activity event");
        }
    });
}
