use std::sync::Arc;

use sqlx::PgPool;

use crate::{config::Config, services::activity_log::ActivityLog};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Best-effort activity sink; failures are logged, never propagated.
    pub activity_log: Arc<dyn ActivityLog>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, activity_log: Arc<dyn ActivityLog>) -> Self {
        Self {
            pool,
            config,
            activity_log,
        }
    }
}
