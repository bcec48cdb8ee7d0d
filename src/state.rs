use crate::{config::Config, services::engine::SettlementEngine};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub engine: Arc<SettlementEngine>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config, engine: SettlementEngine) -> Self {
        Self {
            db,
            config: Arc::new(config),
            engine: Arc::new(engine),
        }
    }
}
