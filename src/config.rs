use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub settlement: SettlementSettings,
}

/// Tunables for the settlement engine's commit path.
#[derive(Debug, Clone)]
pub struct SettlementSettings {
    /// Quiet interval before a single-field edit is persisted.
    pub field_commit_window: Duration,
    /// Quiet interval before a multi-field edit is persisted.
    pub batch_commit_window: Duration,
    pub commit_retry_delay: Duration,
    pub commit_max_retries: u32,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            field_commit_window: Duration::from_millis(800),
            batch_commit_window: Duration::from_millis(1000),
            commit_retry_delay: Duration::from_millis(2000),
            commit_max_retries: 5,
        }
    }
}

impl SettlementSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            field_commit_window: millis_var("SETTLEMENT_FIELD_COMMIT_MS")
                .unwrap_or(defaults.field_commit_window),
            batch_commit_window: millis_var("SETTLEMENT_BATCH_COMMIT_MS")
                .unwrap_or(defaults.batch_commit_window),
            commit_retry_delay: millis_var("SETTLEMENT_COMMIT_RETRY_MS")
                .unwrap_or(defaults.commit_retry_delay),
            commit_max_retries: env::var("SETTLEMENT_COMMIT_MAX_RETRIES")
                .ok()
                .map(|v| {
                    v.parse()
                        .expect("SETTLEMENT_COMMIT_MAX_RETRIES must be a number")
                })
                .unwrap_or(defaults.commit_max_retries),
        }
    }
}

fn millis_var(key: &str) -> Option<Duration> {
    env::var(key).ok().map(|v| {
        let ms: u64 = v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number of milliseconds"));
        Duration::from_millis(ms)
    })
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a valid port number"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .expect("DATABASE_MAX_CONNECTIONS must be a number"),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            settlement: SettlementSettings::from_env(),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
