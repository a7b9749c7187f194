use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::migrator::Migrator;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{error, info};

pub type DbPool = DatabaseConnection;

/// Pool settings for the order/cart/catalog database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// `sqlite://...` or `postgres://...`
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            ..Default::default()
        }
    }
}

impl DbConfig {
    fn backend(&self) -> &'static str {
        if self.url.starts_with("sqlite:") {
            "sqlite"
        } else if self.url.starts_with("postgres") {
            "postgres"
        } else {
            "unknown"
        }
    }

    /// Every in-memory SQLite connection is a separate database, so the pool
    /// is pinned to one connection there.
    fn effective_max_connections(&self) -> u32 {
        if self.url.starts_with("sqlite::memory:") || self.url.contains("mode=memory") {
            1
        } else {
            self.max_connections.max(1)
        }
    }
}

/// Opens the connection pool used by the SeaORM stores.
pub async fn establish_connection(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let max_connections = config.effective_max_connections();

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(max_connections)
        .min_connections(config.min_connections.min(max_connections))
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(opt).await.map_err(|e| {
        error!(backend = config.backend(), "could not open order database: {}", e);
        ServiceError::DatabaseError(e)
    })?;

    info!(backend = config.backend(), max_connections, "order database ready");
    Ok(pool)
}

/// Creates or upgrades the `books`, `carts` and `orders` tables.
pub async fn run_migrations(db: &DbPool) -> Result<(), ServiceError> {
    Migrator::up(db, None).await.map_err(|e| {
        error!("schema migration failed: {}", e);
        ServiceError::DatabaseError(e)
    })?;
    info!("schema is up to date");
    Ok(())
}
