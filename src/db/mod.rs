use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Open the shared connection pool. Every request-scoped unit of work,
/// including the reservation engine's locked transaction, draws its
/// connection from this pool.
pub async fn connect(config: &Config) -> AppResult<DatabaseConnection> {
    let mut options = ConnectOptions::new(&config.database_url);
    // Request logging is handled by the HTTP trace layer; per-statement
    // sqlx logs only add noise on the booking hot path.
    options.max_connections(20).sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .map_err(|e| AppError::Internal(format!("Database connection failed: {}", e)))?;

    tracing::debug!("Database connection pool ready");
    Ok(db)
}
