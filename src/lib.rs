pub mod config;
pub mod db;
pub mod engine;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod utils;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};

#[cfg_attr(not(feature = "mock"), derive(Clone))]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
}

// With sea-orm's `mock` feature on, `DatabaseConnection` does not derive
// `Clone`, so replicate the derive by cloning each variant's inner value.
#[cfg(feature = "mock")]
impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            db: match &self.db {
                DatabaseConnection::SqlxPostgresPoolConnection(conn) => {
                    DatabaseConnection::SqlxPostgresPoolConnection(conn.clone())
                }
                DatabaseConnection::MockDatabaseConnection(conn) => {
                    DatabaseConnection::MockDatabaseConnection(conn.clone())
                }
                DatabaseConnection::Disconnected => DatabaseConnection::Disconnected,
            },
            config: self.config.clone(),
        }
    }
}
