use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::error::{PoolError, Result};

/// Connection to the ledger database. Wraps SeaORM connection management
/// and schema migrations; all reads and writes go through `connection`.
#[derive(Debug, Clone)]
pub struct DatabaseService {
    url: String,
    pub connection: DatabaseConnection,
}

impl DatabaseService {
    pub async fn new(database_url: &str) -> Result<Self> {
        let mut opt = ConnectOptions::new(database_url.to_owned());

        opt.max_connections(50)
            .min_connections(2)
            .connect_timeout(Duration::from_secs(8))
            .idle_timeout(Duration::from_secs(60))
            .sqlx_logging(false);

        let connection = Database::connect(opt)
            .await
            .map_err(|err| PoolError::Database {
                message: format!("failed to connect to ledger: {err}"),
                source: Some(Box::new(err)),
            })?;

        Ok(DatabaseService {
            url: database_url.to_owned(),
            connection,
        })
    }

    /// Variant with explicit pool sizing. In-memory SQLite ledgers need a
    /// single connection, otherwise every pooled connection would get its
    /// own empty database.
    pub async fn new_with_options(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        let mut opt = ConnectOptions::new(database_url.to_owned());

        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let connection = Database::connect(opt)
            .await
            .map_err(|err| PoolError::Database {
                message: format!("failed to connect to ledger: {err}"),
                source: Some(Box::new(err)),
            })?;

        Ok(DatabaseService {
            url: database_url.to_owned(),
            connection,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn migrate(&self) -> Result<()> {
        Migrator::up(&self.connection, None)
            .await
            .map_err(|err| PoolError::Database {
                message: format!("failed to run migrations: {err}"),
                source: Some(Box::new(err)),
            })?;

        tracing::info!("ledger migrations applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        self.connection
            .ping()
            .await
            .map_err(|err| PoolError::Database {
                message: format!("ledger ping failed: {err}"),
                source: Some(Box::new(err)),
            })
    }
}
