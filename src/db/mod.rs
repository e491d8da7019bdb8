use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;

pub mod migrator;
pub mod repositories;

pub use repositories::user::{InsertOutcome, User};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    /// Connects, creating the SQLite file if needed, and applies pending
    /// migrations so the schema exists before any request is served.
    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)
                    .with_context(|| format!("Failed to create database file {path_str}"))?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt)
            .await
            .with_context(|| format!("Failed to connect to database {db_url}"))?;

        migrator::Migrator::up(&conn, None)
            .await
            .context("Failed to apply database migrations")?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    // ========== User Repository Methods ==========

    #[must_use]
    pub fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    pub async fn user_email_exists(&self, email: &str) -> Result<bool> {
        self.user_repo().email_exists(email).await
    }

    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        security: &SecurityConfig,
    ) -> Result<InsertOutcome> {
        self.user_repo()
            .insert(name, email, password, security)
            .await
    }

    pub async fn verify_user_password(
        &self,
        email: &str,
        password: &str,
        security: &SecurityConfig,
    ) -> Result<Option<User>> {
        self.user_repo()
            .verify_password(email, password, security)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db_url() -> (String, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("imgclass-store-{}.db", uuid::Uuid::new_v4()));
        (format!("sqlite:{}", path.display()), path)
    }

    fn cheap_params() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
        }
    }

    #[tokio::test]
    async fn creates_schema_and_enforces_unique_email() {
        let (url, path) = temp_db_url();
        let store = Store::new(&url).await.unwrap();
        store.ping().await.unwrap();

        let first = store
            .create_user("A", "a@x.com", "p", &cheap_params())
            .await
            .unwrap();
        assert!(matches!(first, InsertOutcome::Created(_)));

        let second = store
            .create_user("B", "a@x.com", "other", &cheap_params())
            .await
            .unwrap();
        assert!(matches!(second, InsertOutcome::EmailTaken));

        let stored = store
            .verify_user_password("a@x.com", "p", &cheap_params())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "A");

        // Exact match only.
        assert!(!store.user_email_exists("A@X.COM").await.unwrap());

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn verifies_passwords() {
        let (url, path) = temp_db_url();
        let store = Store::new(&url).await.unwrap();

        store
            .create_user("A", "a@x.com", "p", &cheap_params())
            .await
            .unwrap();

        let params = cheap_params();
        assert!(store.verify_user_password("a@x.com", "p", &params).await.unwrap().is_some());
        assert!(store.verify_user_password("a@x.com", "q", &params).await.unwrap().is_none());
        assert!(store.verify_user_password("b@x.com", "p", &params).await.unwrap().is_none());

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn unknown_email_still_runs_argon2() {
        let (url, path) = temp_db_url();
        let store = Store::new(&url).await.unwrap();

        // Parallelism 0 is rejected by Argon2, so an error here proves the
        // hash ran even though no user matched.
        let unusable = SecurityConfig {
            argon2_parallelism: 0,
            ..cheap_params()
        };
        assert!(
            store
                .verify_user_password("nobody@x.com", "p", &unusable)
                .await
                .is_err()
        );

        let _ = std::fs::remove_file(path);
    }
}
