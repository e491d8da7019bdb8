//! `SeaORM` implementation of the `AuthService` trait.

use crate::config::SecurityConfig;
use crate::db::{InsertOutcome, Store};
use crate::services::auth_service::{AuthError, AuthService, UserInfo};
use async_trait::async_trait;
use tracing::info;

pub struct SeaOrmAuthService {
    store: Store,
    security: SecurityConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store, security: SecurityConfig) -> Self {
        Self { store, security }
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserInfo, AuthError> {
        let name = name.trim();
        let email = email.trim();

        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation("All fields are required.".to_string()));
        }

        if self.store.user_email_exists(email).await? {
            return Err(AuthError::EmailTaken);
        }

        match self
            .store
            .create_user(name, email, password, &self.security)
            .await?
        {
            InsertOutcome::Created(user) => {
                info!(user_id = user.id, "User registered");
                Ok(UserInfo::from(user))
            }
            InsertOutcome::EmailTaken => Err(AuthError::EmailTaken),
        }
    }

    async fn login(&self, email: &str, password: &str) -> Result<UserInfo, AuthError> {
        let email = email.trim();

        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .store
            .verify_user_password(email, password, &self.security)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        Ok(UserInfo::from(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> SeaOrmAuthService {
        let path = std::env::temp_dir().join(format!("imgclass-auth-{}.db", uuid::Uuid::new_v4()));
        let store = Store::new(&format!("sqlite:{}", path.display()))
            .await
            .unwrap();
        SeaOrmAuthService::new(
            store,
            SecurityConfig {
                argon2_memory_cost_kib: 1024,
                argon2_time_cost: 1,
                argon2_parallelism: 1,
            },
        )
    }

    #[tokio::test]
    async fn register_then_login() {
        let auth = service().await;

        let user = auth.register(" Alice ", "alice@example.com", "pw").await.unwrap();
        assert_eq!(user.name, "Alice");

        let logged_in = auth.login("alice@example.com", "pw").await.unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_keeps_original_account() {
        let auth = service().await;
        auth.register("Alice", "alice@example.com", "pw").await.unwrap();

        let err = auth
            .register("Eve", "alice@example.com", "other")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));

        assert!(auth.login("alice@example.com", "pw").await.is_ok());
        assert!(matches!(
            auth.login("alice@example.com", "other").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn missing_fields() {
        let auth = service().await;

        assert!(matches!(
            auth.register("", "a@x.com", "pw").await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            auth.login("", "pw").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody@x.com", "pw").await,
            Err(AuthError::InvalidCredentials)
        ));
    }
}
