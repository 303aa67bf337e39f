use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewUser, User, UserType};
use crate::error::StoreError;

struct Record {
    user: User,
    password_hash: String,
}

/// Process-local user store for development runs without Postgres and for tests.
/// Each mutation runs entirely under the write lock.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, Record>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn password_hash(&self, email: &str) -> Option<String> {
        let users = self.users.read().await;
        users
            .values()
            .find(|r| r.user.email == email)
            .map(|r| r.password_hash.clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|r| r.user.email == new_user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            user_type: new_user.user_type,
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
            email_verified: false,
            verification_token: Some(new_user.verification_token),
            verification_token_expires: Some(new_user.verification_token_expires),
            reset_token: None,
            reset_token_expires: None,
        };
        users.insert(
            user.id,
            Record {
                user: user.clone(),
                password_hash: new_user.password_hash,
            },
        );
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .find_credentials_by_email(email)
            .await?
            .map(|(user, _)| user))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).map(|r| r.user.clone()))
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<(User, String)>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|r| r.user.email == email)
            .map(|r| (r.user.clone(), r.password_hash.clone())))
    }

    async fn update_user_type(&self, id: Uuid, user_type: UserType) -> Result<(), StoreError> {
        if let Some(r) = self.users.write().await.get_mut(&id) {
            r.user.user_type = user_type;
        }
        Ok(())
    }

    async fn mark_login_timestamp(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError> {
        if let Some(r) = self.users.write().await.get_mut(&id) {
            r.user.last_login = Some(at);
        }
        Ok(())
    }

    async fn set_verification_fields(
        &self,
        id: Uuid,
        token: &str,
        expires: OffsetDateTime,
    ) -> Result<(), StoreError> {
        if let Some(r) = self.users.write().await.get_mut(&id) {
            r.user.verification_token = Some(token.to_string());
            r.user.verification_token_expires = Some(expires);
        }
        Ok(())
    }

    async fn clear_verification_and_mark_verified(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(r) if !r.user.email_verified => {
                r.user.email_verified = true;
                r.user.verification_token = None;
                r.user.verification_token_expires = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_valid_verification_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|r| {
                r.user.verification_token.as_deref() == Some(token)
                    && r.user.verification_token_expires.is_some_and(|exp| exp > now)
            })
            .map(|r| r.user.clone()))
    }

    async fn set_reset_fields(
        &self,
        id: Uuid,
        token: &str,
        expires: OffsetDateTime,
    ) -> Result<(), StoreError> {
        if let Some(r) = self.users.write().await.get_mut(&id) {
            r.user.reset_token = Some(token.to_string());
            r.user.reset_token_expires = Some(expires);
        }
        Ok(())
    }

    async fn find_by_valid_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|r| {
                r.user.reset_token.as_deref() == Some(token)
                    && r.user.reset_token_expires.is_some_and(|exp| exp > now)
            })
            .map(|r| r.user.clone()))
    }

    async fn update_password_and_clear_reset(
        &self,
        id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(r) if r.user.reset_token.as_deref() == Some(token) => {
                r.password_hash = password_hash.to_string();
                r.user.reset_token = None;
                r.user.reset_token_expires = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
