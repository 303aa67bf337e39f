use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StoreError;

/// Account classification picked at sign-up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[serde(alias = "Homeowner")]
    Homeowner,
    #[serde(alias = "Professional", alias = "pro", alias = "Pro")]
    Professional,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Homeowner => "homeowner",
            UserType::Professional => "professional",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "homeowner" => Ok(UserType::Homeowner),
            "professional" | "pro" => Ok(UserType::Professional),
            other => Err(format!("unknown user type {other:?}")),
        }
    }
}

/// User account as seen by the rest of the service. Holds no password hash.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub user_type: UserType,
    pub created_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub verification_token_expires: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires: Option<OffsetDateTime>,
}

/// Everything needed to insert a fresh, unverified account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub user_type: UserType,
    pub verification_token: String,
    pub verification_token_expires: OffsetDateTime,
}

/// Raw `users` row.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub user_type: String,
    pub created_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub verification_token_expires: Option<OffsetDateTime>,
    pub reset_token: Option<String>,
    pub reset_token_expires: Option<OffsetDateTime>,
}

impl UserRow {
    /// Splits the row into the public user and its password hash.
    pub fn into_parts(self) -> Result<(User, String), StoreError> {
        let user_type = self
            .user_type
            .parse::<UserType>()
            .map_err(StoreError::InvalidRow)?;
        let user = User {
            id: self.id,
            name: self.name,
            email: self.email,
            user_type,
            created_at: self.created_at,
            last_login: self.last_login,
            email_verified: self.email_verified,
            verification_token: self.verification_token,
            verification_token_expires: self.verification_token_expires,
            reset_token: self.reset_token,
            reset_token_expires: self.reset_token_expires,
        };
        Ok((user, self.password_hash))
    }

    pub fn into_user(self) -> Result<User, StoreError> {
        self.into_parts().map(|(user, _)| user)
    }
}
