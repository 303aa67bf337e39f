use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use crate::auth::emails::{self, PasswordResetEmail, VerificationEmail, WelcomeEmail};
use crate::auth::password::{dummy_hash, hash_password, verify_password};
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewUser, User, UserType};
use crate::auth::tokens::generate_token;
use crate::error::{AuthError, AuthResult};
use crate::mailer::{EmailMessage, Mailer};

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_password(password: &str) -> AuthResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Knobs for the account lifecycle.
#[derive(Debug, Clone)]
pub struct AccountPolicy {
    pub base_url: String,
    pub verification_ttl: Duration,
    pub reset_ttl: Duration,
    /// Forgot-password reports success even when something fails internally, so the
    /// response never tells a caller whether an address is registered. Leave this on.
    pub mask_forgot_password_errors: bool,
}

impl AccountPolicy {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            verification_ttl: Duration::hours(24),
            reset_ttl: Duration::hours(1),
            mask_forgot_password_errors: true,
        }
    }
}

/// Registration, verification, login and password reset on top of a `UserStore`.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    policy: AccountPolicy,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, mailer: Arc<dyn Mailer>, policy: AccountPolicy) -> Self {
        Self {
            users,
            mailer,
            policy,
        }
    }

    pub async fn find_user(&self, id: uuid::Uuid) -> AuthResult<Option<User>> {
        Ok(self.users.find_by_id(id).await?)
    }

    async fn send_required(&self, msg: EmailMessage) -> AuthResult<()> {
        self.mailer.send(msg).await.map_err(AuthError::MailDelivery)
    }

    /// Creates an unverified account and mails the verification link. No session is issued.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        user_type: UserType,
    ) -> AuthResult<User> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("Name is required".into()));
        }
        if !is_valid_email(email) {
            warn!("invalid email");
            return Err(AuthError::Validation("Invalid email".into()));
        }
        check_password(password)?;

        if self.users.find_by_email(email).await?.is_some() {
            warn!("email already registered");
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(password).map_err(AuthError::Internal)?;
        let token = generate_token();
        let user = self
            .users
            .create(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password_hash,
                user_type,
                verification_token: token.clone(),
                verification_token_expires: OffsetDateTime::now_utc()
                    + self.policy.verification_ttl,
            })
            .await?;
        info!(user_id = %user.id, "user registered");

        let url = emails::verify_url(&self.policy.base_url, &token);
        self.send_required(
            VerificationEmail {
                to: &user.email,
                name: &user.name,
                verify_url: &url,
            }
            .render(),
        )
        .await?;

        let welcome = WelcomeEmail {
            to: &user.email,
            name: &user.name,
            base_url: &self.policy.base_url,
        }
        .render();
        if let Err(e) = self.mailer.send(welcome).await {
            warn!(user_id = %user.id, error = %e, "welcome email failed");
        }

        Ok(user)
    }

    /// Checks credentials for a verified account and stamps `last_login`.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<User> {
        let Some((mut user, hash)) = self.users.find_credentials_by_email(email.trim()).await?
        else {
            verify_password(password, dummy_hash());
            warn!("login unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &hash) {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.email_verified {
            info!(user_id = %user.id, "login blocked until email is verified");
            return Err(AuthError::EmailNotVerified);
        }

        let now = OffsetDateTime::now_utc();
        self.users.mark_login_timestamp(user.id, now).await?;
        user.last_login = Some(now);
        info!(user_id = %user.id, "user logged in");
        Ok(user)
    }

    #[instrument(skip_all)]
    pub async fn verify_email(&self, token: &str) -> AuthResult<User> {
        let now = OffsetDateTime::now_utc();
        let Some(mut user) = self
            .users
            .find_by_valid_verification_token(token, now)
            .await?
        else {
            return Err(AuthError::InvalidOrExpiredToken);
        };

        if !self.users.clear_verification_and_mark_verified(user.id).await? {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        user.email_verified = true;
        user.verification_token = None;
        user.verification_token_expires = None;
        info!(user_id = %user.id, "email verified");
        Ok(user)
    }

    /// Replaces any outstanding verification token and mails a fresh link.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn resend_verification(&self, email: &str) -> AuthResult<()> {
        let user = match self.users.find_by_email(email.trim()).await? {
            Some(u) if !u.email_verified => u,
            _ => return Err(AuthError::UserNotFoundOrAlreadyVerified),
        };

        let token = generate_token();
        let expires = OffsetDateTime::now_utc() + self.policy.verification_ttl;
        self.users
            .set_verification_fields(user.id, &token, expires)
            .await?;

        let url = emails::verify_url(&self.policy.base_url, &token);
        self.send_required(
            VerificationEmail {
                to: &user.email,
                name: &user.name,
                verify_url: &url,
            }
            .render(),
        )
        .await?;
        info!(user_id = %user.id, "verification email re-sent");
        Ok(())
    }

    /// Starts a password reset. The outcome is the same whether or not the email exists.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        match self.issue_reset(email.trim()).await {
            Ok(()) => Ok(()),
            Err(e) if self.policy.mask_forgot_password_errors => {
                error!(error = %e, "forgot-password failed; reporting success to caller");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn issue_reset(&self, email: &str) -> AuthResult<()> {
        let Some(user) = self.users.find_by_email(email).await? else {
            info!("password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_token();
        let expires = OffsetDateTime::now_utc() + self.policy.reset_ttl;
        self.users.set_reset_fields(user.id, &token, expires).await?;

        let url = emails::reset_url(&self.policy.base_url, &token);
        self.send_required(
            PasswordResetEmail {
                to: &user.email,
                name: &user.name,
                reset_url: &url,
            }
            .render(),
        )
        .await?;
        info!(user_id = %user.id, "password reset email sent");
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn validate_reset_token(&self, token: &str) -> AuthResult<bool> {
        let found = self
            .users
            .find_by_valid_reset_token(token, OffsetDateTime::now_utc())
            .await?;
        Ok(found.is_some())
    }

    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        check_password(new_password)?;

        let Some(user) = self
            .users
            .find_by_valid_reset_token(token, OffsetDateTime::now_utc())
            .await?
        else {
            return Err(AuthError::InvalidOrExpiredToken);
        };

        let hash = hash_password(new_password).map_err(AuthError::Internal)?;
        if !self
            .users
            .update_password_and_clear_reset(user.id, token, &hash)
            .await?
        {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_user_type(&self, user_id: uuid::Uuid, user_type: UserType) -> AuthResult<()> {
        self.users.update_user_type(user_id, user_type).await?;
        info!(%user_id, %user_type, "user type updated");
        Ok(())
    }
}
