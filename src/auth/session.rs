//! Session issuance: signs a JWT after a successful login and moves it through a
//! pluggable transport (HTTP-only cookie by default, bearer header for API clients).
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{error, info, instrument, warn};

use crate::auth::jwt::{Claims, JwtKeys};
use crate::auth::repo_types::{User, UserType};
use crate::auth::services::AccountService;
use crate::config::{AppConfig, SessionTransportKind};
use crate::error::{AuthError, AuthResult};

/// Carries a session token between client and server.
pub trait SessionTransport: Send + Sync {
    /// Token presented by the client, if any.
    fn read(&self, headers: &HeaderMap) -> Option<String>;
    /// Adds whatever response headers hand `token` to the client.
    fn attach(&self, token: &str, ttl: Duration, out: &mut HeaderMap);
    /// Adds whatever response headers make the client drop its token.
    fn clear(&self, out: &mut HeaderMap);
    /// Whether the login response body must include the raw token.
    fn token_in_body(&self) -> bool {
        false
    }
}

pub struct CookieTransport {
    name: String,
    secure: bool,
}

impl CookieTransport {
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
        }
    }

    fn append(out: &mut HeaderMap, cookie: &Cookie<'_>) {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(v) => {
                out.append(header::SET_COOKIE, v);
            }
            Err(e) => error!(error = %e, "session cookie is not a valid header value"),
        }
    }
}

impl SessionTransport for CookieTransport {
    fn read(&self, headers: &HeaderMap) -> Option<String> {
        CookieJar::from_headers(headers)
            .get(&self.name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    fn attach(&self, token: &str, ttl: Duration, out: &mut HeaderMap) {
        let cookie = Cookie::build((self.name.clone(), token.to_string()))
            .http_only(true)
            .secure(self.secure)
            .path("/")
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(ttl.as_secs() as i64))
            .build();
        Self::append(out, &cookie);
    }

    fn clear(&self, out: &mut HeaderMap) {
        let mut cookie = Cookie::build((self.name.clone(), ""))
            .http_only(true)
            .secure(self.secure)
            .path("/")
            .build();
        cookie.make_removal();
        Self::append(out, &cookie);
    }
}

/// `Authorization: Bearer <token>`; the client stores the token itself.
pub struct BearerTransport;

impl SessionTransport for BearerTransport {
    fn read(&self, headers: &HeaderMap) -> Option<String> {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())?;
        auth.strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    fn attach(&self, _token: &str, _ttl: Duration, _out: &mut HeaderMap) {}

    fn clear(&self, _out: &mut HeaderMap) {}

    fn token_in_body(&self) -> bool {
        true
    }
}

pub fn transport_from_config(cfg: &AppConfig) -> Arc<dyn SessionTransport> {
    match cfg.session.transport {
        SessionTransportKind::Cookie => Arc::new(CookieTransport::new(
            cfg.session.cookie_name.clone(),
            cfg.production,
        )),
        SessionTransportKind::Bearer => Arc::new(BearerTransport),
    }
}

#[derive(Debug)]
pub struct IssuedSession {
    pub user: User,
    pub token: String,
}

#[derive(Clone)]
pub struct SessionIssuer {
    accounts: AccountService,
    keys: JwtKeys,
    transport: Arc<dyn SessionTransport>,
}

impl SessionIssuer {
    pub fn new(accounts: AccountService, keys: JwtKeys, transport: Arc<dyn SessionTransport>) -> Self {
        Self {
            accounts,
            keys,
            transport,
        }
    }

    pub fn exposes_token(&self) -> bool {
        self.transport.token_in_body()
    }

    /// Logs in and, on success, writes the session into `out`.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        out: &mut HeaderMap,
    ) -> AuthResult<IssuedSession> {
        let user = self.accounts.login(email, password).await?;
        let token = self
            .keys
            .sign(user.id, &user.email)
            .map_err(AuthError::Internal)?;
        self.transport.attach(&token, self.keys.ttl(), out);
        info!(user_id = %user.id, "session issued");
        Ok(IssuedSession { user, token })
    }

    pub fn logout(&self, out: &mut HeaderMap) {
        self.transport.clear(out);
    }

    /// Decodes the presented session or fails with `NotAuthenticated`.
    pub fn authenticate(&self, headers: &HeaderMap) -> AuthResult<Claims> {
        let token = self.transport.read(headers).ok_or(AuthError::NotAuthenticated)?;
        self.keys.verify(&token).map_err(|e| {
            warn!(error = %e, "invalid or expired session token");
            AuthError::NotAuthenticated
        })
    }

    /// Resolves the signed-in user. Never fails: a bad token is cleared and treated as
    /// signed out, as is a token for a user that no longer exists.
    #[instrument(skip_all)]
    pub async fn current_user(&self, headers: &HeaderMap, out: &mut HeaderMap) -> Option<User> {
        let token = self.transport.read(headers)?;
        let claims = match self.keys.verify(&token) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "dropping invalid session");
                self.transport.clear(out);
                return None;
            }
        };
        match self.accounts.find_user(claims.sub).await {
            Ok(user) => user,
            Err(e) => {
                error!(user_id = %claims.sub, error = %e, "current user lookup failed");
                None
            }
        }
    }

    #[instrument(skip(self, headers))]
    pub async fn set_user_type(&self, headers: &HeaderMap, user_type: UserType) -> AuthResult<()> {
        let claims = self.authenticate(headers)?;
        self.accounts.set_user_type(claims.sub, user_type).await
    }
}
