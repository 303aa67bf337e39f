use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// How the signed session token travels between client and server.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionTransportKind {
    Cookie,
    Bearer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub transport: SessionTransportKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// `None` runs against the in-memory user store.
    pub database_url: Option<String>,
    pub base_url: String,
    pub production: bool,
    pub mail_from: String,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
}

pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 60 * 24 * 7;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = std::env::var("APP_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let base_url = std::env::var("APP_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();
        let production = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        let mail_from =
            std::env::var("MAIL_FROM").unwrap_or_else(|_| "TheRoofFax <noreply@therooffax.com>".into());

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "rooffax".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "rooffax-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(DEFAULT_SESSION_TTL_MINUTES),
        };

        let transport = match std::env::var("SESSION_TRANSPORT").as_deref() {
            Ok("bearer") => SessionTransportKind::Bearer,
            Ok("cookie") | Err(_) => SessionTransportKind::Cookie,
            Ok(other) => anyhow::bail!("unknown SESSION_TRANSPORT {other:?}"),
        };
        let session = SessionConfig {
            cookie_name: std::env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "auth_token".into()),
            transport,
        };

        Ok(Self {
            host,
            port,
            database_url,
            base_url,
            production,
            mail_from,
            jwt,
            session,
        })
    }

    /// Settings used by unit tests; never touches the environment.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            base_url: "https://rooffax.test".into(),
            production: false,
            mail_from: "noreply@rooffax.test".into(),
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            },
            session: SessionConfig {
                cookie_name: "auth_token".into(),
                transport: SessionTransportKind::Cookie,
            },
        }
    }
}
