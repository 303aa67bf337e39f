use std::sync::Arc;

use crate::auth::jwt::JwtKeys;
use crate::auth::memory::MemoryUserStore;
use crate::auth::repo::{PgUserStore, UserStore};
use crate::auth::services::{AccountPolicy, AccountService};
use crate::auth::session::{transport_from_config, SessionIssuer};
use crate::config::AppConfig;
use crate::mailer::{LogMailer, Mailer};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: AccountService,
    pub sessions: SessionIssuer,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => Arc::new(PgUserStore::connect(url).await?),
            None => {
                tracing::warn!("DATABASE_URL not set; accounts live in memory only");
                Arc::new(MemoryUserStore::new())
            }
        };

        let mailer = Arc::new(LogMailer::new(config.mail_from.clone())) as Arc<dyn Mailer>;

        Ok(Self::from_parts(config, users, mailer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let accounts = AccountService::new(users, mailer, AccountPolicy::new(config.base_url.clone()));
        let sessions = SessionIssuer::new(
            accounts.clone(),
            JwtKeys::from(&config.jwt),
            transport_from_config(&config),
        );
        Self {
            config,
            accounts,
            sessions,
        }
    }

    /// In-memory state for tests, with handles on the store and captured mail.
    #[cfg(test)]
    pub fn fake() -> (Self, Arc<MemoryUserStore>, Arc<crate::mailer::FakeMailer>) {
        let store = Arc::new(MemoryUserStore::new());
        let mailer = Arc::new(crate::mailer::FakeMailer::new());
        let state = Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            store.clone(),
            mailer.clone(),
        );
        (state, store, mailer)
    }
}
