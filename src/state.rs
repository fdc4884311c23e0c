use std::sync::Arc;

use crate::config::AppConfig;
use crate::notify::{LogMailer, Mailer, SmtpMailer};
use crate::payments::gateway::{PaymentGateway, StripeGateway};
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub mailer: Arc<dyn Mailer>,
    pg: Option<PgStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (store, pg) = match &config.database_url {
            Some(url) => {
                let pg = PgStore::connect(url, config.max_connections).await?;
                (Arc::new(pg.clone()) as Arc<dyn Store>, Some(pg))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using the in-memory store");
                (Arc::new(MemoryStore::new()) as Arc<dyn Store>, None)
            }
        };

        let mailer = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?) as Arc<dyn Mailer>,
            None => Arc::new(LogMailer) as Arc<dyn Mailer>,
        };

        let gateway =
            Arc::new(StripeGateway::new(config.stripe.clone())) as Arc<dyn PaymentGateway>;

        Ok(Self {
            store,
            config,
            gateway,
            mailer,
            pg,
        })
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            config,
            gateway,
            mailer,
            pg: None,
        }
    }

    pub fn pg(&self) -> Option<&PgStore> {
        self.pg.as_ref()
    }

    /// Releases pooled connections once the server has stopped.
    pub async fn shutdown(&self) {
        if let Some(pg) = &self.pg {
            pg.close().await;
        }
    }

    /// Memory store, test JWT settings, an unconfigured gateway and a
    /// log-only mailer.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig::for_tests());
        Self::from_parts(
            Arc::new(MemoryStore::new()),
            config.clone(),
            Arc::new(StripeGateway::new(config.stripe.clone())),
            Arc::new(LogMailer),
        )
    }
}
