use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use super::{
    config::Config,
    database::{PgStore, Store, init_postgres},
    delivery::Dispatcher,
    mail::{DisabledMailer, Mailer, Mailgun},
    ticket::TicketRenderer,
};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<Dispatcher>,
    /// Detached side effects of submissions (metadata logging, ticket dispatch).
    pub tasks: TaskTracker,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let renderer = TicketRenderer::open(&config.flyer, &config.public_url)
            .with_context(|| format!("failed to load flyer image {}", config.flyer.display()))?;

        let pool = init_postgres(&config.database_url)
            .await
            .context("failed to initialize database")?;
        let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

        let mailer: Arc<dyn Mailer> = match config.mailgun_api_key.as_deref() {
            Some(key) => Arc::new(
                Mailgun::new(key, &config.mailgun_domain, &config.mail_sender)
                    .context("failed to build email client")?,
            ),
            None => {
                warn!("No Mailgun API key configured, tickets will not be emailed");
                Arc::new(DisabledMailer)
            }
        };

        Ok(Self::with_parts(config, store, mailer, renderer))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        renderer: TicketRenderer,
    ) -> Arc<Self> {
        let dispatcher = Dispatcher::new(store.clone(), mailer, Arc::new(renderer), &config.mail_subject);

        Arc::new(Self {
            config,
            store,
            dispatcher: Arc::new(dispatcher),
            tasks: TaskTracker::new(),
        })
    }

    /// Waits up to `grace` for background tasks, then closes storage.
    pub async fn shutdown(&self, grace: Duration) {
        self.tasks.close();

        info!(pending = self.tasks.len(), "Waiting for background tasks...");
        if timeout(grace, self.tasks.wait()).await.is_err() {
            warn!(
                abandoned = self.tasks.len(),
                "Background tasks did not finish within the grace period"
            );
        }

        self.store.close().await;
    }
}
