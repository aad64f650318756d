//! # Delivery
//!
//! Renders a ticket, emails it, and records exactly one [`DeliveryRecord`] per
//! attempt whatever the outcome. Nothing here is retried and nothing here
//! reaches the HTTP caller: by the time this runs the submission has already
//! been answered.
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::{
    database::Store,
    identity::Identifier,
    mail::{MailError, Mailer, SentMessage, TICKET_HTML, TicketEmail},
    models::DeliveryRecord,
    ticket::{RenderError, TicketRenderer},
};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("render task failed: {0}")]
    RenderTask(#[from] JoinError),

    #[error("delivery failed: {0}")]
    Delivery(#[from] MailError),
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    renderer: Arc<TicketRenderer>,
    subject: String,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        renderer: Arc<TicketRenderer>,
        subject: &str,
    ) -> Self {
        Self {
            store,
            mailer,
            renderer,
            subject: subject.to_string(),
        }
    }

    pub async fn dispatch(&self, recipient: &str, government_id: i64, identifier: Identifier) -> DeliveryRecord {
        let outcome = self.deliver(recipient, identifier).await;

        let record = match outcome {
            Ok(SentMessage { id, message }) => {
                info!(%identifier, provider_id = %id, "Ticket delivered");
                DeliveryRecord {
                    email: recipient.to_string(),
                    government_id,
                    identifier,
                    provider_message: message,
                    provider_id: id,
                    error: String::new(),
                }
            }
            Err(e) => {
                warn!(%identifier, "Ticket delivery failed: {e}");
                DeliveryRecord {
                    email: recipient.to_string(),
                    government_id,
                    identifier,
                    provider_message: String::new(),
                    provider_id: String::new(),
                    error: e.to_string(),
                }
            }
        };

        if let Err(e) = self.store.record_delivery(&record).await {
            error!(%identifier, "Failed to record delivery outcome: {e}");
        }

        record
    }

    async fn deliver(&self, recipient: &str, identifier: Identifier) -> Result<SentMessage, DispatchError> {
        let renderer = self.renderer.clone();
        let attachment = tokio::task::spawn_blocking(move || renderer.render(&identifier)).await??;

        let sent = self
            .mailer
            .send(TicketEmail {
                to: recipient.to_string(),
                subject: self.subject.clone(),
                html: TICKET_HTML.to_string(),
                attachment,
            })
            .await?;

        Ok(sent)
    }
}
