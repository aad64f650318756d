use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use image::{Rgba, RgbaImage};

use crate::{
    config::Config,
    database::{Store, StoreError},
    identity::Identifier,
    mail::{MailError, Mailer, SentMessage, TicketEmail},
    models::{DeliveryRecord, NewRegistrant, Registrant, RequestMetadata},
    state::AppState,
    ticket::TicketRenderer,
};

pub const ADMIN_COOKIE: &str = "shibboleth=test-secret";

#[derive(Default)]
pub struct MemoryStore {
    registrants: Mutex<Vec<Registrant>>,
    requests: Mutex<Vec<RequestMetadata>>,
    deliveries: Mutex<Vec<DeliveryRecord>>,
}

impl MemoryStore {
    pub fn registrants(&self) -> Vec<Registrant> {
        self.registrants.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<RequestMetadata> {
        self.requests.lock().unwrap().clone()
    }

    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Bypasses the uniqueness check to simulate a corrupted table.
    pub fn force_insert(&self, registrant: Registrant) {
        self.registrants.lock().unwrap().push(registrant);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_registrant(&self, r: &NewRegistrant) -> Result<(), StoreError> {
        let mut rows = self.registrants.lock().unwrap();

        if rows
            .iter()
            .any(|row| row.government_id == r.government_id || row.identifier == r.identifier)
        {
            return Err(StoreError::Duplicate);
        }

        rows.push(Registrant {
            government_id: r.government_id,
            identifier: r.identifier,
            first_name: r.first_name.clone(),
            last_name: r.last_name.clone(),
            email: r.email.clone(),
            phone: r.phone.clone(),
            city: r.city.clone(),
            claimed: false,
            created_at: Utc::now(),
        });

        Ok(())
    }

    async fn find_registrants(&self, identifier: &Identifier) -> Result<Vec<Registrant>, StoreError> {
        Ok(self
            .registrants
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.identifier == *identifier)
            .cloned()
            .collect())
    }

    async fn mark_claimed(&self, identifier: &Identifier) -> Result<u64, StoreError> {
        let mut matched = 0;
        for row in self.registrants.lock().unwrap().iter_mut() {
            if row.identifier == *identifier {
                row.claimed = true;
                matched += 1;
            }
        }

        Ok(matched)
    }

    async fn record_request(&self, metadata: &RequestMetadata) -> Result<(), StoreError> {
        self.requests.lock().unwrap().push(metadata.clone());
        Ok(())
    }

    async fn record_delivery(&self, record: &DeliveryRecord) -> Result<(), StoreError> {
        self.deliveries.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Fails every call with a storage error other than a duplicate.
pub struct BrokenStore;

#[async_trait]
impl Store for BrokenStore {
    async fn insert_registrant(&self, _: &NewRegistrant) -> Result<(), StoreError> {
        Err(StoreError::Timeout)
    }

    async fn find_registrants(&self, _: &Identifier) -> Result<Vec<Registrant>, StoreError> {
        Err(StoreError::Timeout)
    }

    async fn mark_claimed(&self, _: &Identifier) -> Result<u64, StoreError> {
        Err(StoreError::Timeout)
    }

    async fn record_request(&self, _: &RequestMetadata) -> Result<(), StoreError> {
        Err(StoreError::Timeout)
    }

    async fn record_delivery(&self, _: &DeliveryRecord) -> Result<(), StoreError> {
        Err(StoreError::Timeout)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<TicketEmail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<TicketEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: TicketEmail) -> Result<SentMessage, MailError> {
        if self.fail {
            return Err(MailError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push(email);

        Ok(SentMessage {
            id: format!("msg-{}", sent.len()),
            message: "Queued. Thank you.".to_string(),
        })
    }
}

pub fn test_renderer() -> TicketRenderer {
    TicketRenderer::new(
        RgbaImage::from_pixel(800, 800, Rgba([255, 255, 255, 255])),
        "https://tickets.test",
    )
}

pub fn test_config() -> Config {
    Config::parse_from([
        "qrinvite",
        "--root",
        "/nonexistent/static",
        "--admin-password",
        "verde",
        "--admin-cookie-value",
        "test-secret",
    ])
}

pub fn test_state(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Arc<AppState> {
    AppState::with_parts(test_config(), store, mailer, test_renderer())
}

/// Waits for every background task spawned so far.
pub async fn settle(state: &AppState) {
    state.tasks.close();
    state.tasks.wait().await;
    state.tasks.reopen();
}
