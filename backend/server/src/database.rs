//! # Postgres
//!
//! Relational store for registrants, request metadata and delivery records.
//!
//! ## Requirements
//!
//! - One row per government ID, enforced by the database, not by the process
//! - Lookups by identifier for the claim page
//! - Append-only audit tables, never read back by the application
//!
//! ## Implementation
//!
//! - `registrants.government_id` is the primary key and `registrants.identifier`
//!   is `UNIQUE`. Two racing submissions for the same ID both reach `INSERT`;
//!   Postgres lets exactly one through and the other surfaces as
//!   [`StoreError::Duplicate`], classified from the driver error kind.
//! - Every statement is bounded by a timeout so a slow database cannot pin a
//!   request or a background task forever.
//! - Migrations under `migrations/` are embedded and applied before the
//!   listener binds.
use std::{future::Future, time::Duration};

use async_trait::async_trait;
use sqlx::{
    PgPool,
    migrate::MigrateError,
    postgres::PgPoolOptions,
};
use thiserror::Error;
use tokio::time::timeout;
use tracing::info;

use crate::{
    identity::Identifier,
    models::{DeliveryRecord, NewRegistrant, Registrant, RequestMetadata},
};

pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const BACKGROUND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("registrant already exists")]
    Duplicate,

    #[error("database call timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] MigrateError),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Database(error),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Atomic insert. Fails with [`StoreError::Duplicate`] when the government
    /// ID or identifier is already present.
    async fn insert_registrant(&self, registrant: &NewRegistrant) -> Result<(), StoreError>;

    async fn find_registrants(&self, identifier: &Identifier) -> Result<Vec<Registrant>, StoreError>;

    /// Sets `claimed = true`, returning how many rows matched.
    async fn mark_claimed(&self, identifier: &Identifier) -> Result<u64, StoreError>;

    async fn record_request(&self, metadata: &RequestMetadata) -> Result<(), StoreError>;

    async fn record_delivery(&self, record: &DeliveryRecord) -> Result<(), StoreError>;

    async fn close(&self) {}
}

pub async fn init_postgres(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(QUERY_TIMEOUT)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied");

    Ok(pool)
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn bounded<T, F>(limit: Duration, query: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    timeout(limit, query)
        .await
        .map_err(|_| StoreError::Timeout)?
        .map_err(StoreError::from)
}

#[async_trait]
impl Store for PgStore {
    async fn insert_registrant(&self, r: &NewRegistrant) -> Result<(), StoreError> {
        let query = sqlx::query(
            "INSERT INTO registrants (government_id, identifier, first_name, last_name, country, \
             department, city, neighborhood, street, phone, email, gender, age, daily, weekly, \
             monthly, newsletter, gift_box, authorized, claimed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, FALSE)",
        )
        .bind(r.government_id)
        .bind(r.identifier.as_bytes().as_slice())
        .bind(&r.first_name)
        .bind(&r.last_name)
        .bind(&r.country)
        .bind(&r.department)
        .bind(&r.city)
        .bind(&r.neighborhood)
        .bind(&r.street)
        .bind(&r.phone)
        .bind(&r.email)
        .bind(&r.gender)
        .bind(r.age)
        .bind(&r.daily)
        .bind(&r.weekly)
        .bind(&r.monthly)
        .bind(r.newsletter)
        .bind(r.gift_box)
        .bind(r.authorized)
        .execute(&self.pool);

        bounded(QUERY_TIMEOUT, query).await.map(|_| ())
    }

    async fn find_registrants(&self, identifier: &Identifier) -> Result<Vec<Registrant>, StoreError> {
        let query = sqlx::query_as::<_, Registrant>(
            "SELECT government_id, identifier, first_name, last_name, email, phone, city, claimed, ctime \
             FROM registrants WHERE identifier = $1",
        )
        .bind(identifier.as_bytes().as_slice())
        .fetch_all(&self.pool);

        bounded(QUERY_TIMEOUT, query).await
    }

    async fn mark_claimed(&self, identifier: &Identifier) -> Result<u64, StoreError> {
        let query = sqlx::query("UPDATE registrants SET claimed = TRUE WHERE identifier = $1")
            .bind(identifier.as_bytes().as_slice())
            .execute(&self.pool);

        bounded(QUERY_TIMEOUT, query)
            .await
            .map(|result| result.rows_affected())
    }

    async fn record_request(&self, m: &RequestMetadata) -> Result<(), StoreError> {
        let query = sqlx::query(
            "INSERT INTO request_metadata (accept_language, cookie, user_agent, cf_connecting_ip, \
             x_forwarded_for, cf_ray, cf_ip_country, cf_visitor, url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&m.accept_language)
        .bind(&m.cookie)
        .bind(&m.user_agent)
        .bind(&m.cf_connecting_ip)
        .bind(&m.x_forwarded_for)
        .bind(&m.cf_ray)
        .bind(&m.cf_ip_country)
        .bind(&m.cf_visitor)
        .bind(&m.url)
        .execute(&self.pool);

        bounded(BACKGROUND_TIMEOUT, query).await.map(|_| ())
    }

    async fn record_delivery(&self, d: &DeliveryRecord) -> Result<(), StoreError> {
        let query = sqlx::query(
            "INSERT INTO delivery_records (email, government_id, identifier, provider_message, provider_id, error) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&d.email)
        .bind(d.government_id)
        .bind(d.identifier.as_bytes().as_slice())
        .bind(&d.provider_message)
        .bind(&d.provider_id)
        .bind(&d.error)
        .execute(&self.pool);

        bounded(BACKGROUND_TIMEOUT, query).await.map(|_| ())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}
