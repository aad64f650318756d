use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, de};
use sqlx::{FromRow, Row, postgres::PgRow};

use crate::identity::Identifier;

/// Registration form as posted by the frontend, either url-encoded or JSON.
///
/// Every field is optional here; the only structural requirement is that the
/// body parses. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub country: Option<String>,
    pub department: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub street: Option<String>,
    #[serde(alias = "id", deserialize_with = "number")]
    pub government_id: Option<u64>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    #[serde(deserialize_with = "number")]
    pub age: Option<u64>,
    pub daily: Option<String>,
    pub weekly: Option<String>,
    pub monthly: Option<String>,
    #[serde(deserialize_with = "flag")]
    pub newsletter: bool,
    #[serde(deserialize_with = "flag")]
    pub gift_box: bool,
    #[serde(deserialize_with = "flag")]
    pub authorized: bool,
}

/// A registrant ready to be inserted. `claimed` always starts false.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRegistrant {
    pub government_id: i64,
    pub identifier: Identifier,
    pub first_name: String,
    pub last_name: String,
    pub country: String,
    pub department: String,
    pub city: String,
    pub neighborhood: String,
    pub street: String,
    pub phone: String,
    pub email: String,
    pub gender: String,
    pub age: Option<i32>,
    pub daily: String,
    pub weekly: String,
    pub monthly: String,
    pub newsletter: bool,
    pub gift_box: bool,
    pub authorized: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registrant {
    pub government_id: i64,
    pub identifier: Identifier,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub claimed: bool,
    pub created_at: DateTime<Utc>,
}

/// Headers of interest from an inbound request. Write-only audit trail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestMetadata {
    pub accept_language: String,
    pub cookie: String,
    pub user_agent: String,
    pub cf_connecting_ip: String,
    pub x_forwarded_for: String,
    pub cf_ray: String,
    pub cf_ip_country: String,
    pub cf_visitor: String,
    pub url: String,
}

/// Outcome of one ticket email attempt. `error` is empty on success.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRecord {
    pub email: String,
    pub government_id: i64,
    pub identifier: Identifier,
    pub provider_message: String,
    pub provider_id: String,
    pub error: String,
}

impl DeliveryRecord {
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

impl NewRegistrant {
    /// Returns `None` when the form carries no usable government ID.
    pub fn from_form(form: RegistrationForm) -> Option<Self> {
        let government_id = form.government_id?;

        Some(Self {
            government_id: i64::try_from(government_id).ok()?,
            identifier: Identifier::from_government_id(government_id),
            first_name: text(form.first_name),
            last_name: text(form.last_name),
            country: text(form.country),
            department: text(form.department),
            city: text(form.city),
            neighborhood: text(form.neighborhood),
            street: text(form.street),
            phone: text(form.phone),
            email: text(form.email),
            gender: text(form.gender),
            age: form.age.and_then(|age| i32::try_from(age).ok()),
            daily: text(form.daily),
            weekly: text(form.weekly),
            monthly: text(form.monthly),
            newsletter: form.newsletter,
            gift_box: form.gift_box,
            authorized: form.authorized,
        })
    }

    pub fn full_name(&self) -> String {
        join_name(&self.first_name, &self.last_name)
    }
}

impl Registrant {
    pub fn full_name(&self) -> String {
        join_name(&self.first_name, &self.last_name)
    }
}

impl FromRow<'_, PgRow> for Registrant {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let raw: Vec<u8> = row.try_get("identifier")?;
        let identifier = Identifier::from_slice(&raw).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "identifier".to_string(),
            source: format!("expected 16 bytes, got {}", raw.len()).into(),
        })?;

        Ok(Self {
            government_id: row.try_get("government_id")?,
            identifier,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            city: row.try_get("city")?,
            claimed: row.try_get("claimed")?,
            created_at: row.try_get("ctime")?,
        })
    }
}

fn text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn join_name(first: &str, last: &str) -> String {
    format!("{first} {last}").trim().to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Number(u64),
    Text(String),
}

/// Accepts JSON numbers as well as numeric strings; blank means absent.
fn number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Loose>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Loose::Number(n)) => Ok(Some(n)),
        Some(Loose::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Loose::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a number, got {s:?}"))),
        Some(Loose::Bool(_)) => Err(de::Error::custom("expected a number, got a boolean")),
    }
}

/// HTML checkboxes post `on`; JSON clients post booleans.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Loose>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Loose::Bool(b)) => Ok(b),
        Some(Loose::Number(n)) => Ok(n != 0),
        Some(Loose::Text(s)) => match s.trim().to_lowercase().as_str() {
            "on" | "true" | "1" | "yes" | "si" | "sí" => Ok(true),
            "" | "off" | "false" | "0" | "no" => Ok(false),
            other => Err(de::Error::custom(format!("expected a boolean, got {other:?}"))),
        },
    }
}
