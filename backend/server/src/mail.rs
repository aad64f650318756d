//! # Mailgun
//!
//! Outbound ticket emails go through the Mailgun HTTP API as a multipart form
//! with the ticket attached. The provider's `{id, message}` reply is kept so it
//! can be stored next to each delivery attempt.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;
use thiserror::Error;

pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const MAILGUN_API: &str = "https://api.mailgun.net";

pub const TICKET_FILENAME: &str = "boleto.jpg";

pub const TICKET_HTML: &str = r#"<html>
<body>
<h1>Gracias por participar.</h1>
<p>Te has ganado un premio. Presenta el boleto adjunto para reclamarlo.</p>
<ol>
<li>En la carroza durante la marcha.</li>
<li>En la tarima del evento después de la marcha.</li>
</ol>
</body>
</html>
"#;

#[derive(Debug, Clone)]
pub struct TicketEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachment: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SentMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("no email provider configured")]
    NotConfigured,

    #[error("email provider timed out")]
    Timeout,

    #[error("email request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("email provider rejected message (status={status}): {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for MailError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            MailError::Timeout
        } else {
            MailError::Request(error)
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: TicketEmail) -> Result<SentMessage, MailError>;
}

pub struct Mailgun {
    client: Client,
    base_url: String,
    api_key: String,
    domain: String,
    sender: String,
}

impl Mailgun {
    pub fn new(api_key: &str, domain: &str, sender: &str) -> Result<Self, MailError> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .user_agent(concat!("qrinvite/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: MAILGUN_API.to_string(),
            api_key: api_key.trim().to_string(),
            domain: domain.to_string(),
            sender: sender.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Mailer for Mailgun {
    async fn send(&self, email: TicketEmail) -> Result<SentMessage, MailError> {
        let attachment = Part::bytes(email.attachment)
            .file_name(TICKET_FILENAME)
            .mime_str("image/jpeg")?;

        let form = Form::new()
            .text("from", self.sender.clone())
            .text("to", email.to)
            .text("subject", email.subject)
            .text("html", email.html)
            .part("attachment", attachment);

        let resp = self
            .client
            .post(format!("{}/v3/{}/messages", self.base_url, self.domain))
            .basic_auth("api", Some(&self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json::<SentMessage>().await?)
    }
}

/// Stand-in when no API key is configured; every attempt is recorded as failed.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _email: TicketEmail) -> Result<SentMessage, MailError> {
        Err(MailError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode, header::AUTHORIZATION},
        routing::post,
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    async fn fake_provider(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{address}")
    }

    fn email() -> TicketEmail {
        TicketEmail {
            to: "ana@example.com".to_string(),
            subject: "Ticket".to_string(),
            html: TICKET_HTML.to_string(),
            attachment: vec![0xff, 0xd8, 0xff],
        }
    }

    #[tokio::test]
    async fn test_mailgun_success() {
        let router = Router::new().route(
            "/v3/mg.test/messages",
            post(|headers: HeaderMap| async move {
                let auth = headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();

                if !auth.starts_with("Basic ") {
                    return (StatusCode::UNAUTHORIZED, Json(json!({"message": "no auth"})));
                }

                (
                    StatusCode::OK,
                    Json(json!({"id": "<20211201.1@mg.test>", "message": "Queued. Thank you."})),
                )
            }),
        );
        let base = fake_provider(router).await;

        let mailgun = Mailgun::new("key-123", "mg.test", "noreply@mg.test")
            .unwrap()
            .with_base_url(&base);

        let sent = mailgun.send(email()).await.unwrap();
        assert_eq!(sent.id, "<20211201.1@mg.test>");
        assert_eq!(sent.message, "Queued. Thank you.");
    }

    #[tokio::test]
    async fn test_mailgun_rejection() {
        let router = Router::new().route(
            "/v3/mg.test/messages",
            post(|| async { (StatusCode::FORBIDDEN, "Forbidden") }),
        );
        let base = fake_provider(router).await;

        let mailgun = Mailgun::new("bad", "mg.test", "noreply@mg.test")
            .unwrap()
            .with_base_url(&base);

        match mailgun.send(email()).await {
            Err(MailError::Status { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "Forbidden");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disabled_mailer() {
        assert!(matches!(
            DisabledMailer.send(email()).await,
            Err(MailError::NotConfigured)
        ));
    }
}
