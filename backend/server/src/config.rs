use std::{fmt, fs::read_to_string, net::SocketAddr, path::PathBuf};

use clap::Parser;
use thiserror::Error;
use tracing::{info, warn};

/// Every option can come from a flag or from the matching environment
/// variable. Secrets additionally fall back to `/run/secrets/<NAME>`.
#[derive(Parser, Clone)]
#[command(author, version, about)]
pub struct Config {
    /// Address on which to listen
    #[arg(long, env = "QRINVITE_ADDRESS", default_value = "0.0.0.0:8080")]
    pub address: SocketAddr,

    /// TLS certificate chain (PEM). Requires --key.
    #[arg(long, env = "QRINVITE_CERT")]
    pub cert: Option<PathBuf>,

    /// TLS private key (PEM). Requires --cert.
    #[arg(long, env = "QRINVITE_KEY")]
    pub key: Option<PathBuf>,

    /// Postgres connection string, including the role to connect as
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://postgres@localhost:5432/qrinvite"
    )]
    pub database_url: String,

    /// Root path of the static site
    #[arg(long, env = "QRINVITE_ROOT", default_value = "./result/static")]
    pub root: PathBuf,

    /// Flyer image the QR code is stamped onto
    #[arg(long, env = "QRINVITE_FLYER", default_value = "./flyer.jpg")]
    pub flyer: PathBuf,

    /// Base URL encoded into ticket QR codes
    #[arg(long, env = "QRINVITE_PUBLIC_URL", default_value = "https://cieloverde.io")]
    pub public_url: String,

    /// Where inbound QR scans are redirected
    #[arg(long, env = "QRINVITE_FORM_PATH", default_value = "/form/")]
    pub form_path: String,

    #[arg(long, env = "QRINVITE_ADMIN_USER", default_value = "cielo")]
    pub admin_user: String,

    #[arg(long, env = "QRINVITE_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    #[arg(long, env = "QRINVITE_ADMIN_COOKIE_NAME", default_value = "shibboleth")]
    pub admin_cookie_name: String,

    /// Shared secret admins must present as a cookie
    #[arg(long, env = "QRINVITE_ADMIN_COOKIE_VALUE", hide_env_values = true)]
    pub admin_cookie_value: Option<String>,

    #[arg(long, env = "MAILGUN_API_KEY", hide_env_values = true)]
    pub mailgun_api_key: Option<String>,

    #[arg(long, env = "MAILGUN_DOMAIN", default_value = "mg.cieloverde.io")]
    pub mailgun_domain: String,

    #[arg(long, env = "QRINVITE_MAIL_SENDER", default_value = "noreply@cieloverde.io")]
    pub mail_sender: String,

    #[arg(
        long,
        env = "QRINVITE_MAIL_SUBJECT",
        default_value = "Movimiento Cannabico Colombiano - Tu boleto"
    )]
    pub mail_subject: String,
}

fn redacted(secret: Option<&str>) -> Option<&'static str> {
    secret.map(|_| "<redacted>")
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("address", &self.address)
            .field("cert", &self.cert)
            .field("key", &self.key)
            .field("database_url", &"<redacted>")
            .field("root", &self.root)
            .field("flyer", &self.flyer)
            .field("public_url", &self.public_url)
            .field("form_path", &self.form_path)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &redacted(self.admin_password.as_deref()))
            .field("admin_cookie_name", &self.admin_cookie_name)
            .field("admin_cookie_value", &redacted(self.admin_cookie_value.as_deref()))
            .field("mailgun_api_key", &redacted(self.mailgun_api_key.as_deref()))
            .field("mailgun_domain", &self.mailgun_domain)
            .field("mail_sender", &self.mail_sender)
            .field("mail_subject", &self.mail_subject)
            .finish()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("both --cert and --key must be given, or neither")]
    PartialTls,
}

impl Config {
    pub fn load() -> Self {
        let mut config = Self::parse();

        config.admin_password = config
            .admin_password
            .or_else(|| read_secret("ADMIN_PASSWORD"));
        config.admin_cookie_value = config
            .admin_cookie_value
            .or_else(|| read_secret("ADMIN_COOKIE_VALUE"));
        config.mailgun_api_key = config
            .mailgun_api_key
            .or_else(|| read_secret("MAILGUN_API_KEY"));

        if config.admin_password.is_none() {
            warn!("No admin password configured, admin login is disabled");
        }
        if config.admin_cookie_value.is_none() {
            warn!("No admin cookie value configured, claim pages are locked");
        }

        config
    }

    /// Returns the certificate/key pair when TLS is configured.
    pub fn tls(&self) -> Result<Option<(PathBuf, PathBuf)>, ConfigError> {
        match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => Ok(Some((cert.clone(), key.clone()))),
            (None, None) => Ok(None),
            _ => Err(ConfigError::PartialTls),
        }
    }
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("{secret_name} not provided as a secret file: {e}");
        })
        .ok()
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["qrinvite"]);

        assert_eq!(config.address, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.admin_cookie_name, "shibboleth");
        assert_eq!(config.form_path, "/form/");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::parse_from([
            "qrinvite",
            "--database-url",
            "postgres://app:hunter2@db/qrinvite",
            "--admin-password",
            "s3cr3t-pass",
            "--admin-cookie-value",
            "test-secret",
            "--mailgun-api-key",
            "key-123",
        ]);

        let printed = format!("{config:?}");
        for secret in ["hunter2", "s3cr3t-pass", "test-secret", "key-123"] {
            assert!(!printed.contains(secret), "{secret} leaked: {printed}");
        }
        assert!(printed.contains("admin_password: Some(\"<redacted>\")"));
        assert!(printed.contains("admin_cookie_name: \"shibboleth\""));
    }

    #[test]
    fn test_tls_pairing() {
        let plain = Config::parse_from(["qrinvite"]);
        assert_eq!(plain.tls(), Ok(None));

        let both = Config::parse_from(["qrinvite", "--cert", "a.crt", "--key", "a.key"]);
        assert_eq!(
            both.tls(),
            Ok(Some((PathBuf::from("a.crt"), PathBuf::from("a.key"))))
        );

        let half = Config::parse_from(["qrinvite", "--cert", "a.crt"]);
        assert_eq!(half.tls(), Err(ConfigError::PartialTls));
    }
}
