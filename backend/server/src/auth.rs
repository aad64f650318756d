//! # Admin gate
//!
//! One shared credential, no sessions table. `POST /login` checks the
//! configured username/password and hands out a cookie whose name and value
//! are both fixed in configuration; the claim routes only check that cookie.
//!
//! A missing secret in configuration locks the corresponding door instead of
//! opening it.
use std::sync::Arc;

use axum::{
    Form,
    extract::{Request, State},
    http::{HeaderMap, header::SET_COOKIE},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::AppError,
    state::AppState,
    utils::cookie_value,
    views,
};

pub const COOKIE_MAX_AGE_SECS: u64 = 24 * 60 * 60;

#[derive(Deserialize)]
pub struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Constant-time comparison for credentials and cookie secrets.
#[inline]
fn secret_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub fn is_admin(headers: &HeaderMap, config: &Config) -> bool {
    let Some(expected) = config.admin_cookie_value.as_deref() else {
        return false;
    };

    cookie_value(headers, &config.admin_cookie_name)
        .is_some_and(|value| secret_eq(value, expected))
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !is_admin(request.headers(), &state.config) {
        warn!(path = %request.uri().path(), "Rejected request without admin cookie");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

pub async fn login_page() -> Html<String> {
    Html(views::login())
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Form(credentials): Form<Credentials>,
) -> Result<Response, AppError> {
    let config = &state.config;

    let (Some(password), Some(secret)) = (
        config.admin_password.as_deref(),
        config.admin_cookie_value.as_deref(),
    ) else {
        warn!("Login attempted but admin credentials are not configured");
        return Err(AppError::Unauthorized);
    };

    let user_ok = secret_eq(&credentials.username, &config.admin_user);
    let password_ok = secret_eq(&credentials.password, password);

    if !(user_ok && password_ok) {
        warn!("Failed admin login");
        return Err(AppError::Unauthorized);
    }

    info!("Admin logged in");

    let secure = if config.tls().ok().flatten().is_some() {
        "; Secure"
    } else {
        ""
    };
    let cookie = format!(
        "{}={secret}; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}; HttpOnly; SameSite=Lax{secure}",
        config.admin_cookie_name
    );

    Ok(([(SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}
