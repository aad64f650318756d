use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::{
        HeaderMap, Uri,
        header::{ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, USER_AGENT},
    },
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::{error::AppError, models::RequestMetadata};

/// Body extractor that takes JSON when the request says so and url-encoded
/// form data otherwise. Any decode failure is a [`AppError::MalformedPayload`].
pub struct FormOrJson<T>(pub T);

impl<T, S> FromRequest<S> for FormOrJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
                warn!("Failed to decode JSON body: {e}");
                AppError::MalformedPayload
            })?;
            return Ok(Self(value));
        }

        let Form(value) = Form::<T>::from_request(req, state).await.map_err(|e| {
            warn!("Failed to decode form body: {e}");
            AppError::MalformedPayload
        })?;

        Ok(Self(value))
    }
}

fn header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn request_metadata(headers: &HeaderMap, uri: &Uri) -> RequestMetadata {
    RequestMetadata {
        accept_language: header(headers, ACCEPT_LANGUAGE.as_str()),
        cookie: header(headers, COOKIE.as_str()),
        user_agent: header(headers, USER_AGENT.as_str()),
        cf_connecting_ip: header(headers, "cf-connecting-ip"),
        x_forwarded_for: header(headers, "x-forwarded-for"),
        cf_ray: header(headers, "cf-ray"),
        cf_ip_country: header(headers, "cf-ipcountry"),
        cf_visitor: header(headers, "cf-visitor"),
        url: uri.to_string(),
    }
}

/// Value of the cookie `name`, searching every `Cookie` header.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
