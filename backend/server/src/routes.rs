use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use tracing::error;

use crate::{
    claim::{self, ClaimState},
    error::AppError,
    identity::Identifier,
    models::RegistrationForm,
    registration::{self, Submission},
    state::AppState,
    utils::{FormOrJson, request_metadata},
    views,
};

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
    FormOrJson(form): FormOrJson<RegistrationForm>,
) -> Result<Response, AppError> {
    let metadata = request_metadata(&headers, &uri);

    match registration::submit(&state, form, metadata).await? {
        Submission::Registered(_) => Ok((StatusCode::OK, Html(views::registered())).into_response()),
        Submission::Duplicate(_) => Ok(StatusCode::NOT_MODIFIED.into_response()),
    }
}

/// Printed flyers link to `/qrcodes/<digit>`; the digit tells flyers apart.
pub async fn qr_inbound_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Result<Redirect, AppError> {
    if !(code.len() == 1 && code.bytes().all(|b| b.is_ascii_digit())) {
        return Err(AppError::NotFound);
    }

    let metadata = request_metadata(&headers, &uri);
    let store = state.store.clone();
    state.tasks.spawn(async move {
        if let Err(e) = store.record_request(&metadata).await {
            error!("Failed to save inbound QR code headers: {e}");
        }
    });

    Ok(Redirect::to(&state.config.form_path))
}

fn parse_identifier(raw: &str) -> Result<Identifier, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}

pub async fn user_handler(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Html<String>, AppError> {
    let identifier = parse_identifier(&raw)?;

    match claim::lookup(state.store.as_ref(), &identifier).await? {
        ClaimState::NotFound => Err(AppError::NotFound),
        ClaimState::Unclaimed(registrant) => Ok(Html(views::claim_prompt(&registrant))),
        ClaimState::Claimed(registrant) => Ok(Html(views::already_claimed(&registrant))),
    }
}

pub async fn claim_handler(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Redirect, AppError> {
    let identifier = parse_identifier(&raw)?;

    claim::claim(state.store.as_ref(), &identifier).await?;

    Ok(Redirect::to(&format!("/users/{identifier}")))
}

pub async fn not_found_handler() -> impl IntoResponse {
    AppError::NotFound
}
