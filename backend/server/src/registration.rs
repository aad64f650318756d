//! # Registration
//!
//! decode → identify → insert → (authorized only) background side effects.
//!
//! The insert is the only thing the caller waits for. A uniqueness violation
//! means this government ID already registered: the submission becomes a
//! no-op with no email and no audit row. Background work is spawned strictly
//! after a successful insert, so no ticket is ever sent for a row that failed
//! to persist.
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    database::StoreError,
    error::AppError,
    identity::Identifier,
    models::{NewRegistrant, RegistrationForm, RequestMetadata},
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Registered(Identifier),
    Duplicate(Identifier),
}

pub async fn submit(
    state: &Arc<AppState>,
    form: RegistrationForm,
    metadata: RequestMetadata,
) -> Result<Submission, AppError> {
    let Some(registrant) = NewRegistrant::from_form(form) else {
        warn!("Submission without a usable government ID");
        return Err(AppError::MalformedPayload);
    };
    let identifier = registrant.identifier;

    match state.store.insert_registrant(&registrant).await {
        Ok(()) => info!(%identifier, "Registrant stored"),
        Err(StoreError::Duplicate) => {
            info!(%identifier, "Duplicate submission ignored");
            return Ok(Submission::Duplicate(identifier));
        }
        Err(e) => {
            error!(%identifier, "Failed to store registrant: {e}");
            return Err(AppError::Storage(e));
        }
    }

    if registrant.authorized {
        spawn_side_effects(state, registrant, metadata);
    }

    Ok(Submission::Registered(identifier))
}

fn spawn_side_effects(state: &Arc<AppState>, registrant: NewRegistrant, metadata: RequestMetadata) {
    let store = state.store.clone();
    state.tasks.spawn(async move {
        if let Err(e) = store.record_request(&metadata).await {
            error!("Failed to save request metadata: {e}");
        }
    });

    if registrant.email.is_empty() {
        warn!(identifier = %registrant.identifier, "Authorized registrant has no email, skipping ticket");
        return;
    }

    let dispatcher = state.dispatcher.clone();
    state.tasks.spawn(async move {
        dispatcher
            .dispatch(&registrant.email, registrant.government_id, registrant.identifier)
            .await;
    });
}
