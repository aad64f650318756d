//! # Claims
//!
//! A registrant's prize is either unclaimed or claimed; `claimed` only ever
//! moves from false to true. Claiming twice is an overwrite with the same
//! value, not an error.
use tracing::{error, info};

use crate::{
    database::Store,
    error::AppError,
    identity::Identifier,
    models::Registrant,
};

#[derive(Debug, PartialEq)]
pub enum ClaimState {
    NotFound,
    Unclaimed(Registrant),
    Claimed(Registrant),
}

pub async fn lookup(store: &dyn Store, identifier: &Identifier) -> Result<ClaimState, AppError> {
    let mut rows = store.find_registrants(identifier).await?;

    match rows.len() {
        0 => Ok(ClaimState::NotFound),
        1 => {
            let registrant = rows.remove(0);
            if registrant.claimed {
                Ok(ClaimState::Claimed(registrant))
            } else {
                Ok(ClaimState::Unclaimed(registrant))
            }
        }
        n => {
            error!(%identifier, rows = n, "Identifier matched more than one registrant");
            Err(AppError::InternalError(format!(
                "identifier {identifier} matched {n} registrants"
            )))
        }
    }
}

/// Marks the registrant as claimed. Returns [`AppError::NotFound`] when no
/// registrant has this identifier.
pub async fn claim(store: &dyn Store, identifier: &Identifier) -> Result<(), AppError> {
    match store.mark_claimed(identifier).await? {
        0 => Err(AppError::NotFound),
        _ => {
            info!(%identifier, "Prize claimed");
            Ok(())
        }
    }
}
