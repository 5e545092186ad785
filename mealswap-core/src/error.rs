//! Errors returned by the exchange engine and the session service.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::MealStatus;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Meal {meal_id} is {actual}, expected {expected}")]
    InvalidState {
        meal_id: Uuid,
        expected: MealStatus,
        actual: MealStatus,
    },
    #[error("No user is signed in")]
    NotAuthenticated,
    /// A claim found no pending swap for an offered meal. This is a data
    /// integrity fault, not a user error.
    #[error("No pending swap record for offered meal {0}")]
    SwapRecordMissing(Uuid),
    #[error("Offer on meal {meal_id} expired at {expired_at}")]
    OfferExpired {
        meal_id: Uuid,
        expired_at: DateTime<Utc>,
    },
    #[error("Claim on meal {meal_id} can no longer be confirmed (deadline {deadline})")]
    ClaimExpired {
        meal_id: Uuid,
        deadline: DateTime<Utc>,
    },
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Feedback was already provided for meal {0}")]
    AlreadyFeedbackProvided(Uuid),
    #[error("Meal {0} cannot be claimed by the user who offered it")]
    CannotClaimOwnOffer(Uuid),
    #[error("Meal not found: {0}")]
    MealNotFound(Uuid),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Email is already registered: {0}")]
    EmailTaken(String),
    /// The store refused a change set because a record it was built from
    /// changed in the meantime. Nothing was written.
    #[error("Records changed concurrently: {0}")]
    Conflict(String),
}

impl From<StoreError> for ExchangeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Rejected(reason) => ExchangeError::Conflict(reason),
            other => ExchangeError::StoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_store_write_is_a_conflict() {
        let err = ExchangeError::from(StoreError::Rejected("meals 1 changed".to_string()));
        assert!(matches!(err, ExchangeError::Conflict(reason) if reason == "meals 1 changed"));

        let err = ExchangeError::from(StoreError::Connection("refused".to_string()));
        assert!(matches!(err, ExchangeError::StoreUnavailable(_)));
    }
}
