//! Meal exchange state machine.
//!
//! These functions validate a transition against the current records and
//! build the replacement values. They never touch a store; the caller
//! commits the returned records together.

use chrono::{DateTime, Duration, Utc};

use crate::error::ExchangeError;
use crate::models::{Meal, MealStatus, MealSwap, SwapStatus, User};

/// How long an offer stays claimable.
pub const OFFER_WINDOW_MINUTES: i64 = 60;
/// How long a claimant has to pick the meal up.
pub const CLAIM_WINDOW_MINUTES: i64 = 30;
/// Consumption feedback is accepted up to this long after the claim deadline.
pub const CONFIRMATION_GRACE_HOURS: i64 = 24;

pub const OFFER_POINTS: f64 = 1.0;
pub const CLAIM_POINTS: f64 = 0.5;
pub const CONSUMPTION_POINTS: f64 = 0.5;
/// Recorded on the swap when it completes.
pub const SWAP_POINTS: f64 = 1.0;

/// Records produced by [`offer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    pub meal: Meal,
    pub swap: MealSwap,
    pub user: User,
}

/// Records produced by [`claim`].
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub meal: Meal,
    pub swap: MealSwap,
    pub user: User,
}

/// Records produced by [`confirm_consumption`].
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub meal: Meal,
    pub user: User,
}

fn authenticated(acting: Option<&User>) -> Result<&User, ExchangeError> {
    match acting {
        Some(user) if user.is_active => Ok(user),
        _ => Err(ExchangeError::NotAuthenticated),
    }
}

/// Fails unless `meal` may move to `next`. `from` is the status that allows
/// it and is reported as the expected one.
fn require_transition(
    meal: &Meal,
    from: MealStatus,
    next: MealStatus,
) -> Result<(), ExchangeError> {
    debug_assert!(from.can_transition_to(next));
    if !meal.status.can_transition_to(next) {
        return Err(ExchangeError::InvalidState {
            meal_id: meal.id,
            expected: from,
            actual: meal.status,
        });
    }
    Ok(())
}

/// Puts an available meal up for exchange.
pub fn offer(meal: &Meal, acting: Option<&User>, now: DateTime<Utc>) -> Result<Offer, ExchangeError> {
    let user = authenticated(acting)?;
    require_transition(meal, MealStatus::Available, MealStatus::Offered)?;

    let expiry = now + Duration::minutes(OFFER_WINDOW_MINUTES);

    let mut meal = meal.clone();
    meal.status = MealStatus::Offered;
    meal.offered_by = Some(user.id);
    meal.offer_expiry_time = Some(expiry);

    let swap = MealSwap::new(meal.id, user.id, expiry);

    let mut user = user.clone();
    user.meals_saved += 1;
    user.meals_swapped += 1;
    user.add_score(OFFER_POINTS);

    Ok(Offer { meal, swap, user })
}

/// Claims an offered meal and completes its pending swap.
///
/// `swaps` are the swap records stored for this meal.
pub fn claim(
    meal: &Meal,
    swaps: &[MealSwap],
    acting: Option<&User>,
    now: DateTime<Utc>,
) -> Result<Claim, ExchangeError> {
    let user = authenticated(acting)?;
    require_transition(meal, MealStatus::Offered, MealStatus::Claimed)?;

    if meal.offered_by == Some(user.id) {
        return Err(ExchangeError::CannotClaimOwnOffer(meal.id));
    }
    if let Some(expired_at) = meal.offer_expiry_time.filter(|_| meal.is_offer_expired(now)) {
        return Err(ExchangeError::OfferExpired {
            meal_id: meal.id,
            expired_at,
        });
    }

    let swap = swaps
        .iter()
        .find(|s| s.meal_id == meal.id && s.is_pending())
        .ok_or(ExchangeError::SwapRecordMissing(meal.id))?;

    let mut meal = meal.clone();
    meal.status = MealStatus::Claimed;
    meal.claimed_by = Some(user.id);
    meal.claim_deadline_time = Some(now + Duration::minutes(CLAIM_WINDOW_MINUTES));

    let mut swap = swap.clone();
    swap.claimed_by = Some(user.id);
    swap.claimed_at = Some(now);
    swap.status = SwapStatus::Completed;
    swap.cq_points_earned = Some(SWAP_POINTS);

    let mut user = user.clone();
    user.meals_distributed += 1;
    user.add_score(CLAIM_POINTS);

    Ok(Claim { meal, swap, user })
}

/// Records whether a claimed meal was actually eaten.
///
/// Feedback is accepted once. A second call fails with
/// `AlreadyFeedbackProvided` whatever the meal's status.
pub fn confirm_consumption(
    meal: &Meal,
    was_consumed: bool,
    acting: Option<&User>,
    now: DateTime<Utc>,
) -> Result<Confirmation, ExchangeError> {
    let user = authenticated(acting)?;
    if meal.feedback_provided {
        return Err(ExchangeError::AlreadyFeedbackProvided(meal.id));
    }
    let next = if was_consumed {
        MealStatus::Consumed
    } else {
        MealStatus::Unclaimed
    };
    require_transition(meal, MealStatus::Claimed, next)?;

    if let Some(deadline) = meal.claim_deadline_time {
        if now > deadline + Duration::hours(CONFIRMATION_GRACE_HOURS) {
            return Err(ExchangeError::ClaimExpired {
                meal_id: meal.id,
                deadline,
            });
        }
    }

    let mut meal = meal.clone();
    meal.actually_consumed = Some(was_consumed);
    meal.feedback_provided = true;
    meal.status = next;

    let mut user = user.clone();
    if was_consumed {
        user.add_score(CONSUMPTION_POINTS);
    }

    Ok(Confirmation { meal, user })
}

/// Returns the pending swap of an offered meal whose window has closed,
/// marked `expired`. The meal itself keeps its status.
pub fn expire_offer(meal: &Meal, swaps: &[MealSwap], now: DateTime<Utc>) -> Option<MealSwap> {
    if meal.status != MealStatus::Offered || !meal.is_offer_expired(now) {
        return None;
    }
    swaps
        .iter()
        .find(|s| s.meal_id == meal.id && s.is_pending())
        .map(|s| {
            let mut swap = s.clone();
            swap.status = SwapStatus::Expired;
            swap
        })
}
