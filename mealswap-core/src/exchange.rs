//! Meal exchange engine.
//!
//! Every operation follows the same shape:
//! 1. lock the meal id, then the acting user's id
//! 2. re-read the meal, its swaps and the acting user from the active store
//! 3. run the transition from [`crate::lifecycle`]
//! 4. commit all changed records as one change set, on condition that the
//!    records read in step 2 are still stored unchanged
//!
//! The locks serialize callers sharing a coordinator. The preconditions
//! cover everyone else writing to the same store: a rejected change set is
//! retried from step 2, so the second of two claims on one meal sees
//! `claimed` and fails with `InvalidState`.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::coordinator::{retry_conflicts, SyncCoordinator};
use crate::error::ExchangeError;
use crate::lifecycle::{self, Claim, Offer};
use crate::models::{Meal, MealStatus, MealSwap, Prediction, User};
use crate::store::{ChangeSet, EntityKind, Filter};

/// Inactive users are treated as signed out.
fn active(acting: Option<&User>) -> Result<&User, ExchangeError> {
    acting
        .filter(|user| user.is_active)
        .ok_or(ExchangeError::NotAuthenticated)
}

#[derive(Debug, Clone)]
pub struct MealExchange {
    coordinator: Arc<SyncCoordinator>,
}

impl MealExchange {
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    async fn load_meal(&self, id: Uuid) -> Result<Meal, ExchangeError> {
        self.coordinator
            .find::<Meal>(id)
            .await?
            .ok_or(ExchangeError::MealNotFound(id))
    }

    async fn load_user(&self, id: Uuid) -> Result<User, ExchangeError> {
        self.coordinator
            .find::<User>(id)
            .await?
            .ok_or_else(|| ExchangeError::UserNotFound(id.to_string()))
    }

    async fn load_swaps(&self, meal_id: Uuid) -> Result<Vec<MealSwap>, ExchangeError> {
        self.coordinator
            .fetch::<MealSwap>(&Filter::by_meal(meal_id))
            .await
    }

    /// Lists a new surplus meal as `available`.
    ///
    /// Exchange fields on `meal` are reset; a meal always enters the
    /// lifecycle at the start.
    pub async fn list_meal(&self, meal: Meal, acting: Option<&User>) -> Result<Meal, ExchangeError> {
        let acting = active(acting)?;
        let _meal_guard = self.coordinator.locks().lock(meal.id).await;

        let meal = Meal {
            status: MealStatus::Available,
            offered_by: None,
            claimed_by: None,
            offer_expiry_time: None,
            claim_deadline_time: None,
            actually_consumed: None,
            feedback_provided: false,
            ..meal
        };

        retry_conflicts("list_meal", || self.try_list_meal(&meal, acting.id)).await?;
        tracing::info!(meal_id = %meal.id, name = %meal.name, "Meal listed");
        Ok(meal)
    }

    async fn try_list_meal(&self, meal: &Meal, user_id: Uuid) -> Result<(), ExchangeError> {
        if let Some(existing) = self.coordinator.find::<Meal>(meal.id).await? {
            return Err(ExchangeError::InvalidState {
                meal_id: meal.id,
                expected: MealStatus::Available,
                actual: existing.status,
            });
        }

        let changes = ChangeSet::new()
            .with(meal.clone())
            .expecting_absent(EntityKind::Meals, meal.id);
        self.coordinator.commit(changes, Some(user_id)).await
    }

    /// Offers an available meal for exchange.
    pub async fn offer(
        &self,
        meal: &Meal,
        acting: Option<&User>,
    ) -> Result<(Meal, MealSwap), ExchangeError> {
        let acting = active(acting)?;
        let _meal_guard = self.coordinator.locks().lock(meal.id).await;
        let _user_guard = self.coordinator.locks().lock(acting.id).await;

        let offer = retry_conflicts("offer", || self.try_offer(meal.id, acting.id)).await?;

        tracing::info!(meal_id = %offer.meal.id, swap_id = %offer.swap.id, user_id = %acting.id, "Meal offered");
        Ok((offer.meal, offer.swap))
    }

    async fn try_offer(&self, meal_id: Uuid, user_id: Uuid) -> Result<Offer, ExchangeError> {
        let current = self.load_meal(meal_id).await?;
        let user = self.load_user(user_id).await?;

        let offer = lifecycle::offer(&current, Some(&user), Utc::now())?;

        let changes = ChangeSet::new()
            .with(offer.meal.clone())
            .with(offer.swap.clone())
            .with(offer.user.clone())
            .expecting(current)
            .expecting(user);
        self.coordinator.commit(changes, Some(user_id)).await?;
        Ok(offer)
    }

    /// Claims an offered meal on behalf of `acting`.
    pub async fn claim(
        &self,
        meal: &Meal,
        acting: Option<&User>,
    ) -> Result<(Meal, MealSwap), ExchangeError> {
        let acting = active(acting)?;
        let _meal_guard = self.coordinator.locks().lock(meal.id).await;
        let _user_guard = self.coordinator.locks().lock(acting.id).await;

        let claim = retry_conflicts("claim", || self.try_claim(meal.id, acting.id)).await?;

        tracing::info!(meal_id = %claim.meal.id, swap_id = %claim.swap.id, user_id = %acting.id, "Meal claimed");
        Ok((claim.meal, claim.swap))
    }

    async fn try_claim(&self, meal_id: Uuid, user_id: Uuid) -> Result<Claim, ExchangeError> {
        let current = self.load_meal(meal_id).await?;
        let swaps = self.load_swaps(meal_id).await?;
        let user = self.load_user(user_id).await?;

        let claim = match lifecycle::claim(&current, &swaps, Some(&user), Utc::now()) {
            Ok(claim) => claim,
            Err(e @ ExchangeError::SwapRecordMissing(_)) => {
                tracing::error!(%meal_id, swaps = swaps.len(), "Offered meal has no pending swap record");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut changes = ChangeSet::new()
            .with(claim.meal.clone())
            .with(claim.swap.clone())
            .with(claim.user.clone())
            .expecting(current)
            .expecting(user);
        if let Some(pending) = swaps.into_iter().find(|s| s.id == claim.swap.id) {
            changes.expect(pending);
        }
        self.coordinator.commit(changes, Some(user_id)).await?;
        Ok(claim)
    }

    /// Records post-hoc feedback on a claimed meal.
    pub async fn confirm_consumption(
        &self,
        meal: &Meal,
        was_consumed: bool,
        acting: Option<&User>,
    ) -> Result<Meal, ExchangeError> {
        let acting = active(acting)?;
        let _meal_guard = self.coordinator.locks().lock(meal.id).await;
        let _user_guard = self.coordinator.locks().lock(acting.id).await;

        let confirmed = retry_conflicts("confirm_consumption", || {
            self.try_confirm_consumption(meal.id, was_consumed, acting.id)
        })
        .await?;

        tracing::info!(meal_id = %confirmed.id, was_consumed, "Consumption confirmed");
        Ok(confirmed)
    }

    async fn try_confirm_consumption(
        &self,
        meal_id: Uuid,
        was_consumed: bool,
        user_id: Uuid,
    ) -> Result<Meal, ExchangeError> {
        let current = self.load_meal(meal_id).await?;
        let user = self.load_user(user_id).await?;

        let confirmation =
            lifecycle::confirm_consumption(&current, was_consumed, Some(&user), Utc::now())?;

        let mut changes = ChangeSet::new()
            .with(confirmation.meal.clone())
            .expecting(current);
        if confirmation.user != user {
            changes.push(confirmation.user);
            changes.expect(user);
        }
        self.coordinator.commit(changes, Some(user_id)).await?;
        Ok(confirmation.meal)
    }

    /// Marks the pending swap of an offer whose window has closed as expired.
    ///
    /// Returns `None` if the offer is still open or has no pending swap.
    pub async fn expire_offer(
        &self,
        meal: &Meal,
        acting: Option<&User>,
    ) -> Result<Option<MealSwap>, ExchangeError> {
        let acting = active(acting)?;
        let _meal_guard = self.coordinator.locks().lock(meal.id).await;

        let expired =
            retry_conflicts("expire_offer", || self.try_expire_offer(meal.id, acting.id)).await?;

        if let Some(swap) = &expired {
            tracing::info!(meal_id = %meal.id, swap_id = %swap.id, user_id = %acting.id, "Offer expired");
        }
        Ok(expired)
    }

    async fn try_expire_offer(
        &self,
        meal_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MealSwap>, ExchangeError> {
        let current = self.load_meal(meal_id).await?;
        let swaps = self.load_swaps(meal_id).await?;

        let Some(expired) = lifecycle::expire_offer(&current, &swaps, Utc::now()) else {
            return Ok(None);
        };

        let mut changes = ChangeSet::new()
            .with(expired.clone())
            .expecting(current);
        if let Some(pending) = swaps.into_iter().find(|s| s.id == expired.id) {
            changes.expect(pending);
        }
        self.coordinator.commit(changes, Some(user_id)).await?;
        Ok(Some(expired))
    }

    /// Stores a precomputed attendance prediction.
    pub async fn record_prediction(
        &self,
        prediction: Prediction,
        acting: Option<&User>,
    ) -> Result<(), ExchangeError> {
        let acting = active(acting)?;
        self.coordinator
            .commit(ChangeSet::new().with(prediction), Some(acting.id))
            .await
    }
}
