use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::meal_status::SwapStatus;

/// Ledger entry pairing an offered meal with its eventual claimant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MealSwap {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub offered_by: Uuid,
    pub claimed_by: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub status: SwapStatus,
    /// Set once, when the swap completes.
    pub cq_points_earned: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl MealSwap {
    pub fn new(meal_id: Uuid, offered_by: Uuid, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            meal_id,
            offered_by,
            claimed_by: None,
            claimed_at: None,
            expires_at,
            status: SwapStatus::Pending,
            cq_points_earned: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SwapStatus::Pending
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.offered_by == user_id || self.claimed_by == Some(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_new_is_pending() {
        let offerer = Uuid::new_v4();
        let swap = MealSwap::new(Uuid::new_v4(), offerer, Utc::now());
        assert!(swap.is_pending());
        assert!(swap.claimed_by.is_none());
        assert!(swap.cq_points_earned.is_none());
        assert!(swap.involves(offerer));
        assert!(!swap.involves(Uuid::new_v4()));
    }
}
