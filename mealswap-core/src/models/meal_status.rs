use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ParseEnumError;

/// Position of a meal in the exchange lifecycle.
///
/// ```text
/// available -> offered -> claimed -> consumed
///                                 \-> unclaimed
/// ```
///
/// Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MealStatus {
    #[default]
    Available,
    Offered,
    Claimed,
    Consumed,
    Unclaimed,
}

impl MealStatus {
    /// Returns true if `next` is the direct successor of this status.
    pub fn can_transition_to(self, next: MealStatus) -> bool {
        matches!(
            (self, next),
            (MealStatus::Available, MealStatus::Offered)
                | (MealStatus::Offered, MealStatus::Claimed)
                | (MealStatus::Claimed, MealStatus::Consumed)
                | (MealStatus::Claimed, MealStatus::Unclaimed)
        )
    }

    /// Statuses in which `offered_by` may be set.
    pub fn has_offerer(self) -> bool {
        !matches!(self, MealStatus::Available)
    }

    /// Statuses in which `claimed_by` may be set.
    pub fn has_claimant(self) -> bool {
        matches!(
            self,
            MealStatus::Claimed | MealStatus::Consumed | MealStatus::Unclaimed
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MealStatus::Consumed | MealStatus::Unclaimed)
    }
}

impl fmt::Display for MealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MealStatus::Available => write!(f, "available"),
            MealStatus::Offered => write!(f, "offered"),
            MealStatus::Claimed => write!(f, "claimed"),
            MealStatus::Consumed => write!(f, "consumed"),
            MealStatus::Unclaimed => write!(f, "unclaimed"),
        }
    }
}

impl FromStr for MealStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(MealStatus::Available),
            "offered" => Ok(MealStatus::Offered),
            "claimed" => Ok(MealStatus::Claimed),
            "consumed" => Ok(MealStatus::Consumed),
            "unclaimed" => Ok(MealStatus::Unclaimed),
            _ => Err(ParseEnumError::new(
                "meal status",
                s,
                "available, offered, claimed, consumed, unclaimed",
            )),
        }
    }
}

/// State of a swap-ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    #[default]
    Pending,
    Completed,
    Expired,
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapStatus::Pending => write!(f, "pending"),
            SwapStatus::Completed => write!(f, "completed"),
            SwapStatus::Expired => write!(f, "expired"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_only_move_forward() {
        use MealStatus::*;
        assert!(Available.can_transition_to(Offered));
        assert!(Offered.can_transition_to(Claimed));
        assert!(Claimed.can_transition_to(Consumed));
        assert!(Claimed.can_transition_to(Unclaimed));

        assert!(!Offered.can_transition_to(Available));
        assert!(!Claimed.can_transition_to(Offered));
        assert!(!Consumed.can_transition_to(Unclaimed));
        assert!(!Available.can_transition_to(Claimed));
    }

    #[test]
    fn test_participant_fields_by_status() {
        assert!(!MealStatus::Available.has_offerer());
        assert!(MealStatus::Offered.has_offerer());
        assert!(!MealStatus::Offered.has_claimant());
        assert!(MealStatus::Unclaimed.has_claimant());
    }

    #[test]
    fn test_meal_status_from_str() {
        assert_eq!(MealStatus::from_str("Offered").unwrap(), MealStatus::Offered);
        assert!(MealStatus::from_str("expired").is_err());
    }
}
