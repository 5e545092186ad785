//! Entity records exchanged between the engine, the coordinator and the stores.

mod meal;
mod meal_status;
mod meal_swap;
mod meal_type;
mod nutrient;
mod prediction;
mod role;
mod user;

pub use meal::Meal;
pub use meal_status::{MealStatus, SwapStatus};
pub use meal_swap::MealSwap;
pub use meal_type::MealType;
pub use nutrient::Nutrient;
pub use prediction::Prediction;
pub use role::Role;
pub use user::User;

/// Error returned when one of the model enums is parsed from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind} '{value}'. Valid options: {expected}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}
