use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::meal_type::MealType;

/// Attendance forecast for one meal service.
///
/// Produced by an external forecaster; this crate only stores and serves it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub id: Uuid,
    pub date: NaiveDate,
    pub meal_type: MealType,
    pub predicted_attendance: u32,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Prediction {
    pub fn new(
        date: NaiveDate,
        meal_type: MealType,
        predicted_attendance: u32,
        confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            meal_type,
            predicted_attendance,
            confidence: confidence.clamp(0.0, 1.0),
            recorded_at: Utc::now(),
        }
    }
}
