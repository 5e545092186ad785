use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::meal_status::MealStatus;
use super::meal_type::MealType;
use super::nutrient::Nutrient;

/// A surplus meal listed for exchange.
///
/// Participants are referenced by user id. `offered_by` is only set once the
/// meal has left `available`, and `claimed_by` only once it has been claimed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meal {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub location: String,
    pub meal_type: MealType,
    pub status: MealStatus,
    pub date: NaiveDate,
    pub nutrients: Option<Vec<Nutrient>>,
    pub offered_by: Option<Uuid>,
    pub claimed_by: Option<Uuid>,
    pub offer_expiry_time: Option<DateTime<Utc>>,
    pub claim_deadline_time: Option<DateTime<Utc>>,
    /// `None` until feedback arrives.
    pub actually_consumed: Option<bool>,
    pub feedback_provided: bool,
    pub created_at: DateTime<Utc>,
}

impl Meal {
    pub fn new(name: impl Into<String>, meal_type: MealType, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            location: String::new(),
            meal_type,
            status: MealStatus::Available,
            date,
            nutrients: None,
            offered_by: None,
            claimed_by: None,
            offer_expiry_time: None,
            claim_deadline_time: None,
            actually_consumed: None,
            feedback_provided: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_nutrients(mut self, nutrients: Vec<Nutrient>) -> Self {
        self.nutrients = Some(nutrients);
        self
    }

    /// True once the offer window has closed. Meals that were never offered
    /// do not expire.
    pub fn is_offer_expired(&self, now: DateTime<Utc>) -> bool {
        self.offer_expiry_time.is_some_and(|expiry| now > expiry)
    }

    /// Checks that the participant references agree with the status.
    pub fn participants_consistent(&self) -> bool {
        (self.offered_by.is_none() || self.status.has_offerer())
            && (self.claimed_by.is_none() || self.status.has_claimant())
    }
}

impl fmt::Display for Meal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]", self.name, self.status)?;
        writeln!(f, "{}", "=".repeat(self.name.len()))?;
        writeln!(f, "Id: {}", self.id)?;
        writeln!(f, "Date: {}", self.date)?;
        writeln!(f, "Meal: {}", self.meal_type)?;

        if !self.location.is_empty() {
            writeln!(f, "Location: {}", self.location)?;
        }
        if !self.description.is_empty() {
            writeln!(f, "\n{}", self.description)?;
        }
        if let Some(expiry) = self.offer_expiry_time {
            writeln!(f, "Offer expires: {}", expiry.format("%Y-%m-%d %H:%M UTC"))?;
        }
        if let Some(deadline) = self.claim_deadline_time {
            writeln!(f, "Pick up by: {}", deadline.format("%Y-%m-%d %H:%M UTC"))?;
        }

        if let Some(nutrients) = &self.nutrients {
            if !nutrients.is_empty() {
                writeln!(f, "\nNutrition:")?;
                for nutrient in nutrients {
                    writeln!(f, "  - {}", nutrient)?;
                }
            }
        }

        Ok(())
    }
}
