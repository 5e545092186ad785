use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::role::Role;

/// A participant in the dining community.
///
/// Counters only ever grow. `leaderboard_rank` is derived and stays `None`
/// until the leaderboard has been computed at least once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub cq_score: f64,
    pub leaderboard_rank: Option<u32>,
    pub meals_saved: u32,
    pub meals_swapped: u32,
    pub meals_distributed: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            role,
            cq_score: 0.0,
            leaderboard_rank: None,
            meals_saved: 0,
            meals_swapped: 0,
            meals_distributed: 0,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_score(mut self, cq_score: f64) -> Self {
        self.cq_score = cq_score.max(0.0);
        self
    }

    /// Case-insensitive email comparison.
    pub fn has_email(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }

    /// Adds `delta` to the CQ score. The score never drops below zero.
    pub fn add_score(&mut self, delta: f64) {
        self.cq_score = (self.cq_score + delta).max(0.0);
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} <{}>", self.name, self.email)?;
        writeln!(f, "Role: {}", self.role)?;
        writeln!(f, "CQ score: {:.1}", self.cq_score)?;
        if let Some(rank) = self.leaderboard_rank {
            writeln!(f, "Rank: #{}", rank)?;
        }
        writeln!(
            f,
            "Meals saved/swapped/distributed: {}/{}/{}",
            self.meals_saved, self.meals_swapped, self.meals_distributed
        )?;
        if !self.is_active {
            writeln!(f, "(deactivated)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new_defaults() {
        let user = User::new("Ada", "ada@example.edu", Role::Student);
        assert_eq!(user.cq_score, 0.0);
        assert!(user.leaderboard_rank.is_none());
        assert_eq!(user.meals_saved, 0);
        assert!(user.is_active);
    }

    #[test]
    fn test_has_email_ignores_case() {
        let user = User::new("Ada", "Ada@Example.edu", Role::Student);
        assert!(user.has_email("ada@example.EDU"));
        assert!(!user.has_email("bob@example.edu"));
    }

    #[test]
    fn test_add_score_never_negative() {
        let mut user = User::new("Ada", "ada@example.edu", Role::Student).with_score(0.5);
        user.add_score(-2.0);
        assert_eq!(user.cq_score, 0.0);
        user.add_score(1.5);
        assert_eq!(user.cq_score, 1.5);
    }

    #[test]
    fn test_user_display() {
        let mut user = User::new("Ada", "ada@example.edu", Role::CafeteriaStaff).with_score(12.0);
        user.leaderboard_rank = Some(3);
        let output = user.to_string();
        assert!(output.contains("cafeteria_staff"));
        assert!(output.contains("CQ score: 12.0"));
        assert!(output.contains("Rank: #3"));
    }
}
