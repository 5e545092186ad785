use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ParseEnumError;

/// Role of a participant in the dining community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Student,
    CafeteriaStaff,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::CafeteriaStaff => write!(f, "cafeteria_staff"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "student" => Ok(Role::Student),
            "cafeteria_staff" | "staff" => Ok(Role::CafeteriaStaff),
            "admin" => Ok(Role::Admin),
            _ => Err(ParseEnumError::new(
                "role",
                s,
                "student, cafeteria_staff, admin",
            )),
        }
    }
}
