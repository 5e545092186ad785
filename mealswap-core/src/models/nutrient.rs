use serde::{Deserialize, Serialize};
use std::fmt;

/// One line of nutrition metadata attached to a meal, e.g. `protein: 12 g`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Nutrient {
    pub name: String,
    pub amount: f64,
    pub unit: String,
}

impl Nutrient {
    pub fn new(name: impl Into<String>, amount: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount,
            unit: unit.into(),
        }
    }

    /// Parses `name=amount[unit]`, e.g. `calories=450kcal` or `protein=12.5g`.
    pub fn parse(s: &str) -> Option<Self> {
        let (name, rest) = s.split_once('=')?;
        let split_at = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (amount, unit) = rest.split_at(split_at);
        let amount: f64 = amount.parse().ok()?;
        Some(Self::new(name.trim(), amount, unit.trim()))
    }
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.name, self.amount, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nutrient_parse() {
        let n = Nutrient::parse("calories=450kcal").unwrap();
        assert_eq!(n, Nutrient::new("calories", 450.0, "kcal"));

        let n = Nutrient::parse("protein=12.5g").unwrap();
        assert_eq!(n.amount, 12.5);
        assert_eq!(n.unit, "g");
    }

    #[test]
    fn test_nutrient_parse_rejects_garbage() {
        assert!(Nutrient::parse("calories").is_none());
        assert!(Nutrient::parse("calories=lots").is_none());
    }

    #[test]
    fn test_nutrient_display() {
        assert_eq!(Nutrient::new("fat", 3.0, "g").to_string(), "fat: 3 g");
    }
}
