//! MealSwap application crate: configuration and the HTTP store server.

pub mod config;
pub mod server;
