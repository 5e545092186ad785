mod config_cmd;
mod leaderboard;
mod meal;
mod prediction;
mod user;

pub use config_cmd::ConfigCommand;
pub use leaderboard::LeaderboardCommand;
pub use meal::MealCommand;
pub use prediction::PredictionCommand;
pub use user::UserCommand;

use chrono::{Local, NaiveDate};
use clap::ValueEnum;
use mealswap::config::Config;
use mealswap_core::{MealExchange, SessionPointer, SessionService, SyncCoordinator, User};
use std::sync::Arc;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Engine and session wired to the configured store.
pub struct Context {
    pub exchange: MealExchange,
    pub session: SessionService,
}

impl Context {
    /// Builds the store from `config` and restores any saved session.
    pub async fn open(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let mode = config.to_store_mode()?;
        let coordinator = Arc::new(
            SyncCoordinator::from_mode(&mode).with_timeout(config.store.timeout()),
        );
        let session = SessionService::new(
            coordinator.clone(),
            SessionPointer::new(config.data_dir.value.clone()),
        );
        session.restore().await?;

        Ok(Self {
            exchange: MealExchange::new(coordinator),
            session,
        })
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        self.exchange.coordinator()
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.current_user()
    }

    /// Re-reads collections for whoever is signed in.
    pub async fn refresh(&self) -> Result<(), Box<dyn std::error::Error>> {
        let user_id = self.current_user().map(|u| u.id);
        self.coordinator().refresh(user_id).await?;
        Ok(())
    }
}

/// Parses YYYY-MM-DD, defaulting to today.
pub fn parse_date(date: Option<&str>) -> Result<NaiveDate, String> {
    match date {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| format!("Invalid date format '{}'. Use YYYY-MM-DD.", s)),
        None => Ok(Local::now().date_naive()),
    }
}
