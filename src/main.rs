use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    ConfigCommand, Context, LeaderboardCommand, MealCommand, PredictionCommand, UserCommand,
};
use mealswap::config::Config;

#[derive(Parser)]
#[command(name = "mealswap")]
#[command(version)]
#[command(about = "Exchange surplus dining-hall meals", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register, sign in and manage your profile
    User(UserCommand),

    /// List, offer, claim and confirm meals
    Meal(MealCommand),

    /// Show or recompute the CQ leaderboard
    Leaderboard(LeaderboardCommand),

    /// Record and view attendance predictions
    Prediction(PredictionCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mealswap=warn,mealswap_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::User(cmd)) => {
            let ctx = Context::open(&config).await?;
            cmd.run(&ctx).await?;
        }
        Some(Commands::Meal(cmd)) => {
            let ctx = Context::open(&config).await?;
            cmd.run(&ctx).await?;
        }
        Some(Commands::Leaderboard(cmd)) => {
            let ctx = Context::open(&config).await?;
            cmd.run(&ctx).await?;
        }
        Some(Commands::Prediction(cmd)) => {
            let ctx = Context::open(&config).await?;
            cmd.run(&ctx).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
