use chrono::Utc;
use clap::{Args, Subcommand, ValueEnum};
use mealswap_core::{Filter, Meal, MealType, Nutrient};
use uuid::Uuid;

use super::{parse_date, Context, OutputFormat};

/// Which meals `meal list` shows
#[derive(Clone, Copy, ValueEnum, Default)]
pub enum MealView {
    Available,
    #[default]
    Offered,
    /// Meals you claimed
    Claimed,
    All,
}

#[derive(Args)]
pub struct MealCommand {
    #[command(subcommand)]
    pub command: MealSubcommand,
}

#[derive(Subcommand)]
pub enum MealSubcommand {
    /// List a surplus meal as available
    Add {
        /// Meal name
        name: String,

        /// Meal type (breakfast, lunch, dinner, snack)
        #[arg(long = "type", short = 't', value_name = "TYPE")]
        meal_type: String,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Where to pick it up
        #[arg(long)]
        location: Option<String>,

        /// Nutrient as name=amountunit, e.g. calories=450kcal (can be repeated)
        #[arg(long = "nutrient", value_name = "NUTRIENT")]
        nutrients: Vec<String>,
    },

    /// List meals
    List {
        #[arg(long, value_enum, default_value = "offered")]
        view: MealView,

        /// Include offers whose window has closed
        #[arg(long)]
        include_expired: bool,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show meal details
    Show {
        /// Meal ID or name
        meal: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Offer an available meal for exchange
    Offer {
        /// Meal ID or name
        meal: String,
    },

    /// Claim an offered meal
    Claim {
        /// Meal ID or name
        meal: String,
    },

    /// Report whether a claimed meal was eaten
    Confirm {
        /// Meal ID or name
        meal: String,

        /// The meal was not eaten
        #[arg(long)]
        not_consumed: bool,
    },

    /// Close an offer whose window has passed
    Expire {
        /// Meal ID or name
        meal: String,
    },
}

impl MealCommand {
    pub async fn run(&self, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            MealSubcommand::Add {
                name,
                meal_type,
                date,
                description,
                location,
                nutrients,
            } => {
                let meal_type: MealType = meal_type.parse()?;
                let date = parse_date(date.as_deref())?;

                let mut meal = Meal::new(name, meal_type, date);
                if let Some(d) = description {
                    meal = meal.with_description(d);
                }
                if let Some(l) = location {
                    meal = meal.with_location(l);
                }
                if !nutrients.is_empty() {
                    let parsed = nutrients
                        .iter()
                        .map(|n| {
                            Nutrient::parse(n).ok_or_else(|| {
                                format!("Invalid nutrient '{}'. Use name=amountunit.", n)
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    meal = meal.with_nutrients(parsed);
                }

                let user = ctx.current_user();
                let listed = ctx.exchange.list_meal(meal, user.as_ref()).await?;
                println!("Listed meal:");
                println!();
                print!("{}", listed);
                Ok(())
            }
            MealSubcommand::List {
                view,
                include_expired,
                format,
            } => self.list(ctx, *view, *include_expired, format).await,
            MealSubcommand::Show { meal, format } => {
                let meal = resolve_meal(ctx, meal).await?;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&meal)?),
                    OutputFormat::Text => print!("{}", meal),
                }
                Ok(())
            }
            MealSubcommand::Offer { meal } => {
                let meal = resolve_meal(ctx, meal).await?;
                let user = ctx.current_user();
                let (offered, swap) = ctx.exchange.offer(&meal, user.as_ref()).await?;
                println!(
                    "Offered '{}' until {} (swap {})",
                    offered.name,
                    swap.expires_at.format("%H:%M UTC"),
                    swap.id
                );
                Ok(())
            }
            MealSubcommand::Claim { meal } => {
                let meal = resolve_meal(ctx, meal).await?;
                let user = ctx.current_user();
                let (claimed, _) = ctx.exchange.claim(&meal, user.as_ref()).await?;
                if let Some(deadline) = claimed.claim_deadline_time {
                    println!(
                        "Claimed '{}'. Pick it up by {}",
                        claimed.name,
                        deadline.format("%H:%M UTC")
                    );
                }
                Ok(())
            }
            MealSubcommand::Confirm { meal, not_consumed } => {
                let meal = resolve_meal(ctx, meal).await?;
                let user = ctx.current_user();
                let confirmed = ctx
                    .exchange
                    .confirm_consumption(&meal, !not_consumed, user.as_ref())
                    .await?;
                println!("'{}' is now {}", confirmed.name, confirmed.status);
                Ok(())
            }
            MealSubcommand::Expire { meal } => {
                let meal = resolve_meal(ctx, meal).await?;
                let user = ctx.current_user();
                match ctx.exchange.expire_offer(&meal, user.as_ref()).await? {
                    Some(swap) => println!("Expired swap {}", swap.id),
                    None => println!("Offer on '{}' is still open", meal.name),
                }
                Ok(())
            }
        }
    }

    async fn list(
        &self,
        ctx: &Context,
        view: MealView,
        include_expired: bool,
        format: &OutputFormat,
    ) -> Result<(), Box<dyn std::error::Error>> {
        ctx.refresh().await?;
        let snapshot = ctx.coordinator().snapshot();
        let now = Utc::now();

        let meals: Vec<Meal> = match view {
            MealView::Available => snapshot.available,
            MealView::Offered => snapshot
                .offered
                .into_iter()
                .filter(|m| include_expired || !m.is_offer_expired(now))
                .collect(),
            MealView::Claimed => {
                if ctx.current_user().is_none() {
                    return Err("Not signed in".into());
                }
                snapshot.claimed
            }
            MealView::All => ctx.coordinator().fetch::<Meal>(&Filter::all()).await?,
        };

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&meals)?),
            OutputFormat::Text => {
                if meals.is_empty() {
                    println!("No meals found.");
                    return Ok(());
                }
                println!(
                    "{:<36}  {:<10}  {:<9}  {:<10}  NAME",
                    "ID", "DATE", "TYPE", "STATUS"
                );
                for meal in &meals {
                    println!(
                        "{:<36}  {:<10}  {:<9}  {:<10}  {}",
                        meal.id,
                        meal.date.to_string(),
                        meal.meal_type.to_string(),
                        meal.status.to_string(),
                        meal.name
                    );
                }
            }
        }
        Ok(())
    }
}

/// Finds a meal by ID, or by exact name (case-insensitive) among meals still
/// in the exchange.
async fn resolve_meal(ctx: &Context, reference: &str) -> Result<Meal, Box<dyn std::error::Error>> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return ctx
            .coordinator()
            .find::<Meal>(id)
            .await?
            .ok_or_else(|| format!("Meal not found: {}", reference).into());
    }

    let mut matches: Vec<Meal> = ctx
        .coordinator()
        .fetch::<Meal>(&Filter::all())
        .await?
        .into_iter()
        .filter(|m| m.name.eq_ignore_ascii_case(reference.trim()))
        .filter(|m| !m.status.is_terminal())
        .collect();

    match matches.len() {
        0 => Err(format!("Meal not found: {}", reference).into()),
        1 => Ok(matches.remove(0)),
        n => Err(format!("'{}' matches {} meals; use the meal ID", reference, n).into()),
    }
}
