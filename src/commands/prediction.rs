use clap::{Args, Subcommand};
use mealswap_core::{Filter, MealType, Prediction};

use super::{parse_date, Context, OutputFormat};

#[derive(Args)]
pub struct PredictionCommand {
    #[command(subcommand)]
    pub command: PredictionSubcommand,
}

#[derive(Subcommand)]
pub enum PredictionSubcommand {
    /// Record a forecast produced elsewhere
    Add {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        /// Meal type (breakfast, lunch, dinner, snack)
        #[arg(long = "type", short = 't', value_name = "TYPE")]
        meal_type: String,

        /// Expected number of diners
        #[arg(long)]
        attendance: u32,

        /// Confidence between 0 and 1
        #[arg(long, default_value_t = 0.5)]
        confidence: f64,
    },

    /// List recorded predictions
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl PredictionCommand {
    pub async fn run(&self, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            PredictionSubcommand::Add {
                date,
                meal_type,
                attendance,
                confidence,
            } => {
                let meal_type: MealType = meal_type.parse()?;
                let date = parse_date(date.as_deref())?;
                let prediction = Prediction::new(date, meal_type, *attendance, *confidence);

                let user = ctx.current_user();
                ctx.exchange
                    .record_prediction(prediction.clone(), user.as_ref())
                    .await?;
                println!(
                    "Recorded {} {} prediction: {} diners",
                    prediction.date, prediction.meal_type, prediction.predicted_attendance
                );
                Ok(())
            }
            PredictionSubcommand::List { format } => {
                let mut predictions = ctx
                    .coordinator()
                    .fetch::<Prediction>(&Filter::all())
                    .await?;
                predictions.sort_by_key(|p| (p.date, p.meal_type.as_str()));

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&predictions)?)
                    }
                    OutputFormat::Text => {
                        if predictions.is_empty() {
                            println!("No predictions recorded.");
                            return Ok(());
                        }
                        println!("{:<10}  {:<9}  {:>9}  CONFIDENCE", "DATE", "TYPE", "DINERS");
                        for p in &predictions {
                            println!(
                                "{:<10}  {:<9}  {:>9}  {:.0}%",
                                p.date.to_string(),
                                p.meal_type.as_str(),
                                p.predicted_attendance,
                                p.confidence * 100.0
                            );
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
