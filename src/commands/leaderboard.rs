use clap::Args;

use super::{Context, OutputFormat};

#[derive(Args)]
pub struct LeaderboardCommand {
    /// Recompute ranks from current CQ scores before showing them
    #[arg(long)]
    update: bool,

    /// Number of entries to show
    #[arg(long, short = 'n', default_value_t = 10)]
    limit: usize,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl LeaderboardCommand {
    pub async fn run(&self, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
        if self.update {
            ctx.session.update_leaderboard().await?;
        } else {
            ctx.refresh().await?;
        }

        let me = ctx.current_user().map(|u| u.id);
        let board: Vec<_> = ctx
            .coordinator()
            .snapshot()
            .leaderboard
            .into_iter()
            .take(self.limit)
            .collect();

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&board)?),
            OutputFormat::Text => {
                if board.is_empty() {
                    println!("Leaderboard is empty.");
                    return Ok(());
                }
                println!("{:>4}  {:>7}  NAME", "RANK", "CQ");
                for user in &board {
                    let rank = user
                        .leaderboard_rank
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let marker = if Some(user.id) == me { " (you)" } else { "" };
                    println!("{:>4}  {:>7.1}  {}{}", rank, user.cq_score, user.name, marker);
                }
            }
        }
        Ok(())
    }
}
