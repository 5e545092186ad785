use clap::{Args, Subcommand};
use mealswap_core::{Role, User};
use uuid::Uuid;

use super::{Context, OutputFormat};

#[derive(Args)]
pub struct UserCommand {
    #[command(subcommand)]
    pub command: UserSubcommand,
}

#[derive(Subcommand)]
pub enum UserSubcommand {
    /// Create an account and sign in
    Register {
        /// Display name
        #[arg(long)]
        name: String,

        /// Email address (unique)
        #[arg(long)]
        email: String,

        /// Role (student, staff, admin)
        #[arg(long, default_value = "student")]
        role: String,
    },

    /// Sign in by email or user ID
    Login {
        /// Email address or user ID (UUID)
        user: String,
    },

    /// Sign out
    Logout,

    /// Show the signed-in user
    Whoami {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Edit your name or email
    Update {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },

    /// Deactivate your account and sign out
    Deactivate {
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
}

impl UserCommand {
    pub async fn run(&self, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            UserSubcommand::Register { name, email, role } => {
                let role: Role = role.parse()?;
                let user = ctx.session.register(name, email, role).await?;
                println!("Registered and signed in:");
                println!();
                print!("{}", user);
                println!("Id: {}", user.id);
                Ok(())
            }
            UserSubcommand::Login { user } => {
                let signed_in = match Uuid::parse_str(user) {
                    Ok(id) => ctx.session.sign_in(id).await?,
                    Err(_) => ctx.session.sign_in_by_email(user).await?,
                };
                println!("Signed in as {} <{}>", signed_in.name, signed_in.email);
                Ok(())
            }
            UserSubcommand::Logout => {
                match ctx.session.invalidate() {
                    Some(_) => println!("Signed out"),
                    None => println!("Not signed in"),
                }
                Ok(())
            }
            UserSubcommand::Whoami { format } => {
                let user = ctx.current_user().ok_or("Not signed in")?;
                print_user(&user, format)
            }
            UserSubcommand::Update { name, email } => {
                if name.is_none() && email.is_none() {
                    return Err("Nothing to update. Pass --name and/or --email.".into());
                }
                let user = ctx
                    .session
                    .update_profile(name.as_deref(), email.as_deref())
                    .await?;
                println!("Updated profile:");
                println!();
                print!("{}", user);
                Ok(())
            }
            UserSubcommand::Deactivate { yes } => {
                if !yes {
                    return Err("Deactivation cannot be undone. Re-run with --yes.".into());
                }
                ctx.session.deactivate().await?;
                println!("Account deactivated");
                Ok(())
            }
        }
    }
}

fn print_user(user: &User, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(user)?),
        OutputFormat::Text => {
            print!("{}", user);
            println!("Id: {}", user.id);
        }
    }
    Ok(())
}
