//! Atelier CLI - Database migrations and user bootstrap.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! atelier migrate
//!
//! # Create the first admin (password read from ATELIER_USER_PASSWORD)
//! atelier user create -n "Asha Rao" -e asha@atelier.test -r admin
//!
//! # Create a manager for two shops
//! atelier user create -n "Ravi" -e ravi@atelier.test -r manager -s S1,S2
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user create` - Create a user directly, bypassing authorization

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(author, version, about = "Atelier CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user
    Create {
        /// Display name (the username is derived from it)
        #[arg(short, long)]
        name: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Role (`admin`, `manager`, `user`)
        #[arg(short, long, default_value = "user")]
        role: String,

        /// Shops, comma separated (must be empty for admins)
        #[arg(short, long, value_delimiter = ',')]
        shops: Vec<String>,

        /// Initial password
        #[arg(long, env = "ATELIER_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                name,
                email,
                role,
                shops,
                password,
            } => {
                commands::user::create(commands::user::NewUserArgs {
                    name,
                    email,
                    role,
                    shops,
                    password,
                })
                .await?;
            }
        },
    }
    Ok(())
}
