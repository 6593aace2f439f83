//! BA Assistant - REST and WebSocket backend for business analysts

use anyhow::{bail, Context};
use ba_assistant::{
    config::AppConfig,
    db::{Database, NewUser},
    logging,
    permissions::Role,
    security::PasswordManager,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP and WebSocket server (default)
    Serve,
    /// Create or upgrade the database schema
    Migrate,
    /// Create an administrator account
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long, default_value = "Admin")]
        first_name: String,
        #[arg(long, default_value = "User")]
        last_name: String,
    },
    /// Set a new password for an account
    ResetPassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Turn off two-factor authentication for an account
    Reset2fa {
        #[arg(long)]
        email: String,
    },
    /// Print every table with its row count
    CheckTables,
}

#[derive(Parser, Debug)]
#[command(name = "ba-assistant")]
#[command(version)]
#[command(about = "Business Analyst Assistant backend", long_about = None)]
struct Args {
    /// Configuration file path (overrides defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path (default: <data dir>/ba-assistant/ba_assistant.db)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(path) = args.db_path {
        config.db_path = path;
    }
    config.validate()?;

    logging::init_tracing(args.verbose, config.log_file.as_deref())?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            config.require_jwt_secret()?;
            ba_assistant::api::serve(&config).await?;
        }
        Command::Migrate => {
            open(&config).await?;
            println!("Database schema is up to date at {}", config.db_path.display());
        }
        Command::CreateAdmin {
            email,
            password,
            username,
            first_name,
            last_name,
        } => {
            let db = open(&config).await?;
            PasswordManager::check_policy(&password)?;
            if db.find_user_by_email(&email).await?.is_some() {
                bail!("A user with email {} already exists", email);
            }

            let hash = PasswordManager::new().hash_password(&password)?;
            let user = db
                .create_user(
                    &NewUser::new(email, hash, first_name, last_name)
                        .with_username(username)
                        .with_role(Role::Admin.as_str()),
                )
                .await?;
            println!("Created admin {} (id {})", user.email, user.id);
        }
        Command::ResetPassword { email, password } => {
            let db = open(&config).await?;
            let user = find_user(&db, &email).await?;
            PasswordManager::check_policy(&password)?;

            let hash = PasswordManager::new().hash_password(&password)?;
            db.update_password(user.id, &hash).await?;
            let ended = db.end_user_sessions(user.id, None).await?;
            println!("Password reset for {}, ended {} sessions", user.email, ended);
        }
        Command::Reset2fa { email } => {
            let db = open(&config).await?;
            let user = find_user(&db, &email).await?;

            if db.delete_two_factor(user.id).await? {
                println!("Two-factor authentication disabled for {}", user.email);
            } else {
                println!("{} had no two-factor configuration", user.email);
            }
        }
        Command::CheckTables => {
            let db = open(&config).await?;
            for (table, rows) in db.table_counts().await? {
                println!("{:<32} {:>8}", table, rows);
            }
        }
    }

    Ok(())
}

async fn open(config: &AppConfig) -> anyhow::Result<Database> {
    Database::new(&config.db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))
}

async fn find_user(db: &Database, email: &str) -> anyhow::Result<ba_assistant::db::User> {
    db.find_user_by_email(email)
        .await?
        .with_context(|| format!("No user with email {}", email))
}
