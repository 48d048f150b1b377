mod api;
mod config;
mod db;
mod error;
mod scheduling;

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "realty-scheduler",
    about = "Calendar availability and slot scheduling service"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server (default)
    Serve,

    /// Create a new user
    CreateUser {
        /// E-mail address, used to sign in and to own records
        #[arg(short, long)]
        email: String,
        /// Password
        #[arg(short, long)]
        password: String,
        /// Display name (optional)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Create an API token for a user
    CreateToken {
        /// E-mail of the token owner
        #[arg(short, long)]
        email: String,
        /// A descriptive name for this token
        #[arg(short, long)]
        name: String,
        /// Days until the token expires (never, if omitted)
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// List all users
    ListUsers,

    /// List API tokens for a user
    ListTokens {
        /// E-mail of the token owner
        #[arg(short, long)]
        email: String,
    },

    /// Delete an API token by ID
    DeleteToken {
        /// Token ID to delete
        #[arg(short, long)]
        id: String,
    },

    /// Reset a user's password
    ResetPassword {
        /// E-mail of the user
        #[arg(short, long)]
        email: String,
        /// New password
        #[arg(short, long)]
        password: String,
    },

    /// Print the open slots for a user
    AvailableSlots {
        /// E-mail of the user
        #[arg(short, long)]
        email: String,
        /// First day (YYYY-MM-DD)
        #[arg(short, long)]
        start: String,
        /// Last day (YYYY-MM-DD), inclusive
        #[arg(short = 'n', long)]
        end: String,
        /// Slot length in minutes
        #[arg(short, long, default_value_t = scheduling::DEFAULT_SLOT_MINUTES)]
        duration: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve);

    match command {
        Commands::Serve => run_server().await,
        Commands::CreateUser {
            email,
            password,
            name,
        } => cmd_create_user(&email, &password, name.as_deref()).await,
        Commands::CreateToken { email, name, days } => {
            cmd_create_token(&email, &name, days).await
        }
        Commands::ListUsers => cmd_list_users().await,
        Commands::ListTokens { email } => cmd_list_tokens(&email).await,
        Commands::DeleteToken { id } => cmd_delete_token(&id).await,
        Commands::ResetPassword { email, password } => cmd_reset_password(&email, &password).await,
        Commands::AvailableSlots {
            email,
            start,
            end,
            duration,
        } => cmd_available_slots(&email, &start, &end, duration).await,
    }
}

/// Start the API server.
async fn run_server() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env()?;
    tracing::info!(
        api_port = config.api_port,
        default_timezone = config.default_timezone.name(),
        workday_start = %config.workday.start,
        workday_end = %config.workday.end,
        "Starting scheduler"
    );

    let pool = db::init_pool(&config.database_url).await?;
    tracing::info!("Database initialized");

    let app = api::router(pool, config.schedule_settings());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Helper: load config and open the DB pool for CLI commands.
async fn cli_setup() -> anyhow::Result<(config::Config, sqlx::SqlitePool)> {
    let config = config::Config::from_env()?;
    let pool = db::init_pool(&config.database_url).await?;
    Ok((config, pool))
}

async fn require_user(pool: &sqlx::SqlitePool, email: &str) -> anyhow::Result<db::models::User> {
    db::users::get_user_by_email(pool, email)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User '{email}' not found"))
}

/// Create a new user.
async fn cmd_create_user(email: &str, password: &str, name: Option<&str>) -> anyhow::Result<()> {
    let (_, pool) = cli_setup().await?;
    let user = db::users::create_user(&pool, email, name, password).await?;
    println!("User created:");
    println!("  ID:    {}", user.id);
    println!("  Email: {}", user.email);
    if let Some(ref n) = user.name {
        println!("  Name:  {n}");
    }
    Ok(())
}

/// Create an API token for a user.
async fn cmd_create_token(email: &str, name: &str, days: Option<i64>) -> anyhow::Result<()> {
    if days.is_some_and(|d| d <= 0) {
        anyhow::bail!("--days must be positive");
    }
    let (_, pool) = cli_setup().await?;
    let user = require_user(&pool, email).await?;

    let valid_for = days.map(chrono::Duration::days);
    let (raw_token, record) = db::tokens::create_token(&pool, &user.id, name, valid_for).await?;
    println!("API token created:");
    println!("  ID:      {}", record.id);
    println!("  Name:    {}", record.name);
    if let Some(expires) = record.expires_at {
        println!("  Expires: {}", expires.format("%Y-%m-%d %H:%M UTC"));
    }
    println!("  Token:   {raw_token}");
    println!();
    println!("Save this token, it cannot be retrieved again.");
    Ok(())
}

/// List all users.
async fn cmd_list_users() -> anyhow::Result<()> {
    let (_, pool) = cli_setup().await?;
    let users = db::users::list_users(&pool).await?;

    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    println!("{:<38} {:<32} Name", "ID", "Email");
    println!("{}", "-".repeat(80));
    for u in &users {
        println!(
            "{:<38} {:<32} {}",
            u.id,
            u.email,
            u.name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// List API tokens for a user.
async fn cmd_list_tokens(email: &str) -> anyhow::Result<()> {
    let (_, pool) = cli_setup().await?;
    let user = require_user(&pool, email).await?;

    let tokens = db::tokens::list_tokens_for_user(&pool, &user.id).await?;
    if tokens.is_empty() {
        println!("No tokens found for user '{email}'.");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<20} Expires", "ID", "Name", "Created");
    println!("{}", "-".repeat(92));
    for t in &tokens {
        let expires = t
            .expires_at
            .map(|e| e.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!("{:<38} {:<20} {:<20} {expires}", t.id, t.name, t.created_at.format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}

/// Delete an API token by ID.
async fn cmd_delete_token(token_id: &str) -> anyhow::Result<()> {
    let (_, pool) = cli_setup().await?;
    db::tokens::delete_token(&pool, token_id).await?;
    println!("Token {token_id} deleted.");
    Ok(())
}

/// Reset a user's password.
async fn cmd_reset_password(email: &str, password: &str) -> anyhow::Result<()> {
    let (_, pool) = cli_setup().await?;
    db::users::reset_password(&pool, email, password).await?;
    println!("Password updated for user '{email}'.");
    Ok(())
}

/// Print a user's open slots as a table.
async fn cmd_available_slots(
    email: &str,
    start: &str,
    end: &str,
    duration: u32,
) -> anyhow::Result<()> {
    let (config, pool) = cli_setup().await?;
    let user = require_user(&pool, email).await?;

    let query = scheduling::SlotQuery::new(
        scheduling::parse_date(start)?,
        scheduling::parse_date(end)?,
        duration,
    )?;
    let response =
        scheduling::find_available_slots(&pool, config.schedule_settings(), &user.email, &query)
            .await?;

    if response.slots.is_empty() {
        println!("No open slots for '{email}' between {start} and {end}.");
        return Ok(());
    }

    println!("{:<22} {:<22} Preferred", "Start (UTC)", "End (UTC)");
    println!("{}", "-".repeat(56));
    for slot in &response.slots {
        println!(
            "{:<22} {:<22} {}",
            slot.start_time.format("%Y-%m-%d %H:%M"),
            slot.end_time.format("%Y-%m-%d %H:%M"),
            if slot.is_preferred { "yes" } else { "" }
        );
    }
    println!();
    println!("{} slot(s)", response.total);
    Ok(())
}
