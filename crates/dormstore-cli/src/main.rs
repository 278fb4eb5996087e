mod inventory;
mod users;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use crate::inventory::InventoryCommands;
use crate::users::{BalanceCommands, UserCommands};

#[derive(Debug, Parser)]
#[command(name = "dormstore-cli")]
#[command(about = "My Dorm Store operations command line")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database connectivity and migrations
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Package stock maintenance
    Inventory {
        #[command(subcommand)]
        command: InventoryCommands,
    },
    /// Shopper accounts and bearer tokens
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Shopper balances
    Balance {
        #[command(subcommand)]
        command: BalanceCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database answers
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("dormstore-cli: run with --help to list commands");
        return Ok(());
    };

    let config = dormstore_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = dormstore_db::PoolConfig::from_app_config(&config);
    let pool = dormstore_db::connect_pool(&config.database_url, pool_config).await?;

    let result = run(&pool, &config, command).await;
    pool.close().await;
    result
}

async fn run(
    pool: &sqlx::PgPool,
    config: &dormstore_core::AppConfig,
    command: Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            dormstore_db::ping(pool).await?;
            println!("database ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = dormstore_db::run_migrations(pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Inventory {
            command: InventoryCommands::Sync,
        } => inventory::run_inventory_sync(pool).await?,
        Commands::Inventory {
            command: InventoryCommands::Check,
        } => inventory::run_inventory_check(pool).await?,
        Commands::User {
            command: UserCommands::Create { email, name },
        } => users::run_user_create(pool, &email, name.as_deref()).await?,
        Commands::User {
            command: UserCommands::Token { user_id, ttl_days },
        } => users::run_user_token(pool, &config.token_hash_salt, user_id, ttl_days).await?,
        Commands::Balance {
            command: BalanceCommands::Show { user_id },
        } => users::run_balance_show(pool, user_id).await?,
        Commands::Balance {
            command: BalanceCommands::TopUp { user_id, amount },
        } => users::run_balance_top_up(pool, user_id, amount).await?,
    }
    Ok(())
}

/// Parses a money amount such as `25` or `25.00`.
fn parse_amount(raw: &str) -> Result<Decimal, String> {
    let amount: Decimal = raw
        .trim()
        .parse()
        .map_err(|e| format!("invalid amount '{raw}': {e}"))?;
    if amount.scale() > 2 {
        return Err(format!("amount '{raw}' has more than two decimal places"));
    }
    Ok(amount)
}
