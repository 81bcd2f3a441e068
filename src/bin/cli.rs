use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use access_rules::access::{AccessEvaluator, CachePolicy, Operation, RuleStore, SqliteRuleSource};
use access_rules::db::{access_rules as rule_db, accounts};

#[derive(Parser, Debug)]
#[command(author, version, about = "access-rules admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Grant a role (e.g. SysAdmin) to the identity with the given email
    GrantRole {
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: String,
    },
    /// Print stored access rules
    ListRules {
        #[arg(long)]
        entity_type: Option<String>,
    },
    /// Evaluate whether an identity may perform an operation
    Check {
        #[arg(long)]
        email: String,
        #[arg(long)]
        entity_type: String,
        /// create, read, update, delete or view
        #[arg(long)]
        operation: Operation,
        /// Instance identifier, for instance-level rules
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::GrantRole { email, role } => {
            let pool = get_pool().await?;
            let identity = accounts::fetch_identity_by_email(&pool, &email)
                .await?
                .with_context(|| format!("no identity with email {email}"))?;
            let granted = accounts::grant_role_by_designation(&pool, identity.uuid()?, &role).await?;
            println!("Granted {} to {}", granted.designation, identity.email);
        }
        Commands::ListRules { entity_type } => {
            let pool = get_pool().await?;
            let rules = match entity_type {
                Some(entity_type) => rule_db::fetch_by_entity_type(&pool, &entity_type).await?,
                None => rule_db::fetch_all(&pool).await?,
            };

            println!(
                "{:<38} {:<16} {:<12} {:<14} {:<38} {}",
                "Id", "Entity", "Type", "Access", "Value", "CRUDV"
            );
            for rule in rules {
                let target = rule.access_value.as_deref().or(rule.entity_value.as_deref()).unwrap_or("-");
                let flags: String = [rule.creatable, rule.readable, rule.updatable, rule.deletable, rule.viewable]
                    .iter()
                    .zip(['C', 'R', 'U', 'D', 'V'])
                    .map(|(on, c)| if *on { c } else { '-' })
                    .collect();
                println!(
                    "{:<38} {:<16} {:<12} {:<14} {:<38} {}",
                    rule.id.to_string(),
                    rule.entity_type,
                    rule.rule_type.as_str(),
                    rule.access_type.as_str(),
                    target,
                    flags
                );
            }
        }
        Commands::Check { email, entity_type, operation, id } => {
            let pool = get_pool().await?;
            let identity_row = accounts::fetch_identity_by_email(&pool, &email)
                .await?
                .with_context(|| format!("no identity with email {email}"))?;
            let identity = accounts::load_identity(&pool, identity_row.uuid()?)
                .await?
                .context("identity vanished while loading roles")?;

            let source = Arc::new(SqliteRuleSource::new(pool.clone()));
            let evaluator = AccessEvaluator::new(Arc::new(RuleStore::new(source, CachePolicy::Disabled)));
            let permitted = evaluator
                .is_permitted(&entity_type, id.as_deref(), operation, &identity)
                .await?;

            println!("{}", if permitted { "permitted" } else { "denied" });
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let db_applied = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    let applied_versions: HashSet<i64> = if db_applied.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when running from the repo root, else the crate-local folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
