use std::process::{Command, Output};

use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::tempdir;

use access_rules::db::{access_rules as rule_db, accounts};
use access_rules::models::access_rule::{AccessRule, AccessType, RuleType};

const APP_ADMIN_ROLE_ID: &str = "3c7e2b9d-1f4a-4b6c-8d5e-7a9f0c2e4b61";

async fn test_pool(path: &std::path::Path) -> Result<SqlitePool> {
    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new().filename(path).create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;
    Ok(pool)
}

fn run_cli(database_url: &str, args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_access-rules-cli"))
        .env("DATABASE_URL", database_url)
        .args(args)
        .output()?)
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[tokio::test]
async fn check_follows_role_grants() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("cli.db");
    let pool = test_pool(&db_path).await?;
    let database_url = format!("sqlite://{}", db_path.display());

    accounts::insert_identity(&pool, "User", "user@example.com", "not-a-real-hash").await?;
    let rule = AccessRule::new(RuleType::EntityType, "Document", AccessType::IdentityRole)
        .with_access_value(APP_ADMIN_ROLE_ID);
    rule_db::insert(&pool, &rule).await?;

    let check = [
        "check",
        "--email",
        "user@example.com",
        "--entity-type",
        "Document",
        "--operation",
        "read",
    ];

    let output = run_cli(&database_url, &check)?;
    assert!(output.status.success(), "check failed: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_of(&output), "denied");

    let output = run_cli(&database_url, &["grant-role", "--email", "user@example.com", "--role", "AppAdmin"])?;
    assert!(output.status.success(), "grant-role failed: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout_of(&output).contains("Granted AppAdmin"));

    let output = run_cli(&database_url, &check)?;
    assert_eq!(stdout_of(&output), "permitted");

    // Types without rules stay open
    let output = run_cli(
        &database_url,
        &["check", "--email", "user@example.com", "--entity-type", "Invoice", "--operation", "delete"],
    )?;
    assert_eq!(stdout_of(&output), "permitted");

    Ok(())
}

#[tokio::test]
async fn list_rules_and_migration_status() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("cli.db");
    let pool = test_pool(&db_path).await?;
    let database_url = format!("sqlite://{}", db_path.display());

    let rule = AccessRule::new(RuleType::Entities, "Document", AccessType::All).with_flags(true, false, true, true, false);
    rule_db::insert(&pool, &rule).await?;

    let output = run_cli(&database_url, &["list-rules", "--entity-type", "Document"])?;
    assert!(output.status.success(), "list-rules failed: {}", String::from_utf8_lossy(&output.stderr));
    let listing = stdout_of(&output);
    assert!(listing.contains(&rule.id.to_string()), "rule missing from listing: {}", listing);
    assert!(listing.contains("C-UD-"), "flags column missing: {}", listing);

    let output = run_cli(&database_url, &["list-rules", "--entity-type", "Invoice"])?;
    assert!(!stdout_of(&output).contains(&rule.id.to_string()));

    let output = run_cli(&database_url, &["migrate-status"])?;
    let status = stdout_of(&output);
    assert!(status.contains("applied"), "unexpected status: {}", status);
    assert!(!status.contains("pending"), "unexpected status: {}", status);

    Ok(())
}

#[tokio::test]
async fn unknown_email_fails() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("cli.db");
    let _pool = test_pool(&db_path).await?;
    let database_url = format!("sqlite://{}", db_path.display());

    let output = run_cli(
        &database_url,
        &["check", "--email", "nobody@example.com", "--entity-type", "Document", "--operation", "read"],
    )?;
    assert!(!output.status.success());

    Ok(())
}
