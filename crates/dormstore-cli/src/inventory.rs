//! Package stock maintenance commands.
//!
//! Composite package stock is kept in sync by every catalog write and sale;
//! these commands exist to inspect and repair drift after manual SQL edits.

use clap::Subcommand;

/// Sub-commands available under `inventory`.
#[derive(Debug, Subcommand)]
pub enum InventoryCommands {
    /// Recompute stock for every composite package
    Sync,
    /// Report composite packages whose stored stock differs from their components
    Check,
}

pub(crate) async fn run_inventory_sync(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let changes = dormstore_db::sync_all_packages(pool).await?;

    if changes.is_empty() {
        println!("all composite packages already in sync");
        return Ok(());
    }

    println!("{:<12}{:<10}CURRENT", "PACKAGE", "PREVIOUS");
    for change in &changes {
        println!(
            "{:<12}{:<10}{}",
            change.package_id, change.previous, change.current
        );
    }
    println!("updated {} package(s)", changes.len());
    Ok(())
}

/// Prints drifted packages and fails when any are found, so the command can
/// gate a deploy script.
pub(crate) async fn run_inventory_check(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let drift = dormstore_db::check_package_stock(pool).await?;

    if drift.is_empty() {
        println!("no package stock drift");
        return Ok(());
    }

    println!("{:<10}{:<8}{:<9}NAME", "PACKAGE", "STORED", "DERIVED");
    for row in &drift {
        println!(
            "{:<10}{:<8}{:<9}{}",
            row.package_id, row.stored, row.derived, row.name
        );
    }
    anyhow::bail!(
        "{} package(s) out of sync; run `inventory sync` to repair",
        drift.len()
    )
}
