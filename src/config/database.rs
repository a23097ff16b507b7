//! Database configuration module.
//!
//! This module handles the `SQLite` connection and table creation using `SeaORM`. Tables are
//! generated from the entity definitions with `Schema::create_table_from_entity`, so the
//! schema always matches the Rust structs without hand-written SQL. Creation is
//! idempotent; running it against an existing database leaves the data alone.

use crate::entities::{Coupon, CouponUsage, Service, ServiceOrder, Transaction};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use std::path::Path;
use tracing::info;

/// Database used when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/smm_ledger.sqlite?mode=rwc";

/// Gets the database URL from the environment, falling back to the local `SQLite` file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Directory that must exist before `SQLite` can create the file behind `url`.
fn sqlite_parent_dir(url: &str) -> Option<&Path> {
    let path = url.strip_prefix("sqlite://")?;
    let path = path.split('?').next()?;
    Path::new(path)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
}

/// Connects to the database named by `DATABASE_URL`, creating the local data directory
/// when needed.
///
/// # Errors
/// Returns an error if the directory cannot be created or the connection fails.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    if let Some(dir) = sqlite_parent_dir(&database_url) {
        std::fs::create_dir_all(dir)?;
    }

    let db = Database::connect(&database_url).await?;
    info!("Connected to {database_url}");
    Ok(db)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates the transactions, coupons, coupon usages, services and service orders tables.
///
/// # Errors
/// Returns an error if a table cannot be created.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    create_table(db, Transaction).await?;
    create_table(db, Coupon).await?;
    create_table(db, CouponUsage).await?;
    create_table(db, Service).await?;
    create_table(db, ServiceOrder).await?;
    Ok(())
}
