//! Shared test utilities for `smm_ledger`.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        coupon::{self, NewCoupon},
        currency::Currency,
        ledger::Transaction,
        service::{self, NewService},
    },
    entities::{
        self,
        coupon::DiscountType,
        service::{Platform, ServiceType},
        transaction::{TransactionKind, TransactionStatus},
    },
    errors::Result,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Routes `tracing` output through the test harness so it shows up for failing tests.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Creates a test coupon with sensible defaults.
///
/// # Defaults
/// * `max_uses`: None (unlimited)
/// * `expires_at`: None (never expires)
pub async fn create_test_coupon(
    db: &DatabaseConnection,
    code: &str,
    discount_type: DiscountType,
    discount_value: f64,
    min_amount: f64,
) -> Result<entities::coupon::Model> {
    coupon::create_coupon(
        db,
        NewCoupon {
            code: code.to_string(),
            discount_type,
            discount_value,
            min_amount,
            max_uses: None,
            expires_at: None,
        },
    )
    .await
}

/// Creates a coupon with every field chosen by the test.
pub async fn create_custom_coupon(
    db: &DatabaseConnection,
    new: NewCoupon,
) -> Result<entities::coupon::Model> {
    coupon::create_coupon(db, new).await
}

/// Builds service input with sensible defaults.
///
/// # Defaults
/// * `platform`: Instagram
/// * `service_type`: Followers
/// * quantity range: 1 to 10,000
/// * `is_active`: true
pub fn new_test_service(name: &str, provider_price: f64, profit_margin: f64) -> NewService {
    NewService {
        name: name.to_string(),
        platform: Platform::Instagram,
        service_type: ServiceType::Followers,
        provider_price,
        profit_margin,
        min_quantity: 1,
        max_quantity: 10_000,
        is_active: true,
    }
}

/// Creates a test service with the defaults of [`new_test_service`].
pub async fn create_test_service(
    db: &DatabaseConnection,
    name: &str,
    provider_price: f64,
    profit_margin: f64,
) -> Result<entities::service::Model> {
    service::create_service(db, new_test_service(name, provider_price, profit_margin)).await
}

/// A completed EGP income paid by card with a 2.9% fee.
pub fn sample_transaction(amount: f64) -> Transaction {
    let fees = crate::core::calculator::round_currency(amount * 0.029);
    let now = Utc::now();
    Transaction {
        id: Uuid::new_v4(),
        kind: TransactionKind::Income,
        amount,
        currency: Currency::Egp,
        description: "Instagram followers".to_string(),
        category: "instagram".to_string(),
        order_id: Some("ORD-1".to_string()),
        user_id: Some("user-1".to_string()),
        payment_method: "credit_card".to_string(),
        status: TransactionStatus::Completed,
        created_at: now,
        processed_at: Some(now),
        fees,
        net_amount: amount - fees,
        exchange_rate: Some(48.5),
        refund_of: None,
        idempotency_key: None,
        gateway_reference: Some("CARD-TEST".to_string()),
        failure_reason: None,
    }
}

/// A fresh temporary directory and a snapshot path inside it.
///
/// The file does not exist yet. The directory and everything written into it are
/// removed when the returned `TempDir` is dropped, even if the test panics.
pub fn temp_snapshot() -> Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.json");
    Ok((dir, path))
}
