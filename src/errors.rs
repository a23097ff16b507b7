//! Unified error types for the finance core.
//!
//! Calculator and coupon errors are raised before any ledger mutation happens, so a
//! caller that receives one can be sure nothing was written.

use crate::core::coupon::CouponRejection;
use thiserror::Error;

/// Every error the crate can return.
#[derive(Debug, Error)]
pub enum Error {
    /// A numeric input was negative, NaN or infinite.
    #[error("Invalid {name}: {value}")]
    InvalidArgument {
        /// Name of the offending argument
        name: &'static str,
        /// The rejected value
        value: f64,
    },

    /// A non-numeric input was malformed (empty name, bad code, missing reference).
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input
        message: String,
    },

    /// No transaction with this id exists in the ledger.
    #[error("Transaction '{id}' not found")]
    TransactionNotFound {
        /// Transaction id
        id: String,
    },

    /// No coupon with this code or id exists.
    #[error("Coupon '{code}' not found")]
    CouponNotFound {
        /// Coupon code or id
        code: String,
    },

    /// No service with this id exists.
    #[error("Service '{id}' not found")]
    ServiceNotFound {
        /// Service id
        id: i64,
    },

    /// No service order with this id exists.
    #[error("Order '{id}' not found")]
    OrderNotFound {
        /// Order id
        id: i64,
    },

    /// The coupon could not be applied.
    #[error("Coupon '{code}' rejected: {reason}")]
    CouponRejected {
        /// Coupon code as entered
        code: String,
        /// Why the coupon was rejected
        reason: CouponRejection,
    },

    /// A status change that would move a record backwards or out of a terminal state.
    #[error("Cannot move from '{from}' to '{to}'")]
    InvalidStatusTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// The transaction already has a refund recorded against it.
    #[error("Transaction '{id}' has already been refunded")]
    AlreadyRefunded {
        /// Transaction id
        id: String,
    },

    /// No gateway is registered for the payment method.
    #[error("Unsupported payment method: {method}")]
    UnsupportedPaymentMethod {
        /// Payment method as requested
        method: String,
    },

    /// Snapshot read or write failure.
    #[error("Persistence error: {message}")]
    Persistence {
        /// Underlying failure
        message: String,
    },

    /// Settings file could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Underlying failure
        message: String,
    },

    /// Backing store error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV export error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
