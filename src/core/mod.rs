//! Core business logic, independent of how the crate is driven.

/// Fee, final price and profit calculation
pub mod calculator;
/// Coupon validation, discounts and redemption
pub mod coupon;
/// Currency codes and exchange-rate conversion
pub mod currency;
/// Payment gateway trait and adapters
pub mod gateway;
/// Transaction ledger and its persistence
pub mod ledger;
/// Checkout orchestration
pub mod payment;
/// Financial reports, tax and exports
pub mod report;
/// Service catalogue and orders
pub mod service;
/// JSON snapshot of the ledger
pub mod snapshot;
/// Catalogue and order statistics
pub mod stats;
