//! Entity module - Contains all SeaORM entity definitions for the backing store.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod coupon;
pub mod coupon_usage;
pub mod service;
pub mod service_order;
pub mod transaction;

// Re-export specific types to avoid conflicts
pub use coupon::{Column as CouponColumn, Entity as Coupon, Model as CouponModel};
pub use coupon_usage::{
    Column as CouponUsageColumn, Entity as CouponUsage, Model as CouponUsageModel,
};
pub use service::{Column as ServiceColumn, Entity as Service, Model as ServiceModel};
pub use service_order::{
    Column as ServiceOrderColumn, Entity as ServiceOrder, Model as ServiceOrderModel,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
};
