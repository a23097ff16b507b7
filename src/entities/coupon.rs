//! Coupon entity - Discount rules redeemable at checkout.
//!
//! Codes are stored upper-case so lookups can be case-insensitive.
//! `current_uses` only ever grows, one step per recorded usage.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How the discount value is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `discount_value` is a percentage of the order amount
    #[sea_orm(string_value = "percentage")]
    Percentage,
    /// `discount_value` is an absolute amount
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// Coupon database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    /// Unique identifier for the coupon
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Upper-case coupon code (e.g. `SAVE20`)
    #[sea_orm(unique)]
    pub code: String,
    /// Percentage or fixed discount
    pub discount_type: DiscountType,
    /// Percentage points or currency units, depending on `discount_type`
    pub discount_value: f64,
    /// Smallest order amount the coupon applies to
    pub min_amount: f64,
    /// Maximum number of redemptions, unlimited when `None`
    pub max_uses: Option<i32>,
    /// Number of successful redemptions so far
    pub current_uses: i32,
    /// Coupon is rejected at or after this instant
    pub expires_at: Option<DateTimeUtc>,
    /// Inactive coupons are always rejected
    pub is_active: bool,
    /// When the coupon was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Coupon and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One coupon has many recorded usages
    #[sea_orm(has_many = "super::coupon_usage::Entity")]
    Usages,
}

impl Related<super::coupon_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Usages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
