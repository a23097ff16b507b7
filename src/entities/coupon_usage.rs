//! Coupon usage entity - One row per successful redemption.
//!
//! `transaction_id` is unique, which makes redeeming the same checkout twice a no-op.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Coupon usage database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupon_usages")]
pub struct Model {
    /// Unique identifier for the usage
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Coupon that was redeemed
    pub coupon_id: i64,
    /// Customer who redeemed it
    pub user_id: String,
    /// Ledger transaction that consumed the coupon
    #[sea_orm(unique)]
    pub transaction_id: String,
    /// Discount granted by this redemption
    pub discount_amount: f64,
    /// When the redemption happened
    pub used_at: DateTimeUtc,
}

/// Defines relationships between `CouponUsage` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each usage belongs to one coupon
    #[sea_orm(
        belongs_to = "super::coupon::Entity",
        from = "Column::CouponId",
        to = "super::coupon::Column::Id"
    )]
    Coupon,
}

impl Related<super::coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Coupon.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
