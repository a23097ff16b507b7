//! Service entity - A resold social-media service with its pricing metadata.
//!
//! `final_price` is derived from `provider_price` and `profit_margin` whenever either
//! changes; orders copy it at creation time and never look back.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Social platform the service is delivered on.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, DeriveActiveEnum, Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Instagram
    #[sea_orm(string_value = "instagram")]
    Instagram,
    /// Facebook
    #[sea_orm(string_value = "facebook")]
    Facebook,
    /// Twitter / X
    #[sea_orm(string_value = "twitter")]
    Twitter,
    /// TikTok
    #[sea_orm(string_value = "tiktok")]
    Tiktok,
    /// YouTube
    #[sea_orm(string_value = "youtube")]
    Youtube,
    /// Telegram
    #[sea_orm(string_value = "telegram")]
    Telegram,
    /// Snapchat
    #[sea_orm(string_value = "snapchat")]
    Snapchat,
    /// LinkedIn
    #[sea_orm(string_value = "linkedin")]
    Linkedin,
    /// Any other platform
    #[sea_orm(string_value = "other")]
    Other,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Twitter => "twitter",
            Self::Tiktok => "tiktok",
            Self::Youtube => "youtube",
            Self::Telegram => "telegram",
            Self::Snapchat => "snapchat",
            Self::Linkedin => "linkedin",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// What the service delivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// Followers
    #[sea_orm(string_value = "followers")]
    Followers,
    /// Likes
    #[sea_orm(string_value = "likes")]
    Likes,
    /// Views
    #[sea_orm(string_value = "views")]
    Views,
    /// Comments
    #[sea_orm(string_value = "comments")]
    Comments,
    /// Shares
    #[sea_orm(string_value = "shares")]
    Shares,
    /// Channel subscribers
    #[sea_orm(string_value = "subscribers")]
    Subscribers,
    /// Anything else
    #[sea_orm(string_value = "other")]
    Other,
}

/// Service database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "services")]
pub struct Model {
    /// Unique identifier for the service
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g. "Instagram Followers - Real")
    pub name: String,
    /// Platform the service targets
    pub platform: Platform,
    /// Kind of engagement delivered
    pub service_type: ServiceType,
    /// Cost per unit charged by the upstream provider
    pub provider_price: f64,
    /// Markup over the provider price, in percent
    pub profit_margin: f64,
    /// `provider_price * (1 + profit_margin / 100)`, rounded to cents
    pub final_price: f64,
    /// Smallest orderable quantity
    pub min_quantity: i64,
    /// Largest orderable quantity
    pub max_quantity: i64,
    /// Inactive services cannot be ordered
    pub is_active: bool,
    /// When the service was created
    pub created_at: DateTimeUtc,
    /// When the service was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Service and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One service has many orders
    #[sea_orm(has_many = "super::service_order::Entity")]
    Orders,
}

impl Related<super::service_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
