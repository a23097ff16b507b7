//! Transaction entity - Stores ledger rows when the ledger runs in database mode.
//!
//! The row id gives the insertion order; `transaction_id` is the ledger's own UUID.
//! Kind and status are stored as lowercase strings through `DeriveActiveEnum`.

use crate::core::currency::Currency;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of financial movement.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money received from a customer
    #[sea_orm(string_value = "income")]
    Income,
    /// Money paid out (provider costs, ads, salaries)
    #[sea_orm(string_value = "expense")]
    Expense,
    /// Reversal of an earlier income
    #[sea_orm(string_value = "refund")]
    Refund,
    /// Commission paid to or earned from a reseller
    #[sea_orm(string_value = "commission")]
    Commission,
}

impl TransactionKind {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Refund => "refund",
            Self::Commission => "commission",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a transaction.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Created, waiting for the gateway
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Settled
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Declined or errored
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Abandoned before settlement
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl TransactionStatus {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Only `pending` may move, and only forward into one of the terminal states.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::Completed | Self::Failed | Self::Cancelled
            )
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Row id, preserves insertion order
    #[sea_orm(primary_key)]
    pub row_id: i64,
    /// Ledger transaction id (UUID string)
    #[sea_orm(unique)]
    pub transaction_id: String,
    /// income / expense / refund / commission
    pub kind: TransactionKind,
    /// Gross amount in currency units
    pub amount: f64,
    /// Currency code
    pub currency: Currency,
    /// Human-readable description
    pub description: String,
    /// Free-text category tag
    pub category: String,
    /// Order this transaction pays for, if any
    pub order_id: Option<String>,
    /// Customer the transaction belongs to, if any
    pub user_id: Option<String>,
    /// Payment method name (e.g. `credit_card`, `vodafone_cash`)
    pub payment_method: String,
    /// Processing status
    pub status: TransactionStatus,
    /// When the transaction was created
    pub created_at: DateTimeUtc,
    /// When the transaction reached `completed`
    pub processed_at: Option<DateTimeUtc>,
    /// Processing fees
    pub fees: f64,
    /// Amount minus fees
    pub net_amount: f64,
    /// Exchange rate to the base currency at creation
    pub exchange_rate: Option<f64>,
    /// Transaction reversed by this refund
    pub refund_of: Option<String>,
    /// Checkout attempt token
    pub idempotency_key: Option<String>,
    /// Reference returned by the payment gateway
    pub gateway_reference: Option<String>,
    /// Why the gateway declined or failed the payment
    pub failure_reason: Option<String>,
}

/// Transactions have no relationships with other tables
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
