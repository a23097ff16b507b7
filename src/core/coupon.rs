//! Coupon business logic - validation, discount computation and redemption.
//!
//! Validation is a pure function of the coupon row, the order amount and the current
//! instant: a rejected coupon is reported as data in [`CouponValidation`], never as an
//! error. Redemption increments the use counter and records a usage row inside one
//! database transaction, keyed by the consuming ledger transaction so a retried
//! checkout cannot redeem twice.

use crate::{
    core::calculator::round_currency,
    entities::{
        Coupon, CouponUsage,
        coupon::{self, DiscountType},
        coupon_usage,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, instrument};

/// Why a coupon was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CouponRejection {
    /// No coupon has this code
    NotFound,
    /// The coupon was deactivated
    Inactive,
    /// The expiry instant has passed
    Expired,
    /// `current_uses` reached `max_uses`
    UsageExhausted,
    /// The order amount is below the coupon's minimum
    BelowMinimum,
}

impl CouponRejection {
    /// Short machine-readable code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::UsageExhausted => "usage-exhausted",
            Self::BelowMinimum => "below-minimum",
        }
    }
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::NotFound => "coupon not found",
            Self::Inactive => "coupon is inactive",
            Self::Expired => "coupon has expired",
            Self::UsageExhausted => "usage-exhausted",
            Self::BelowMinimum => "below minimum amount",
        };
        f.write_str(message)
    }
}

/// Outcome of validating a coupon against an order amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponValidation {
    /// Whether the coupon applies
    pub valid: bool,
    /// Discount granted, `0.0` when rejected
    pub discount_amount: f64,
    /// Amount left to pay, equal to the input amount when rejected
    pub final_amount: f64,
    /// Rejection reason when `valid` is false
    pub reason: Option<CouponRejection>,
    /// Coupon id when the code matched a coupon
    pub coupon_id: Option<i64>,
}

impl CouponValidation {
    const fn rejected(coupon_id: Option<i64>, amount: f64, reason: CouponRejection) -> Self {
        Self {
            valid: false,
            discount_amount: 0.0,
            final_amount: amount,
            reason: Some(reason),
            coupon_id,
        }
    }
}

/// Input for creating a coupon.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCoupon {
    /// Code customers type in, case-insensitive
    pub code: String,
    /// Percentage or fixed
    pub discount_type: DiscountType,
    /// Percentage points or currency units
    pub discount_value: f64,
    /// Smallest order amount accepted
    #[serde(default)]
    pub min_amount: f64,
    /// Redemption limit, unlimited when absent
    #[serde(default)]
    pub max_uses: Option<i32>,
    /// Expiry instant, never expires when absent
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Discount `coupon` grants on `amount`, never more than `amount` itself.
#[must_use]
pub fn discount_for(coupon: &coupon::Model, amount: f64) -> f64 {
    let raw = match coupon.discount_type {
        DiscountType::Percentage => amount * coupon.discount_value / 100.0,
        DiscountType::Fixed => coupon.discount_value,
    };
    round_currency(raw.min(amount))
}

/// Validates `coupon` for an order of `amount` at instant `now`.
///
/// Checks run in order and stop at the first failure: the coupon exists and is
/// active, it has not expired, it has uses left, and the amount meets the minimum.
///
/// # Errors
/// Returns `InvalidArgument` if `amount` is negative or not finite.
pub fn evaluate(
    coupon: Option<&coupon::Model>,
    amount: f64,
    now: DateTime<Utc>,
) -> Result<CouponValidation> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(Error::InvalidArgument {
            name: "amount",
            value: amount,
        });
    }

    let Some(coupon) = coupon else {
        return Ok(CouponValidation::rejected(
            None,
            amount,
            CouponRejection::NotFound,
        ));
    };
    let reject = |reason| Ok(CouponValidation::rejected(Some(coupon.id), amount, reason));

    if !coupon.is_active {
        return reject(CouponRejection::Inactive);
    }
    if let Some(expires_at) = coupon.expires_at
        && expires_at <= now
    {
        return reject(CouponRejection::Expired);
    }
    if let Some(max_uses) = coupon.max_uses
        && coupon.current_uses >= max_uses
    {
        return reject(CouponRejection::UsageExhausted);
    }
    if amount < coupon.min_amount {
        return reject(CouponRejection::BelowMinimum);
    }

    let discount_amount = discount_for(coupon, amount);
    Ok(CouponValidation {
        valid: true,
        discount_amount,
        final_amount: round_currency(amount - discount_amount),
        reason: None,
        coupon_id: Some(coupon.id),
    })
}

/// Finds a coupon by code, ignoring case and surrounding whitespace.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn get_coupon_by_code<C>(db: &C, code: &str) -> Result<Option<coupon::Model>>
where
    C: ConnectionTrait,
{
    Coupon::find()
        .filter(coupon::Column::Code.eq(normalize_code(code)))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Looks up `code` and validates it for an order of `amount` at `now`.
///
/// # Errors
/// Returns `InvalidArgument` for a bad amount, or an error if the query fails.
/// A rejected coupon is not an error.
pub async fn validate(
    db: &DatabaseConnection,
    code: &str,
    amount: f64,
    now: DateTime<Utc>,
) -> Result<CouponValidation> {
    let coupon = get_coupon_by_code(db, code).await?;
    let validation = evaluate(coupon.as_ref(), amount, now)?;
    debug!(
        code,
        amount,
        valid = validation.valid,
        reason = ?validation.reason,
        "Validated coupon"
    );
    Ok(validation)
}

/// Creates a coupon after validating its rule.
///
/// # Errors
/// Returns an error if:
/// - The code is empty or contains characters other than letters, digits, `-` and `_`
/// - The discount value is not positive, or a percentage exceeds 100
/// - The minimum amount is negative or `max_uses` is below 1
/// - A coupon with the same code already exists
/// - The database insert fails
pub async fn create_coupon(db: &DatabaseConnection, new: NewCoupon) -> Result<coupon::Model> {
    let code = normalize_code(&new.code);
    if code.is_empty()
        || !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidInput {
            message: format!("Invalid coupon code '{}'", new.code),
        });
    }
    if !new.discount_value.is_finite() || new.discount_value <= 0.0 {
        return Err(Error::InvalidArgument {
            name: "discount value",
            value: new.discount_value,
        });
    }
    if new.discount_type == DiscountType::Percentage && new.discount_value > 100.0 {
        return Err(Error::InvalidArgument {
            name: "discount percentage",
            value: new.discount_value,
        });
    }
    if !new.min_amount.is_finite() || new.min_amount < 0.0 {
        return Err(Error::InvalidArgument {
            name: "minimum amount",
            value: new.min_amount,
        });
    }
    if let Some(max_uses) = new.max_uses
        && max_uses < 1
    {
        return Err(Error::InvalidArgument {
            name: "max uses",
            value: f64::from(max_uses),
        });
    }
    if get_coupon_by_code(db, &code).await?.is_some() {
        return Err(Error::InvalidInput {
            message: format!("Coupon '{code}' already exists"),
        });
    }

    let coupon = coupon::ActiveModel {
        code: Set(code),
        discount_type: Set(new.discount_type),
        discount_value: Set(new.discount_value),
        min_amount: Set(new.min_amount),
        max_uses: Set(new.max_uses),
        current_uses: Set(0),
        expires_at: Set(new.expires_at),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let created = coupon.insert(db).await?;
    info!(code = %created.code, "Created coupon");
    Ok(created)
}

/// Creates every coupon in `coupons` whose code does not exist yet.
///
/// # Errors
/// Returns an error if a coupon is invalid or a database operation fails.
pub async fn seed_coupons(db: &DatabaseConnection, coupons: &[NewCoupon]) -> Result<usize> {
    let mut created = 0;
    for new in coupons {
        if get_coupon_by_code(db, &new.code).await?.is_some() {
            debug!(code = %new.code, "Coupon already present, skipping seed");
            continue;
        }
        create_coupon(db, new.clone()).await?;
        created += 1;
    }
    Ok(created)
}

/// Marks a coupon inactive. Further validations reject it.
///
/// # Errors
/// Returns `CouponNotFound` if no coupon has this id, or a database error.
pub async fn deactivate_coupon(db: &DatabaseConnection, coupon_id: i64) -> Result<coupon::Model> {
    let mut coupon: coupon::ActiveModel = Coupon::find_by_id(coupon_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::CouponNotFound {
            code: coupon_id.to_string(),
        })?
        .into();
    coupon.is_active = Set(false);
    coupon.update(db).await.map_err(Into::into)
}

/// Records a redemption of `coupon_id` by `transaction_id` and increments the use count.
///
/// Calling this again with the same `transaction_id` returns the usage recorded the
/// first time and leaves the counter alone.
///
/// # Errors
/// Returns an error if:
/// - The discount is negative or not finite
/// - The coupon does not exist (`CouponNotFound`)
/// - The coupon has no uses left (`CouponRejected` with `usage-exhausted`)
/// - A database operation fails
#[instrument(skip(db))]
pub async fn redeem(
    db: &DatabaseConnection,
    coupon_id: i64,
    user_id: &str,
    transaction_id: &str,
    discount_amount: f64,
) -> Result<coupon_usage::Model> {
    if !discount_amount.is_finite() || discount_amount < 0.0 {
        return Err(Error::InvalidArgument {
            name: "discount amount",
            value: discount_amount,
        });
    }

    let txn = db.begin().await?;

    if let Some(existing) = CouponUsage::find()
        .filter(coupon_usage::Column::TransactionId.eq(transaction_id))
        .one(&txn)
        .await?
    {
        txn.commit().await?;
        debug!("Transaction already redeemed this coupon");
        return Ok(existing);
    }

    let coupon = Coupon::find_by_id(coupon_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::CouponNotFound {
            code: coupon_id.to_string(),
        })?;

    if let Some(max_uses) = coupon.max_uses
        && coupon.current_uses >= max_uses
    {
        return Err(Error::CouponRejected {
            code: coupon.code,
            reason: CouponRejection::UsageExhausted,
        });
    }

    Coupon::update_many()
        .col_expr(
            coupon::Column::CurrentUses,
            Expr::col(coupon::Column::CurrentUses).add(1),
        )
        .filter(coupon::Column::Id.eq(coupon_id))
        .exec(&txn)
        .await?;

    let usage = coupon_usage::ActiveModel {
        coupon_id: Set(coupon_id),
        user_id: Set(user_id.to_string()),
        transaction_id: Set(transaction_id.to_string()),
        discount_amount: Set(discount_amount),
        used_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(code = %coupon.code, "Redeemed coupon");
    Ok(usage)
}

/// Usage recorded for a ledger transaction, if it redeemed a coupon.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn usage_for_transaction(
    db: &DatabaseConnection,
    transaction_id: &str,
) -> Result<Option<coupon_usage::Model>> {
    CouponUsage::find()
        .filter(coupon_usage::Column::TransactionId.eq(transaction_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists the recorded usages of a coupon, oldest first.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn list_usages(
    db: &DatabaseConnection,
    coupon_id: i64,
) -> Result<Vec<coupon_usage::Model>> {
    CouponUsage::find()
        .filter(coupon_usage::Column::CouponId.eq(coupon_id))
        .order_by_asc(coupon_usage::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
