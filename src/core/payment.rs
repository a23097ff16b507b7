//! Checkout orchestration.
//!
//! [`PaymentService`] ties the pieces together: it validates the coupon, computes the
//! fee, records a pending income transaction, charges the gateway for the payment
//! method's channel and settles the transaction. Every checkout carries an idempotency
//! key; repeating a key returns the first attempt's receipt without charging again.

use crate::{
    core::{
        calculator::{FeeSchedule, round_currency},
        coupon::{self, CouponRejection},
        currency::Currency,
        gateway::{ChargeOutcome, ChargeRequest, GatewayRegistry, PaymentChannel},
        ledger::{Ledger, NewTransaction, StatusUpdate, Transaction},
    },
    entities::transaction::{TransactionKind, TransactionStatus},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// A customer payment for an order.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    /// Token identifying this checkout attempt
    pub idempotency_key: String,
    /// Paying customer
    pub user_id: String,
    /// Order being paid for
    pub order_id: Option<String>,
    /// Amount before discounts
    pub amount: f64,
    /// Currency of `amount`
    pub currency: Currency,
    /// Payment method name, e.g. `credit_card` or `vodafone_cash`
    pub payment_method: String,
    /// Category tag for reports
    pub category: String,
    /// Description recorded on the transaction
    pub description: String,
    /// Coupon to apply, matched case-insensitively
    pub coupon_code: Option<String>,
    /// Required by wallet payments
    pub phone_number: Option<String>,
    /// Required by bank transfers
    pub payer_reference: Option<String>,
}

/// What a checkout produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutReceipt {
    /// The income transaction, `completed` or `failed`
    pub transaction: Transaction,
    /// Discount granted by the coupon, 0 without one
    pub discount_amount: f64,
    /// Gateway's reason when the payment was declined
    pub decline_reason: Option<String>,
    /// True when this receipt is a replay of an earlier attempt with the same key
    pub replayed: bool,
}

impl CheckoutReceipt {
    /// Whether the payment went through.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.transaction.status == TransactionStatus::Completed
    }
}

/// Payment entry point over the ledger, the coupon store and the gateways.
#[derive(Debug)]
pub struct PaymentService {
    ledger: Ledger,
    db: DatabaseConnection,
    fees: FeeSchedule,
    gateways: GatewayRegistry,
}

impl PaymentService {
    /// Service over an opened ledger, the database holding coupons, and the gateways.
    #[must_use]
    pub const fn new(
        ledger: Ledger,
        db: DatabaseConnection,
        fees: FeeSchedule,
        gateways: GatewayRegistry,
    ) -> Self {
        Self {
            ledger,
            db,
            fees,
            gateways,
        }
    }

    /// The underlying ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Takes a payment.
    ///
    /// A declined payment is not an error: the receipt carries a `failed` transaction and
    /// the gateway's reason. Nothing is written when the amount, coupon or payment method
    /// is rejected.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The amount is not positive and finite (`InvalidArgument`)
    /// - The coupon does not apply (`CouponRejected`)
    /// - No gateway serves the payment method (`UnsupportedPaymentMethod`)
    /// - The gateway fails outright; the transaction is then marked `failed`
    /// - A database operation fails
    #[instrument(skip(self, request), fields(key = %request.idempotency_key, method = %request.payment_method))]
    pub async fn checkout(&mut self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(Error::InvalidArgument {
                name: "amount",
                value: request.amount,
            });
        }

        if let Some(earlier) = self.ledger.find_by_idempotency_key(&request.idempotency_key) {
            let transaction = earlier.clone();
            info!(id = %transaction.id, "Replaying earlier checkout");
            return self.replay(transaction).await;
        }

        let now = Utc::now();
        let (discount_amount, charged_amount, coupon_id) = match &request.coupon_code {
            Some(code) => {
                let validation = coupon::validate(&self.db, code, request.amount, now).await?;
                if !validation.valid {
                    return Err(Error::CouponRejected {
                        code: code.clone(),
                        reason: validation.reason.unwrap_or(CouponRejection::NotFound),
                    });
                }
                (
                    validation.discount_amount,
                    validation.final_amount,
                    validation.coupon_id,
                )
            }
            None => (0.0, request.amount, None),
        };

        let gateway = PaymentChannel::for_method(&request.payment_method)
            .and_then(|channel| self.gateways.get(channel))
            .ok_or_else(|| Error::UnsupportedPaymentMethod {
                method: request.payment_method.clone(),
            })?;

        let fees = self.fees.fees_for(charged_amount, &request.payment_method)?;
        let exchange_rate = self.ledger.rates().rate(request.currency);

        let mut pending = NewTransaction::new(TransactionKind::Income, charged_amount, request.currency)
            .description(request.description.clone())
            .category(request.category.clone())
            .payment_method(request.payment_method.clone())
            .user(request.user_id.clone())
            .fees(fees)
            .exchange_rate(exchange_rate)
            .idempotency_key(request.idempotency_key.clone());
        pending.order_id.clone_from(&request.order_id);
        let pending = self.ledger.append(pending).await?;

        let charge = ChargeRequest {
            transaction_id: pending.id,
            amount: charged_amount,
            currency: request.currency,
            method: request.payment_method.clone(),
            phone_number: request.phone_number.clone(),
            payer_reference: request.payer_reference.clone(),
        };

        let outcome = match gateway.charge(&charge).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(id = %pending.id, "Gateway failed: {e}");
                self.ledger
                    .update_status(
                        pending.id,
                        TransactionStatus::Failed,
                        StatusUpdate {
                            failure_reason: Some(e.to_string()),
                            ..Default::default()
                        },
                    )
                    .await?;
                return Err(e);
            }
        };

        match outcome {
            ChargeOutcome::Approved { reference } => {
                let transaction = self
                    .ledger
                    .update_status(
                        pending.id,
                        TransactionStatus::Completed,
                        StatusUpdate {
                            gateway_reference: Some(reference),
                            ..Default::default()
                        },
                    )
                    .await?;

                if let Some(coupon_id) = coupon_id
                    && let Err(e) = coupon::redeem(
                        &self.db,
                        coupon_id,
                        &request.user_id,
                        &transaction.id.to_string(),
                        discount_amount,
                    )
                    .await
                {
                    error!(id = %transaction.id, "Payment captured but coupon redemption failed: {e}");
                }

                info!(id = %transaction.id, amount = charged_amount, fees, "Checkout completed");
                Ok(CheckoutReceipt {
                    transaction,
                    discount_amount,
                    decline_reason: None,
                    replayed: false,
                })
            }
            ChargeOutcome::Declined { reason } => {
                warn!(id = %pending.id, "Payment declined: {reason}");
                let transaction = self
                    .ledger
                    .update_status(
                        pending.id,
                        TransactionStatus::Failed,
                        StatusUpdate {
                            failure_reason: Some(reason.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(CheckoutReceipt {
                    transaction,
                    discount_amount: 0.0,
                    decline_reason: Some(reason),
                    replayed: false,
                })
            }
        }
    }

    async fn replay(&self, transaction: Transaction) -> Result<CheckoutReceipt> {
        let discount_amount = coupon::usage_for_transaction(&self.db, &transaction.id.to_string())
            .await?
            .map_or(0.0, |usage| usage.discount_amount);
        let decline_reason = (transaction.status == TransactionStatus::Failed)
            .then(|| transaction.failure_reason.clone())
            .flatten();
        Ok(CheckoutReceipt {
            transaction,
            discount_amount,
            decline_reason,
            replayed: true,
        })
    }

    /// Records money paid out, e.g. to the upstream provider.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a negative or non-finite amount.
    pub async fn record_expense(
        &mut self,
        amount: f64,
        currency: Currency,
        category: &str,
        description: &str,
        payment_method: &str,
    ) -> Result<Transaction> {
        let expense = NewTransaction::new(TransactionKind::Expense, round_currency(amount), currency)
            .category(category)
            .description(description)
            .payment_method(payment_method)
            .exchange_rate(self.ledger.rates().rate(currency))
            .status(TransactionStatus::Completed);
        self.ledger.append(expense).await
    }

    /// Records a commission earned by a user, e.g. a referral payout.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a negative or non-finite amount.
    pub async fn record_commission(
        &mut self,
        amount: f64,
        currency: Currency,
        user_id: &str,
        description: &str,
    ) -> Result<Transaction> {
        let commission =
            NewTransaction::new(TransactionKind::Commission, round_currency(amount), currency)
                .category("commission")
                .description(description)
                .user(user_id)
                .exchange_rate(self.ledger.rates().rate(currency))
                .status(TransactionStatus::Completed);
        self.ledger.append(commission).await
    }

    /// Refunds a completed payment in full.
    ///
    /// # Errors
    /// See [`Ledger::refund`].
    pub async fn refund(&mut self, transaction_id: Uuid, reason: &str) -> Result<Transaction> {
        let refund = self.ledger.refund(transaction_id, reason).await?;
        info!(id = %refund.id, of = %transaction_id, "Recorded refund");
        Ok(refund)
    }
}
