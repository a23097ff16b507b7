//! Payment gateways.
//!
//! Every channel a customer can pay through is a [`PaymentGateway`]. The adapters here
//! simulate settlement: they wait a fixed delay and then approve or decline based only on
//! the request, so the same request always gets the same answer.

use crate::{core::currency::Currency, errors::Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tracing::debug;
use uuid::Uuid;

/// Family of payment methods sharing one gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentChannel {
    /// Card processors, PayPal included
    Card,
    /// Egyptian mobile wallets
    Wallet,
    /// Bank transfer, InstaPay and Fawry
    BankTransfer,
}

impl PaymentChannel {
    /// Channel serving a payment method name, `None` for unknown methods.
    #[must_use]
    pub fn for_method(method: &str) -> Option<Self> {
        match method.trim().to_ascii_lowercase().as_str() {
            "credit_card" | "debit_card" | "paypal" => Some(Self::Card),
            "vodafone_cash" | "orange_cash" | "etisalat_cash" | "we_pay" => Some(Self::Wallet),
            "bank_transfer" | "instapay" | "fawry" => Some(Self::BankTransfer),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Card => "card",
            Self::Wallet => "wallet",
            Self::BankTransfer => "bank_transfer",
        };
        f.write_str(name)
    }
}

/// What a gateway is asked to collect.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    /// Ledger transaction the charge settles
    pub transaction_id: Uuid,
    /// Amount to collect, after discounts
    pub amount: f64,
    /// Currency of `amount`
    pub currency: Currency,
    /// Payment method name
    pub method: String,
    /// Wallet mobile number
    pub phone_number: Option<String>,
    /// Bank or Fawry reference supplied by the payer
    pub payer_reference: Option<String>,
}

/// Result of a charge that reached the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChargeOutcome {
    /// Money captured
    Approved {
        /// Identifies the charge at the gateway
        reference: String,
    },
    /// Refused by the gateway
    Declined {
        /// Gateway's explanation
        reason: String,
    },
}

/// A payment channel's gateway.
///
/// `Err` means the gateway could not be reached or answered garbage; a refused payment is
/// `Ok(ChargeOutcome::Declined)`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn channel(&self) -> PaymentChannel;

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome>;
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_ascii_uppercase()
}

fn over_limit(amount: f64, limit: f64, channel: PaymentChannel) -> Option<ChargeOutcome> {
    (amount > limit).then(|| ChargeOutcome::Declined {
        reason: format!("amount {amount:.2} exceeds the {channel} limit of {limit:.2}"),
    })
}

/// Card payments up to a per-transaction limit.
#[derive(Debug, Clone)]
pub struct CardGateway {
    limit: f64,
    delay: Duration,
}

impl CardGateway {
    /// Card gateway declining charges above `limit`, settling after `delay`.
    #[must_use]
    pub const fn new(limit: f64, delay: Duration) -> Self {
        Self { limit, delay }
    }
}

#[async_trait]
impl PaymentGateway for CardGateway {
    fn channel(&self) -> PaymentChannel {
        PaymentChannel::Card
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome> {
        tokio::time::sleep(self.delay).await;
        if let Some(declined) = over_limit(request.amount, self.limit, self.channel()) {
            return Ok(declined);
        }
        debug!(amount = request.amount, "Card charge approved");
        Ok(ChargeOutcome::Approved {
            reference: format!("CARD-{}", short_id(request.transaction_id)),
        })
    }
}

/// Whether `number` is an 11-digit Egyptian mobile number on a wallet-capable prefix.
#[must_use]
pub fn is_egyptian_mobile(number: &str) -> bool {
    number.len() == 11
        && number.bytes().all(|b| b.is_ascii_digit())
        && ["010", "011", "012", "015"]
            .iter()
            .any(|prefix| number.starts_with(prefix))
}

/// Mobile wallet payments (Vodafone Cash and the like).
#[derive(Debug, Clone)]
pub struct WalletGateway {
    limit: f64,
    delay: Duration,
}

impl WalletGateway {
    /// Wallet gateway declining charges above `limit`, settling after `delay`.
    #[must_use]
    pub const fn new(limit: f64, delay: Duration) -> Self {
        Self { limit, delay }
    }
}

#[async_trait]
impl PaymentGateway for WalletGateway {
    fn channel(&self) -> PaymentChannel {
        PaymentChannel::Wallet
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome> {
        tokio::time::sleep(self.delay).await;
        let Some(number) = request
            .phone_number
            .as_deref()
            .map(str::trim)
            .filter(|n| is_egyptian_mobile(n))
        else {
            return Ok(ChargeOutcome::Declined {
                reason: "a valid Egyptian mobile number is required".to_string(),
            });
        };
        if let Some(declined) = over_limit(request.amount, self.limit, self.channel()) {
            return Ok(declined);
        }
        Ok(ChargeOutcome::Approved {
            reference: format!("WAL-{}-{}", &number[7..], short_id(request.transaction_id)),
        })
    }
}

/// Bank transfers, InstaPay and Fawry, confirmed by the payer's reference.
#[derive(Debug, Clone)]
pub struct BankTransferGateway {
    delay: Duration,
}

impl BankTransferGateway {
    /// Bank transfer gateway settling after `delay`.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl PaymentGateway for BankTransferGateway {
    fn channel(&self) -> PaymentChannel {
        PaymentChannel::BankTransfer
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome> {
        tokio::time::sleep(self.delay).await;
        match request
            .payer_reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
        {
            Some(reference) => Ok(ChargeOutcome::Approved {
                reference: format!("BANK-{}", reference.to_ascii_uppercase()),
            }),
            None => Ok(ChargeOutcome::Declined {
                reason: "a payer reference is required for transfers".to_string(),
            }),
        }
    }
}

/// Gateways by channel.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentChannel, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    /// Registers `gateway` for its channel, replacing any earlier one.
    #[must_use]
    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.channel(), gateway);
        self
    }

    /// Gateway for `channel`.
    #[must_use]
    pub fn get(&self, channel: PaymentChannel) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(&channel).map(Arc::clone)
    }
}

impl fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("channels", &self.gateways.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn request(amount: f64, method: &str) -> ChargeRequest {
        ChargeRequest {
            transaction_id: Uuid::new_v4(),
            amount,
            currency: Currency::Egp,
            method: method.to_string(),
            phone_number: None,
            payer_reference: None,
        }
    }

    #[test]
    fn test_channel_for_method() {
        assert_eq!(PaymentChannel::for_method("Credit_Card"), Some(PaymentChannel::Card));
        assert_eq!(PaymentChannel::for_method("vodafone_cash"), Some(PaymentChannel::Wallet));
        assert_eq!(PaymentChannel::for_method("instapay"), Some(PaymentChannel::BankTransfer));
        assert_eq!(PaymentChannel::for_method("crypto"), None);
    }

    #[test]
    fn test_egyptian_mobile_numbers() {
        assert!(is_egyptian_mobile("01012345678"));
        assert!(is_egyptian_mobile("01598765432"));
        assert!(!is_egyptian_mobile("01312345678"));
        assert!(!is_egyptian_mobile("0101234567"));
        assert!(!is_egyptian_mobile("0101234567a"));
        assert!(!is_egyptian_mobile("+201012345678"));
    }

    #[tokio::test]
    async fn test_card_gateway_limit() {
        let gateway = CardGateway::new(1_000.0, Duration::ZERO);

        let approved = gateway.charge(&request(999.99, "credit_card")).await.unwrap();
        assert!(matches!(approved, ChargeOutcome::Approved { reference } if reference.starts_with("CARD-")));

        let declined = gateway.charge(&request(1_000.01, "credit_card")).await.unwrap();
        assert!(matches!(declined, ChargeOutcome::Declined { .. }));
    }

    #[tokio::test]
    async fn test_wallet_gateway_requires_valid_number() {
        let gateway = WalletGateway::new(500.0, Duration::ZERO);
        let mut req = request(100.0, "vodafone_cash");

        let declined = gateway.charge(&req).await.unwrap();
        assert!(matches!(declined, ChargeOutcome::Declined { .. }));

        req.phone_number = Some("01012345678".to_string());
        let approved = gateway.charge(&req).await.unwrap();
        assert!(matches!(approved, ChargeOutcome::Approved { reference } if reference.starts_with("WAL-5678-")));

        req.amount = 501.0;
        assert!(matches!(
            gateway.charge(&req).await.unwrap(),
            ChargeOutcome::Declined { .. }
        ));
    }

    #[tokio::test]
    async fn test_bank_transfer_requires_reference() {
        let gateway = BankTransferGateway::new(Duration::ZERO);
        let mut req = request(2_500.0, "bank_transfer");
        assert!(matches!(
            gateway.charge(&req).await.unwrap(),
            ChargeOutcome::Declined { .. }
        ));

        req.payer_reference = Some("nbe-7781".to_string());
        assert_eq!(
            gateway.charge(&req).await.unwrap(),
            ChargeOutcome::Approved {
                reference: "BANK-NBE-7781".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_settlement_delay_is_awaited() {
        let gateway = CardGateway::new(100.0, Duration::from_millis(20));
        let started = std::time::Instant::now();
        gateway.charge(&request(10.0, "credit_card")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = GatewayRegistry::default()
            .with(Arc::new(CardGateway::new(100.0, Duration::ZERO)))
            .with(Arc::new(BankTransferGateway::new(Duration::ZERO)));
        assert!(registry.get(PaymentChannel::Card).is_some());
        assert!(registry.get(PaymentChannel::Wallet).is_none());
    }
}
