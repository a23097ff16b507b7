//! Fee and price calculation.
//!
//! Pure numeric functions used before anything is written to the ledger: processing
//! fees per payment method, resale price from a provider price and a margin, and the
//! profit an order yields. Every result is rounded to cents.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rate applied to payment methods missing from the fee table.
pub const DEFAULT_FEE_RATE: f64 = 0.025;

/// Rounds a currency value to two decimal places.
#[must_use]
pub fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn ensure_non_negative(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidArgument { name, value });
    }
    Ok(())
}

/// Computes the processing fee for `amount` at `rate` (a fraction, `0.029` for 2.9%).
///
/// # Errors
/// Returns `InvalidArgument` if either input is negative or not finite.
pub fn calculate_fees(amount: f64, rate: f64) -> Result<f64> {
    ensure_non_negative("amount", amount)?;
    ensure_non_negative("fee rate", rate)?;
    Ok(round_currency(amount * rate))
}

/// Resale price of one unit: `provider_price * (1 + margin / 100)`.
///
/// # Errors
/// Returns `InvalidArgument` if the price or margin is negative or not finite.
pub fn calculate_final_price(provider_price: f64, profit_margin: f64) -> Result<f64> {
    ensure_non_negative("provider price", provider_price)?;
    ensure_non_negative("profit margin", profit_margin)?;
    Ok(round_currency(provider_price * (1.0 + profit_margin / 100.0)))
}

/// Profit of an order of `quantity` units: `(final_price - provider_price) * quantity`.
///
/// # Errors
/// Returns `InvalidArgument` if the price, margin or quantity is negative.
pub fn calculate_profit(provider_price: f64, quantity: i64, profit_margin: f64) -> Result<f64> {
    if quantity < 0 {
        #[allow(clippy::cast_precision_loss)]
        return Err(Error::InvalidArgument {
            name: "quantity",
            value: quantity as f64,
        });
    }
    let final_price = calculate_final_price(provider_price, profit_margin)?;
    #[allow(clippy::cast_precision_loss)]
    let profit = (final_price - provider_price) * quantity as f64;
    Ok(round_currency(profit))
}

/// Per-payment-method fee rates.
///
/// Method names are matched case-insensitively; anything not in the table pays
/// [`DEFAULT_FEE_RATE`] unless the schedule was built with another default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    rates: BTreeMap<String, f64>,
    default_rate: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        let rates = [
            ("credit_card", 0.029),
            ("debit_card", 0.029),
            ("bank_transfer", 0.01),
            ("vodafone_cash", 0.015),
            ("orange_cash", 0.015),
            ("etisalat_cash", 0.015),
            ("we_pay", 0.015),
            ("instapay", 0.005),
            ("fawry", 0.02),
            ("paypal", 0.034),
        ]
        .into_iter()
        .map(|(method, rate)| (method.to_string(), rate))
        .collect();

        Self {
            rates,
            default_rate: DEFAULT_FEE_RATE,
        }
    }
}

impl FeeSchedule {
    /// Builds a schedule from explicit rates.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if any rate is negative or not finite.
    pub fn new(rates: BTreeMap<String, f64>, default_rate: f64) -> Result<Self> {
        ensure_non_negative("default fee rate", default_rate)?;
        let mut normalized = BTreeMap::new();
        for (method, rate) in rates {
            ensure_non_negative("fee rate", rate)?;
            normalized.insert(method.trim().to_ascii_lowercase(), rate);
        }
        Ok(Self {
            rates: normalized,
            default_rate,
        })
    }

    /// Returns a copy of this schedule with `overrides` applied on top.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if any override is negative or not finite.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, f64>) -> Result<Self> {
        let mut rates = self.rates.clone();
        for (method, rate) in overrides {
            ensure_non_negative("fee rate", *rate)?;
            rates.insert(method.trim().to_ascii_lowercase(), *rate);
        }
        Ok(Self {
            rates,
            default_rate: self.default_rate,
        })
    }

    /// Returns a copy of this schedule charging `default_rate` for unknown methods.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the rate is negative or not finite.
    pub fn with_default_rate(&self, default_rate: f64) -> Result<Self> {
        ensure_non_negative("default fee rate", default_rate)?;
        Ok(Self {
            rates: self.rates.clone(),
            default_rate,
        })
    }

    /// Rate for `method`, falling back to the default rate.
    #[must_use]
    pub fn rate_for(&self, method: &str) -> f64 {
        self.rates
            .get(&method.trim().to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_rate)
    }

    /// Fee charged for `amount` paid with `method`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `amount` is negative or not finite.
    pub fn fees_for(&self, amount: f64, method: &str) -> Result<f64> {
        calculate_fees(amount, self.rate_for(method))
    }

    /// Rate used for unknown methods.
    #[must_use]
    pub const fn default_rate(&self) -> f64 {
        self.default_rate
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_credit_card_fee_on_100() {
        let schedule = FeeSchedule::default();
        let fee = schedule.fees_for(100.0, "credit_card").unwrap();
        assert_eq!(fee, 2.9);
        assert_eq!(round_currency(100.0 - fee), 97.1);
    }

    #[test]
    fn test_unknown_method_uses_default_rate() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.rate_for("carrier_pigeon"), DEFAULT_FEE_RATE);
        assert_eq!(schedule.fees_for(200.0, "carrier_pigeon").unwrap(), 5.0);
    }

    #[test]
    fn test_method_lookup_is_case_insensitive() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.rate_for("Bank_Transfer"), 0.01);
        assert_eq!(schedule.rate_for(" VODAFONE_CASH "), 0.015);
    }

    #[test]
    fn test_calculate_fees_matches_product() {
        for (amount, rate) in [(0.0, 0.029), (10.0, 0.0), (250.0, 0.01), (99.99, 0.025)] {
            let fee = calculate_fees(amount, rate).unwrap();
            assert!((fee - amount * rate).abs() <= 0.005);
        }
    }

    #[test]
    fn test_calculate_fees_is_monotonic() {
        let mut last = 0.0;
        for step in 0..50 {
            let fee = calculate_fees(f64::from(step) * 7.5, 0.029).unwrap();
            assert!(fee >= last);
            last = fee;
        }

        let mut last = 0.0;
        for step in 0..50 {
            let fee = calculate_fees(100.0, f64::from(step) / 1000.0).unwrap();
            assert!(fee >= last);
            last = fee;
        }
    }

    #[test]
    fn test_calculate_fees_rejects_negative_and_nan() {
        assert!(matches!(
            calculate_fees(-1.0, 0.029),
            Err(Error::InvalidArgument { name: "amount", .. })
        ));
        assert!(matches!(
            calculate_fees(f64::NAN, 0.029),
            Err(Error::InvalidArgument { name: "amount", .. })
        ));
        assert!(matches!(
            calculate_fees(10.0, -0.01),
            Err(Error::InvalidArgument { name: "fee rate", .. })
        ));
    }

    #[test]
    fn test_final_price_and_profit_scenario() {
        assert_eq!(calculate_final_price(10.0, 30.0).unwrap(), 13.0);
        assert_eq!(calculate_profit(10.0, 5, 30.0).unwrap(), 15.0);
    }

    #[test]
    fn test_final_price_zero_margin_is_provider_price() {
        assert_eq!(calculate_final_price(12.34, 0.0).unwrap(), 12.34);
        assert_eq!(calculate_profit(12.34, 1000, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_final_price_is_monotonic_in_margin() {
        let mut last = 0.0;
        for margin in 0..200 {
            let price = calculate_final_price(3.75, f64::from(margin)).unwrap();
            assert!(price >= last);
            last = price;
        }
    }

    #[test]
    fn test_profit_matches_final_price_difference() {
        let (price, quantity, margin) = (2.5, 40, 35.0);
        let expected =
            round_currency((calculate_final_price(price, margin).unwrap() - price) * 40.0);
        assert_eq!(calculate_profit(price, quantity, margin).unwrap(), expected);
    }

    #[test]
    fn test_profit_rejects_negative_quantity() {
        assert!(matches!(
            calculate_profit(10.0, -1, 30.0),
            Err(Error::InvalidArgument { name: "quantity", .. })
        ));
        assert!(matches!(
            calculate_final_price(10.0, -5.0),
            Err(Error::InvalidArgument {
                name: "profit margin",
                ..
            })
        ));
    }

    #[test]
    fn test_schedule_overrides() {
        let overrides = BTreeMap::from([("Credit_Card".to_string(), 0.035)]);
        let schedule = FeeSchedule::default().with_overrides(&overrides).unwrap();
        assert_eq!(schedule.rate_for("credit_card"), 0.035);
        assert_eq!(schedule.rate_for("bank_transfer"), 0.01);

        let bad = BTreeMap::from([("paypal".to_string(), -0.1)]);
        assert!(FeeSchedule::default().with_overrides(&bad).is_err());

        let custom =
            FeeSchedule::new(BTreeMap::from([(" Fawry ".to_string(), 0.01)]), 0.02).unwrap();
        assert_eq!(custom.rate_for("fawry"), 0.01);
        assert_eq!(custom.rate_for("credit_card"), 0.02);
        assert_eq!(custom.default_rate(), 0.02);

        let flat = FeeSchedule::default().with_default_rate(0.04).unwrap();
        assert_eq!(flat.rate_for("unknown"), 0.04);
        assert_eq!(flat.rate_for("instapay"), 0.005);
        assert!(FeeSchedule::default().with_default_rate(f64::INFINITY).is_err());
    }
}
