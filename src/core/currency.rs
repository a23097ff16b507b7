//! Currency codes and conversion through a static exchange-rate table.
//!
//! Rates are expressed relative to the base currency (USD = 1). A currency missing
//! from the table converts as if it were the base currency; that is an approximation
//! and is logged every time it happens.

use crate::errors::{Error, Result};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use tracing::warn;

/// Currencies accepted by the platform.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(3))")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Egyptian pound
    #[default]
    #[sea_orm(string_value = "EGP")]
    Egp,
    /// US dollar, the base currency
    #[sea_orm(string_value = "USD")]
    Usd,
    /// Euro
    #[sea_orm(string_value = "EUR")]
    Eur,
    /// Pound sterling
    #[sea_orm(string_value = "GBP")]
    Gbp,
    /// Saudi riyal
    #[sea_orm(string_value = "SAR")]
    Sar,
    /// UAE dirham
    #[sea_orm(string_value = "AED")]
    Aed,
}

impl Currency {
    /// Canonical three-letter code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Egp => "EGP",
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Sar => "SAR",
            Self::Aed => "AED",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<&str> for Currency {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "EGP" => Ok(Self::Egp),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "SAR" => Ok(Self::Sar),
            "AED" => Ok(Self::Aed),
            other => Err(Error::InvalidInput {
                message: format!("unsupported currency: {other}"),
            }),
        }
    }
}

/// Exchange rates relative to the base currency.
///
/// Serialized as a map of currency code to rate. When reading, codes this crate does
/// not know and unusable rates are skipped with a warning instead of failing the
/// whole document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExchangeRates {
    rates: BTreeMap<Currency, f64>,
}

impl<'de> Deserialize<'de> for ExchangeRates {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = BTreeMap::<String, f64>::deserialize(deserializer)?;
        let mut rates = Self::empty();
        for (code, rate) in raw {
            let Ok(currency) = Currency::try_from(code.as_str()) else {
                warn!("Skipping exchange rate for unsupported currency '{code}'");
                continue;
            };
            if rates.set_rate(currency, rate).is_err() {
                warn!("Skipping invalid exchange rate {rate} for {currency}");
            }
        }
        Ok(rates)
    }
}

impl Default for ExchangeRates {
    fn default() -> Self {
        Self {
            rates: BTreeMap::from([
                (Currency::Usd, 1.0),
                (Currency::Egp, 48.5),
                (Currency::Eur, 0.92),
                (Currency::Gbp, 0.79),
                (Currency::Sar, 3.75),
                (Currency::Aed, 3.67),
            ]),
        }
    }
}

impl ExchangeRates {
    /// An empty table; every currency converts at rate 1.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            rates: BTreeMap::new(),
        }
    }

    /// Rate of `currency` against the base currency, `1.0` when unknown.
    #[must_use]
    pub fn rate(&self, currency: Currency) -> f64 {
        self.rates.get(&currency).copied().unwrap_or_else(|| {
            warn!("No exchange rate for {currency}, treating it as the base currency");
            1.0
        })
    }

    /// Sets the rate of `currency` against the base currency.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `rate` is not a positive finite number.
    pub fn set_rate(&mut self, currency: Currency, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::InvalidArgument {
                name: "exchange rate",
                value: rate,
            });
        }
        self.rates.insert(currency, rate);
        Ok(())
    }

    /// Applies every entry of `overrides`, validating each rate.
    ///
    /// # Errors
    /// Returns `InvalidArgument` on the first invalid rate.
    pub fn merge(&mut self, overrides: &BTreeMap<Currency, f64>) -> Result<()> {
        for (currency, rate) in overrides {
            self.set_rate(*currency, *rate)?;
        }
        Ok(())
    }

    /// Converts `amount` from one currency to another through the base currency.
    #[must_use]
    pub fn convert(&self, amount: f64, from: Currency, to: Currency) -> f64 {
        if from == to {
            return amount;
        }
        (amount / self.rate(from)) * self.rate(to)
    }

    /// All known rates, ordered by currency.
    #[must_use]
    pub const fn as_map(&self) -> &BTreeMap<Currency, f64> {
        &self.rates
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_same_currency_is_unchanged() {
        let rates = ExchangeRates::default();
        assert_eq!(rates.convert(123.456, Currency::Egp, Currency::Egp), 123.456);
    }

    #[test]
    fn test_usd_to_egp() {
        let rates = ExchangeRates::default();
        assert_eq!(rates.convert(10.0, Currency::Usd, Currency::Egp), 485.0);
    }

    #[test]
    fn test_round_trip_is_close() {
        let rates = ExchangeRates::default();
        let pairs = [
            (Currency::Egp, Currency::Usd),
            (Currency::Eur, Currency::Sar),
            (Currency::Gbp, Currency::Aed),
            (Currency::Aed, Currency::Egp),
        ];
        for (a, b) in pairs {
            for amount in [0.01, 1.0, 99.99, 12_500.0] {
                let back = rates.convert(rates.convert(amount, a, b), b, a);
                assert!((back - amount).abs() < 1e-9 * amount.max(1.0));
            }
        }
    }

    #[test]
    fn test_missing_rate_defaults_to_one() {
        let mut rates = ExchangeRates::empty();
        rates.set_rate(Currency::Egp, 50.0).unwrap();
        // USD is missing and is treated as the base currency
        assert_eq!(rates.convert(2.0, Currency::Usd, Currency::Egp), 100.0);
        assert_eq!(rates.rate(Currency::Sar), 1.0);
    }

    #[test]
    fn test_set_rate_rejects_non_positive() {
        let mut rates = ExchangeRates::default();
        assert!(rates.set_rate(Currency::Eur, 0.0).is_err());
        assert!(rates.set_rate(Currency::Eur, -1.0).is_err());
        assert!(rates.set_rate(Currency::Eur, f64::NAN).is_err());
        assert_eq!(rates.rate(Currency::Eur), 0.92);
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!(Currency::try_from(" egp ").unwrap(), Currency::Egp);
        assert_eq!(Currency::try_from("USD").unwrap(), Currency::Usd);
        assert!(Currency::try_from("XYZ").is_err());
    }

    #[test]
    fn test_rates_serialize_as_code_map() {
        let json = serde_json::to_string(&ExchangeRates::default()).unwrap();
        assert!(json.contains("\"EGP\":48.5"));
        let parsed: ExchangeRates = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ExchangeRates::default());
    }

    #[test]
    fn test_unknown_codes_and_bad_rates_are_skipped() {
        let parsed: ExchangeRates =
            serde_json::from_str(r#"{"USD":1,"EGP":48.5,"KWD":0.31,"EUR":-2}"#).unwrap();
        assert_eq!(
            parsed.as_map(),
            &BTreeMap::from([(Currency::Egp, 48.5), (Currency::Usd, 1.0)])
        );
    }
}
