//! Settings file loading.
//!
//! Every field has a built-in default, so an empty or missing settings file yields a
//! working configuration: the standard fee table, the standard exchange rates, 15% VAT,
//! database-backed ledger and no seed data.

use crate::{
    core::{
        calculator::{DEFAULT_FEE_RATE, FeeSchedule},
        coupon::NewCoupon,
        currency::{Currency, ExchangeRates},
        gateway::{BankTransferGateway, CardGateway, GatewayRegistry, WalletGateway},
        ledger::Persistence,
        report::DEFAULT_VAT_RATE,
        service::NewService,
        snapshot::SnapshotFile,
    },
    errors::{Error, Result},
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{info, warn};

/// Environment variable naming the settings file.
pub const SETTINGS_PATH_VAR: &str = "SMM_LEDGER_CONFIG";

/// Settings file used when [`SETTINGS_PATH_VAR`] is unset.
pub const DEFAULT_SETTINGS_PATH: &str = "config.toml";

/// The whole settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// VAT rate as a fraction
    pub vat_rate: f64,
    /// `[fees]` table
    pub fees: FeeSettings,
    /// Rates relative to USD, overriding the built-in table
    pub exchange_rates: BTreeMap<Currency, f64>,
    /// `[ledger]` table
    pub ledger: LedgerSettings,
    /// `[gateways]` table
    pub gateways: GatewaySettings,
    /// Coupons created on startup when missing
    pub coupons: Vec<NewCoupon>,
    /// Services created on startup when missing
    pub services: Vec<NewService>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vat_rate: DEFAULT_VAT_RATE,
            fees: FeeSettings::default(),
            exchange_rates: BTreeMap::new(),
            ledger: LedgerSettings::default(),
            gateways: GatewaySettings::default(),
            coupons: Vec::new(),
            services: Vec::new(),
        }
    }
}

/// `[fees]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeeSettings {
    /// Rate for payment methods missing from the table
    pub default_rate: f64,
    /// Per-method rates layered over the built-in table
    pub methods: BTreeMap<String, f64>,
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            default_rate: DEFAULT_FEE_RATE,
            methods: BTreeMap::new(),
        }
    }
}

/// Where the ledger keeps its state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// Nothing persisted
    Memory,
    /// Whole-ledger JSON document
    Snapshot,
    /// One database row per transaction
    #[default]
    Database,
}

/// `[ledger]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Where the ledger persists its state
    pub mode: LedgerMode,
    /// Snapshot document used in `snapshot` mode
    pub snapshot_path: PathBuf,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            mode: LedgerMode::default(),
            snapshot_path: PathBuf::from("data/ledger.json"),
        }
    }
}

/// `[gateways]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Simulated processing time of every gateway
    pub settlement_delay_ms: u64,
    /// Largest single card payment
    pub card_limit: f64,
    /// Largest single wallet payment
    pub wallet_limit: f64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            settlement_delay_ms: 1_500,
            card_limit: 100_000.0,
            wallet_limit: 30_000.0,
        }
    }
}

impl Settings {
    /// Checks values serde cannot.
    ///
    /// # Errors
    /// Returns `Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.vat_rate) {
            return Err(Error::Config {
                message: format!("vat_rate must be between 0 and 1, got {}", self.vat_rate),
            });
        }
        for (name, limit) in [
            ("card_limit", self.gateways.card_limit),
            ("wallet_limit", self.gateways.wallet_limit),
        ] {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(Error::Config {
                    message: format!("gateways.{name} must be positive, got {limit}"),
                });
            }
        }
        self.fee_schedule()?;
        self.exchange_rates()?;
        Ok(())
    }

    /// Built-in fee table with the configured overrides.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a negative or non-finite rate.
    pub fn fee_schedule(&self) -> Result<FeeSchedule> {
        FeeSchedule::default()
            .with_default_rate(self.fees.default_rate)?
            .with_overrides(&self.fees.methods)
    }

    /// Built-in exchange rates with the configured overrides.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a non-positive or non-finite rate.
    pub fn exchange_rates(&self) -> Result<ExchangeRates> {
        let mut rates = ExchangeRates::default();
        rates.merge(&self.exchange_rates)?;
        Ok(rates)
    }

    /// Card, wallet and bank-transfer gateways with the configured limits and delay.
    #[must_use]
    pub fn gateway_registry(&self) -> GatewayRegistry {
        let delay = Duration::from_millis(self.gateways.settlement_delay_ms);
        GatewayRegistry::default()
            .with(Arc::new(CardGateway::new(self.gateways.card_limit, delay)))
            .with(Arc::new(WalletGateway::new(self.gateways.wallet_limit, delay)))
            .with(Arc::new(BankTransferGateway::new(delay)))
    }

    /// Ledger persistence for the configured mode.
    #[must_use]
    pub fn persistence(&self, db: &DatabaseConnection) -> Persistence {
        match self.ledger.mode {
            LedgerMode::Memory => Persistence::Ephemeral,
            LedgerMode::Snapshot => {
                Persistence::Snapshot(SnapshotFile::new(&self.ledger.snapshot_path))
            }
            LedgerMode::Database => Persistence::Database(db.clone()),
        }
    }
}

/// Loads and validates settings from a TOML file.
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid or a field has the wrong type
/// - A value is out of range
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read {}: {e}", path.as_ref().display()),
    })?;
    parse_settings(&contents)
}

/// Parses and validates settings from TOML text.
///
/// # Errors
/// Returns `Config` if the text is not valid settings.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse settings: {e}"),
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Loads the file named by `SMM_LEDGER_CONFIG`, or `config.toml`.
///
/// A missing file is not an error: the defaults are used and a warning is logged.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_default_settings() -> Result<Settings> {
    let path = std::env::var(SETTINGS_PATH_VAR).unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
    if !Path::new(&path).exists() {
        warn!("Settings file {path} not found, using built-in defaults");
        return Ok(Settings::default());
    }
    let settings = load_settings(&path)?;
    info!(
        coupons = settings.coupons.len(),
        services = settings.services.len(),
        "Loaded settings from {path}"
    );
    Ok(settings)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::entities::{
        coupon::DiscountType,
        service::{Platform, ServiceType},
    };

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = parse_settings("").unwrap();
        assert_eq!(settings.vat_rate, DEFAULT_VAT_RATE);
        assert_eq!(settings.ledger.mode, LedgerMode::Database);
        assert_eq!(settings.fee_schedule().unwrap(), FeeSchedule::default());
        assert_eq!(settings.exchange_rates().unwrap(), ExchangeRates::default());
        assert!(settings.coupons.is_empty());
    }

    #[test]
    fn test_parse_full_settings() {
        let toml_str = r#"
            vat_rate = 0.14

            [fees]
            default_rate = 0.03
            [fees.methods]
            credit_card = 0.025

            [exchange_rates]
            EGP = 50.0

            [ledger]
            mode = "snapshot"
            snapshot_path = "/tmp/ledger.json"

            [gateways]
            settlement_delay_ms = 0
            wallet_limit = 10000.0

            [[coupons]]
            code = "SAVE20"
            discount_type = "fixed"
            discount_value = 20.0
            min_amount = 50.0

            [[services]]
            name = "Instagram Followers"
            platform = "instagram"
            service_type = "followers"
            provider_price = 10.0
            profit_margin = 30.0
            max_quantity = 50000
        "#;

        let settings = parse_settings(toml_str).unwrap();
        assert_eq!(settings.vat_rate, 0.14);

        let fees = settings.fee_schedule().unwrap();
        assert_eq!(fees.rate_for("credit_card"), 0.025);
        assert_eq!(fees.rate_for("unknown"), 0.03);
        assert_eq!(fees.rate_for("paypal"), 0.034);

        let rates = settings.exchange_rates().unwrap();
        assert_eq!(rates.rate(Currency::Egp), 50.0);
        assert_eq!(rates.rate(Currency::Eur), 0.92);

        assert_eq!(settings.ledger.mode, LedgerMode::Snapshot);
        assert_eq!(settings.gateways.settlement_delay_ms, 0);
        assert_eq!(settings.gateways.card_limit, 100_000.0);

        assert_eq!(settings.coupons.len(), 1);
        assert_eq!(settings.coupons[0].discount_type, DiscountType::Fixed);
        assert_eq!(settings.coupons[0].max_uses, None);

        let service = &settings.services[0];
        assert_eq!(service.platform, Platform::Instagram);
        assert_eq!(service.service_type, ServiceType::Followers);
        assert_eq!(service.min_quantity, 1);
        assert_eq!(service.max_quantity, 50_000);
        assert!(service.is_active);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        assert!(matches!(
            parse_settings("vat_rate = 1.5"),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            parse_settings("[gateways]\ncard_limit = -1.0"),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            parse_settings("[ledger]\nmode = \"cloud\""),
            Err(Error::Config { .. })
        ));
        assert!(parse_settings("[exchange_rates]\nUSD = 0.0").is_err());
        assert!(parse_settings("[exchange_rates]\nXYZ = 1.0").is_err());
    }

    #[test]
    fn test_bundled_config_file_is_valid() {
        let settings = load_settings(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml")).unwrap();
        assert!(settings.coupons.iter().any(|c| c.code == "SAVE20"));
        assert!(!settings.services.is_empty());
        assert_eq!(settings.vat_rate, DEFAULT_VAT_RATE);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = load_settings("/nonexistent-smm-ledger-dir/config.toml");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_persistence_follows_mode() -> Result<()> {
        let db = crate::test_utils::setup_test_db().await?;
        let mut settings = Settings::default();
        assert!(matches!(settings.persistence(&db), Persistence::Database(_)));

        settings.ledger.mode = LedgerMode::Memory;
        assert!(matches!(settings.persistence(&db), Persistence::Ephemeral));

        settings.ledger.mode = LedgerMode::Snapshot;
        assert!(matches!(
            settings.persistence(&db),
            Persistence::Snapshot(file) if file.path() == Path::new("data/ledger.json")
        ));
        Ok(())
    }

    #[test]
    fn test_registry_covers_every_channel() {
        use crate::core::gateway::PaymentChannel;
        let registry = Settings::default().gateway_registry();
        for channel in [
            PaymentChannel::Card,
            PaymentChannel::Wallet,
            PaymentChannel::BankTransfer,
        ] {
            assert!(registry.get(channel).is_some());
        }
    }
}
