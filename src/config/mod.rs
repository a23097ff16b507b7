/// Database connection and table creation
pub mod database;

/// Settings file (fees, rates, VAT, ledger mode, gateways, seed data)
pub mod settings;
