use chrono::{Datelike, Utc};
use dotenvy::dotenv;
use smm_ledger::{
    config::{database, settings},
    core::{
        coupon,
        ledger::Ledger,
        payment::PaymentService,
        report::{self, ReportPeriod},
        service, stats,
    },
    errors::{Error, Result},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();

    // 3. Settings file (fees, rates, VAT, ledger mode, seed data)
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load settings: {e}"))?;

    // 4. Database and tables
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to the database: {e}"))?;
    database::create_tables(&db).await?;

    // 5. Seed coupons and services that are missing
    let coupons = coupon::seed_coupons(&db, &settings.coupons).await?;
    let services = service::seed_services(&db, &settings.services).await?;
    info!(coupons, services, "Seeded catalogue");

    // 6. Ledger and payment service
    let ledger = Ledger::open(settings.persistence(&db), settings.exchange_rates()?).await?;
    let payments = PaymentService::new(
        ledger,
        db.clone(),
        settings.fee_schedule()?,
        settings.gateway_registry(),
    );
    if let Some(failure) = payments.ledger().persistence_error() {
        warn!("Ledger persistence is degraded: {failure}");
    }

    // 7. Month-to-date report and last month's VAT
    let now = Utc::now();
    let month_start = now
        .date_naive()
        .with_day(1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc())
        .ok_or_else(|| Error::InvalidInput {
            message: format!("cannot take the start of the month of {now}"),
        })?;
    let transactions = payments.ledger().transactions();
    let month = report::generate_report(transactions, ReportPeriod::Monthly, month_start, now);
    info!("Month-to-date report:\n{}", report::export_json(&month)?);

    let tax = report::calculate_tax(transactions, ReportPeriod::Monthly, now, settings.vat_rate)?;
    info!(
        taxable = tax.taxable_income,
        vat = tax.vat_amount,
        "VAT for {} to {}",
        tax.start_date.date_naive(),
        tax.end_date.date_naive()
    );

    let catalogue = stats::service_stats(&service::list_services(&db).await?);
    let orders = stats::order_stats(&service::list_orders(&db).await?);
    info!(
        services = catalogue.total_services,
        active = catalogue.active_services,
        orders = orders.total_orders,
        order_revenue = orders.revenue,
        order_profit = orders.profit,
        "Catalogue summary"
    );

    Ok(())
}
