//! Report generation business logic.
//!
//! Reports are pure reductions over a slice of ledger transactions: they never read the
//! clock or touch storage, so the same slice and range always produce the same report.
//! Only `completed` transactions count. Amounts are summed as recorded, in whatever
//! currency each transaction carries.

use crate::{
    core::{calculator::round_currency, ledger::Transaction},
    entities::transaction::{TransactionKind, TransactionStatus},
    errors::{Error, Result},
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap, fmt};

/// VAT rate applied when the settings file does not override it.
pub const DEFAULT_VAT_RATE: f64 = 0.15;

/// Number of categories kept in [`FinancialReport::top_categories`].
pub const TOP_CATEGORY_LIMIT: usize = 10;

/// Period a report or tax computation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    /// One calendar day
    Daily,
    /// Seven days
    Weekly,
    /// One calendar month
    Monthly,
    /// One calendar quarter
    Quarterly,
    /// One calendar year
    Yearly,
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        };
        f.write_str(name)
    }
}

impl TryFrom<&str> for ReportPeriod {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            other => Err(Error::InvalidInput {
                message: format!("unknown report period: {other}"),
            }),
        }
    }
}

/// Income attributed to one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    /// Category tag
    pub category: String,
    /// Sum of completed income
    pub amount: f64,
    /// Number of income transactions
    pub count: usize,
}

/// Income collected through one payment method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodTotal {
    /// Payment method name
    pub method: String,
    /// Sum of completed income
    pub amount: f64,
    /// Number of income transactions
    pub count: usize,
    /// Share of total revenue, 0-100
    pub percentage: f64,
}

/// Aggregated figures for a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialReport {
    /// Period label the report was requested for
    pub period: ReportPeriod,
    /// First instant included
    pub start_date: DateTime<Utc>,
    /// Last instant included
    pub end_date: DateTime<Utc>,
    /// Sum of completed income
    pub total_revenue: f64,
    /// Sum of completed expenses
    pub total_expenses: f64,
    /// Sum of completed refunds
    pub total_refunds: f64,
    /// Sum of completed commissions
    pub total_commissions: f64,
    /// Fees across every completed transaction
    pub total_fees: f64,
    /// `total_revenue - total_expenses`
    pub net_profit: f64,
    /// Completed transactions of any kind in range
    pub transaction_count: usize,
    /// `total_revenue / transaction_count`, 0 when the count is 0
    pub average_order_value: f64,
    /// Income grouped by category, largest first, at most ten
    pub top_categories: Vec<CategoryTotal>,
    /// Income grouped by payment method, largest first
    pub payment_methods: Vec<PaymentMethodTotal>,
}

/// VAT figures for the window preceding a reference instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxData {
    /// Period the window was derived from
    pub period: ReportPeriod,
    /// First instant of the window
    pub start_date: DateTime<Utc>,
    /// Last instant of the window
    pub end_date: DateTime<Utc>,
    /// Revenue minus expenses, may be negative
    pub taxable_income: f64,
    /// Rate applied, as a fraction
    pub vat_rate: f64,
    /// VAT owed, never negative
    pub vat_amount: f64,
    /// Expenses deducted from revenue
    pub deductions: f64,
    /// `taxable_income - vat_amount`
    pub net_taxable: f64,
}

#[derive(Default)]
struct Bucket {
    amount: f64,
    count: usize,
}

/// Sorts descending by amount, then ascending by name.
fn by_amount_then_name(a: (&String, &Bucket), b: (&String, &Bucket)) -> Ordering {
    b.1.amount
        .total_cmp(&a.1.amount)
        .then_with(|| a.0.cmp(b.0))
}

/// Generates a report over completed transactions created within `[start, end]`.
///
/// # Arguments
/// * `transactions` - Ledger contents, any order
/// * `period` - Label carried into the report
/// * `start` - First instant included
/// * `end` - Last instant included
#[must_use]
pub fn generate_report(
    transactions: &[Transaction],
    period: ReportPeriod,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> FinancialReport {
    let mut revenue = 0.0;
    let mut expenses = 0.0;
    let mut refunds = 0.0;
    let mut commissions = 0.0;
    let mut fees = 0.0;
    let mut transaction_count = 0_usize;
    let mut categories: BTreeMap<String, Bucket> = BTreeMap::new();
    let mut methods: BTreeMap<String, Bucket> = BTreeMap::new();

    for tx in transactions.iter().filter(|tx| {
        tx.status == TransactionStatus::Completed && tx.created_at >= start && tx.created_at <= end
    }) {
        transaction_count += 1;
        fees += tx.fees;
        match tx.kind {
            TransactionKind::Income => {
                revenue += tx.amount;
                let category = categories.entry(tx.category.clone()).or_default();
                category.amount += tx.amount;
                category.count += 1;
                let method = methods.entry(tx.payment_method.clone()).or_default();
                method.amount += tx.amount;
                method.count += 1;
            }
            TransactionKind::Expense => expenses += tx.amount,
            TransactionKind::Refund => refunds += tx.amount,
            TransactionKind::Commission => commissions += tx.amount,
        }
    }

    let mut categories: Vec<_> = categories.iter().collect();
    categories.sort_by(|a, b| by_amount_then_name(*a, *b));
    let top_categories = categories
        .into_iter()
        .take(TOP_CATEGORY_LIMIT)
        .map(|(category, bucket)| CategoryTotal {
            category: category.clone(),
            amount: round_currency(bucket.amount),
            count: bucket.count,
        })
        .collect();

    let mut methods: Vec<_> = methods.iter().collect();
    methods.sort_by(|a, b| by_amount_then_name(*a, *b));
    let payment_methods = methods
        .into_iter()
        .map(|(method, bucket)| PaymentMethodTotal {
            method: method.clone(),
            amount: round_currency(bucket.amount),
            count: bucket.count,
            percentage: if revenue > 0.0 {
                round_currency(bucket.amount / revenue * 100.0)
            } else {
                0.0
            },
        })
        .collect();

    // Cast safety: transaction counts stay far below 2^52
    #[allow(clippy::cast_precision_loss)]
    let average_order_value = if transaction_count == 0 {
        0.0
    } else {
        round_currency(revenue / transaction_count as f64)
    };

    FinancialReport {
        period,
        start_date: start,
        end_date: end,
        total_revenue: round_currency(revenue),
        total_expenses: round_currency(expenses),
        total_refunds: round_currency(refunds),
        total_commissions: round_currency(commissions),
        total_fees: round_currency(fees),
        net_profit: round_currency(revenue - expenses),
        transaction_count,
        average_order_value,
        top_categories,
        payment_methods,
    }
}

fn month_start(year: i32, month: u32) -> Result<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc())
        .ok_or_else(|| Error::InvalidInput {
            message: format!("date out of range: {year}-{month:02}"),
        })
}

/// Inclusive window preceding `now` that a tax computation for `period` covers.
///
/// - `Daily`: the previous calendar day
/// - `Weekly`: the seven days before today
/// - `Monthly`, `Quarterly`, `Yearly`: the previous calendar month, quarter or year
///
/// # Errors
/// Returns `InvalidInput` if the window falls outside the representable date range.
pub fn tax_window(period: ReportPeriod, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let today = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|start| start.and_utc())
        .ok_or_else(|| Error::InvalidInput {
            message: format!("cannot take the start of day of {now}"),
        })?;
    let (year, month) = (now.year(), now.month());

    let (start, end_exclusive) = match period {
        ReportPeriod::Daily => (today - Duration::days(1), today),
        ReportPeriod::Weekly => (today - Duration::days(7), today),
        ReportPeriod::Monthly => {
            let (prev_year, prev_month) = if month == 1 {
                (year - 1, 12)
            } else {
                (year, month - 1)
            };
            (month_start(prev_year, prev_month)?, month_start(year, month)?)
        }
        ReportPeriod::Quarterly => {
            let quarter_month = (month - 1) / 3 * 3 + 1;
            let (prev_year, prev_month) = if quarter_month == 1 {
                (year - 1, 10)
            } else {
                (year, quarter_month - 3)
            };
            (
                month_start(prev_year, prev_month)?,
                month_start(year, quarter_month)?,
            )
        }
        ReportPeriod::Yearly => (month_start(year - 1, 1)?, month_start(year, 1)?),
    };

    Ok((start, end_exclusive - Duration::nanoseconds(1)))
}

/// Computes VAT over the window preceding `now`.
///
/// # Errors
/// Returns `InvalidArgument` if `vat_rate` is negative or not finite, or `InvalidInput`
/// if the window cannot be computed.
pub fn calculate_tax(
    transactions: &[Transaction],
    period: ReportPeriod,
    now: DateTime<Utc>,
    vat_rate: f64,
) -> Result<TaxData> {
    if !vat_rate.is_finite() || vat_rate < 0.0 {
        return Err(Error::InvalidArgument {
            name: "vat rate",
            value: vat_rate,
        });
    }

    let (start, end) = tax_window(period, now)?;
    let report = generate_report(transactions, period, start, end);
    let taxable_income = round_currency(report.total_revenue - report.total_expenses);
    let vat_amount = round_currency(taxable_income.max(0.0) * vat_rate);

    Ok(TaxData {
        period,
        start_date: start,
        end_date: end,
        taxable_income,
        vat_rate,
        vat_amount,
        deductions: report.total_expenses,
        net_taxable: round_currency(taxable_income - vat_amount),
    })
}

/// Serializes a report as pretty-printed JSON.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn export_json(report: &FinancialReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Column order of [`export_transactions_csv`].
pub const TRANSACTIONS_CSV_HEADER: [&str; 17] = [
    "id",
    "type",
    "amount",
    "currency",
    "fees",
    "net_amount",
    "status",
    "payment_method",
    "category",
    "description",
    "order_id",
    "user_id",
    "created_at",
    "processed_at",
    "exchange_rate",
    "refund_of",
    "gateway_reference",
];

fn format_amount(value: f64) -> String {
    format!("{value:.2}")
}

/// Flattens transactions into CSV, one row per transaction after a header row.
///
/// # Errors
/// Returns an error if writing a record fails.
pub fn export_transactions_csv(transactions: &[Transaction]) -> Result<String> {
    let mut csv = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    csv.write_record(TRANSACTIONS_CSV_HEADER)?;
    for tx in transactions {
        csv.write_record([
            tx.id.to_string().as_str(),
            tx.kind.as_str(),
            format_amount(tx.amount).as_str(),
            tx.currency.code(),
            format_amount(tx.fees).as_str(),
            format_amount(tx.net_amount).as_str(),
            tx.status.as_str(),
            tx.payment_method.as_str(),
            tx.category.as_str(),
            tx.description.as_str(),
            tx.order_id.as_deref().unwrap_or(""),
            tx.user_id.as_deref().unwrap_or(""),
            tx.created_at.to_rfc3339().as_str(),
            tx.processed_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_default()
                .as_str(),
            tx.exchange_rate
                .map(|rate| rate.to_string())
                .unwrap_or_default()
                .as_str(),
            tx.refund_of
                .map(|id| id.to_string())
                .unwrap_or_default()
                .as_str(),
            tx.gateway_reference.as_deref().unwrap_or(""),
        ])?;
    }

    let bytes = csv.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidInput {
        message: format!("CSV export is not UTF-8: {e}"),
    })
}
