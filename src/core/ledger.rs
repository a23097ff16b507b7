//! Transaction ledger - the ordered record of every financial movement.
//!
//! The in-memory collection is authoritative for the running process. After each
//! mutation it is persisted according to [`Persistence`]: not at all, as a whole JSON
//! snapshot, or row by row in the database. A persistence failure is logged and kept
//! in [`Ledger::persistence_error`]; it never rolls back or fails the mutation itself.
//! A snapshot that cannot be read at startup is moved aside before anything is written,
//! and if that is impossible, snapshot writes stay disabled for the life of the ledger.
//!
//! Amount and fees are fixed at creation. Afterwards a transaction can only move
//! forward in status; refunds are recorded as new transactions.

use crate::{
    core::{
        currency::{Currency, ExchangeRates},
        snapshot::SnapshotFile,
    },
    entities::{
        self,
        transaction::{self as transaction_entity, TransactionKind, TransactionStatus},
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// A single recorded financial movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique id
    pub id: Uuid,
    /// income / expense / refund / commission
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Gross amount in currency units
    pub amount: f64,
    /// Currency of `amount`
    pub currency: Currency,
    /// Human-readable description
    pub description: String,
    /// Free-text category tag
    pub category: String,
    /// Order reference
    #[serde(default)]
    pub order_id: Option<String>,
    /// Customer reference
    #[serde(default)]
    pub user_id: Option<String>,
    /// Payment method name
    pub payment_method: String,
    /// Processing status
    pub status: TransactionStatus,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Instant the transaction reached `completed`
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    /// Processing fees
    pub fees: f64,
    /// `amount - fees`
    pub net_amount: f64,
    /// Rate of `currency` against the base currency at creation
    #[serde(default)]
    pub exchange_rate: Option<f64>,
    /// Transaction this refund reverses
    #[serde(default)]
    pub refund_of: Option<Uuid>,
    /// Checkout attempt token
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Reference returned by the payment gateway
    #[serde(default)]
    pub gateway_reference: Option<String>,
    /// Why the gateway declined or failed the payment
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl From<&Transaction> for transaction_entity::ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: Set(tx.id.to_string()),
            kind: Set(tx.kind),
            amount: Set(tx.amount),
            currency: Set(tx.currency),
            description: Set(tx.description.clone()),
            category: Set(tx.category.clone()),
            order_id: Set(tx.order_id.clone()),
            user_id: Set(tx.user_id.clone()),
            payment_method: Set(tx.payment_method.clone()),
            status: Set(tx.status),
            created_at: Set(tx.created_at),
            processed_at: Set(tx.processed_at),
            fees: Set(tx.fees),
            net_amount: Set(tx.net_amount),
            exchange_rate: Set(tx.exchange_rate),
            refund_of: Set(tx.refund_of.map(|id| id.to_string())),
            idempotency_key: Set(tx.idempotency_key.clone()),
            gateway_reference: Set(tx.gateway_reference.clone()),
            failure_reason: Set(tx.failure_reason.clone()),
            ..Default::default()
        }
    }
}

fn parse_stored_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Persistence {
        message: format!("Stored transaction id '{value}' is not a UUID: {e}"),
    })
}

impl TryFrom<transaction_entity::Model> for Transaction {
    type Error = Error;

    fn try_from(row: transaction_entity::Model) -> Result<Self> {
        Ok(Self {
            id: parse_stored_id(&row.transaction_id)?,
            kind: row.kind,
            amount: row.amount,
            currency: row.currency,
            description: row.description,
            category: row.category,
            order_id: row.order_id,
            user_id: row.user_id,
            payment_method: row.payment_method,
            status: row.status,
            created_at: row.created_at,
            processed_at: row.processed_at,
            fees: row.fees,
            net_amount: row.net_amount,
            exchange_rate: row.exchange_rate,
            refund_of: row.refund_of.as_deref().map(parse_stored_id).transpose()?,
            idempotency_key: row.idempotency_key,
            gateway_reference: row.gateway_reference,
            failure_reason: row.failure_reason,
        })
    }
}

/// A transaction about to be appended. Id and creation time are filled in when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Explicit id, generated when `None`
    pub id: Option<Uuid>,
    /// income / expense / refund / commission
    pub kind: TransactionKind,
    /// Gross amount
    pub amount: f64,
    /// Currency of `amount`
    pub currency: Currency,
    /// Human-readable description
    pub description: String,
    /// Free-text category tag
    pub category: String,
    /// Order reference
    pub order_id: Option<String>,
    /// Customer reference
    pub user_id: Option<String>,
    /// Payment method name
    pub payment_method: String,
    /// Initial status
    pub status: TransactionStatus,
    /// Explicit creation instant, `now` when `None`
    pub created_at: Option<DateTime<Utc>>,
    /// Processing fees
    pub fees: f64,
    /// Exchange rate to the base currency
    pub exchange_rate: Option<f64>,
    /// Transaction this refund reverses
    pub refund_of: Option<Uuid>,
    /// Checkout attempt token
    pub idempotency_key: Option<String>,
}

impl NewTransaction {
    /// A pending transaction with no fees, references or description.
    #[must_use]
    pub fn new(kind: TransactionKind, amount: f64, currency: Currency) -> Self {
        Self {
            id: None,
            kind,
            amount,
            currency,
            description: String::new(),
            category: "general".to_string(),
            order_id: None,
            user_id: None,
            payment_method: "manual".to_string(),
            status: TransactionStatus::Pending,
            created_at: None,
            fees: 0.0,
            exchange_rate: None,
            refund_of: None,
            idempotency_key: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the category tag.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Sets the payment method name.
    #[must_use]
    pub fn payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = method.into();
        self
    }

    /// Links the transaction to a customer.
    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Links the transaction to an order.
    #[must_use]
    pub fn order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    /// Sets the initial status.
    #[must_use]
    pub const fn status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the processing fees.
    #[must_use]
    pub const fn fees(mut self, fees: f64) -> Self {
        self.fees = fees;
        self
    }

    /// Backdates or pins the creation instant.
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Records the exchange rate to the base currency.
    #[must_use]
    pub const fn exchange_rate(mut self, rate: f64) -> Self {
        self.exchange_rate = Some(rate);
        self
    }

    /// Tags the transaction with a checkout attempt token.
    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Optional fields merged into a transaction by [`Ledger::update_status`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    /// Replacement description
    pub description: Option<String>,
    /// Gateway reference to record
    pub gateway_reference: Option<String>,
    /// Decline or error reason to record
    pub failure_reason: Option<String>,
    /// Exchange rate to record
    pub exchange_rate: Option<f64>,
    /// Explicit completion instant, `now` when entering `completed` without one
    pub processed_at: Option<DateTime<Utc>>,
}

/// Conjunctive transaction filter. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    /// Inclusive creation-time range
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Transaction kind
    pub kind: Option<TransactionKind>,
    /// Transaction status
    pub status: Option<TransactionStatus>,
    /// Customer reference
    pub user_id: Option<String>,
}

impl TransactionFilter {
    /// Whether `tx` satisfies every populated field.
    #[must_use]
    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some((start, end)) = self.date_range
            && (tx.created_at < start || tx.created_at > end)
        {
            return false;
        }
        if self.kind.is_some_and(|kind| kind != tx.kind) {
            return false;
        }
        if self.status.is_some_and(|status| status != tx.status) {
            return false;
        }
        if let Some(user_id) = &self.user_id
            && tx.user_id.as_deref() != Some(user_id.as_str())
        {
            return false;
        }
        true
    }
}

/// Where the ledger writes its state after every mutation.
#[derive(Debug)]
pub enum Persistence {
    /// Memory only
    Ephemeral,
    /// Whole JSON document rewritten on each mutation
    Snapshot(SnapshotFile),
    /// One `transactions` row per ledger transaction
    Database(DatabaseConnection),
}

enum Change<'a> {
    Appended(&'a Transaction),
    Updated(&'a Transaction),
    RatesChanged,
}

/// The ordered collection of all transactions plus the exchange rates in effect.
#[derive(Debug)]
pub struct Ledger {
    transactions: Vec<Transaction>,
    index: HashMap<Uuid, usize>,
    rates: ExchangeRates,
    persistence: Persistence,
    persistence_error: Option<String>,
    open_error: Option<String>,
    snapshot_writes_blocked: bool,
}

impl Ledger {
    /// A memory-only ledger.
    #[must_use]
    pub fn in_memory(rates: ExchangeRates) -> Self {
        Self {
            transactions: Vec::new(),
            index: HashMap::new(),
            rates,
            persistence: Persistence::Ephemeral,
            persistence_error: None,
            open_error: None,
            snapshot_writes_blocked: false,
        }
    }

    /// Opens a ledger, loading whatever `persistence` already holds.
    ///
    /// `rates` are used unless a snapshot carries its own. An unreadable snapshot is
    /// logged, moved to `<path>.corrupt-<timestamp>` and the ledger starts empty. When
    /// it cannot be moved, the ledger refuses to write the snapshot at all. Either way
    /// the load failure stays visible through [`Ledger::persistence_error`].
    ///
    /// # Errors
    /// Returns an error if database rows cannot be loaded or decoded.
    pub async fn open(persistence: Persistence, rates: ExchangeRates) -> Result<Self> {
        let mut ledger = Self::in_memory(rates);

        let (loaded, rates) = match &persistence {
            Persistence::Ephemeral => (Vec::new(), None),
            Persistence::Snapshot(file) => match file.load() {
                Ok(Some(snapshot)) => {
                    let rates = (!snapshot.exchange_rates.as_map().is_empty())
                        .then_some(snapshot.exchange_rates);
                    (snapshot.transactions, rates)
                }
                Ok(None) => (Vec::new(), None),
                Err(e) => {
                    error!("Starting with an empty ledger: {e}");
                    let message = match file.quarantine() {
                        Ok(moved) => format!("{e}; original kept at {}", moved.display()),
                        Err(move_error) => {
                            error!("Snapshot writes disabled: {move_error}");
                            ledger.snapshot_writes_blocked = true;
                            format!("{e}; snapshot writes disabled: {move_error}")
                        }
                    };
                    ledger.open_error = Some(message);
                    (Vec::new(), None)
                }
            },
            Persistence::Database(db) => {
                let rows = entities::Transaction::find()
                    .order_by_asc(transaction_entity::Column::RowId)
                    .all(db)
                    .await?;
                let loaded = rows
                    .into_iter()
                    .map(Transaction::try_from)
                    .collect::<Result<Vec<_>>>()?;
                (loaded, None)
            }
        };

        if let Some(rates) = rates {
            ledger.rates = rates;
        }
        for tx in loaded {
            ledger.index.insert(tx.id, ledger.transactions.len());
            ledger.transactions.push(tx);
        }
        ledger.persistence = persistence;
        info!(
            transactions = ledger.transactions.len(),
            "Opened transaction ledger"
        );
        Ok(ledger)
    }

    /// Appends a transaction and persists the ledger.
    ///
    /// Fills in id and creation time when absent, computes `net_amount`, and stamps
    /// `processed_at` when the transaction is created already completed.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a negative or non-finite amount, fees or exchange
    /// rate, and `InvalidInput` when the id is already in the ledger.
    #[instrument(skip(self, new), fields(kind = %new.kind, amount = new.amount))]
    pub async fn append(&mut self, new: NewTransaction) -> Result<Transaction> {
        for (name, value) in [("amount", new.amount), ("fees", new.fees)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidArgument { name, value });
            }
        }
        if let Some(rate) = new.exchange_rate
            && (!rate.is_finite() || rate <= 0.0)
        {
            return Err(Error::InvalidArgument {
                name: "exchange rate",
                value: rate,
            });
        }

        let id = new.id.unwrap_or_else(Uuid::new_v4);
        if self.index.contains_key(&id) {
            return Err(Error::InvalidInput {
                message: format!("Transaction '{id}' already exists"),
            });
        }

        let created_at = new.created_at.unwrap_or_else(Utc::now);
        let processed_at = (new.status == TransactionStatus::Completed).then_some(created_at);
        let tx = Transaction {
            id,
            kind: new.kind,
            amount: new.amount,
            currency: new.currency,
            description: new.description,
            category: new.category,
            order_id: new.order_id,
            user_id: new.user_id,
            payment_method: new.payment_method,
            status: new.status,
            created_at,
            processed_at,
            fees: new.fees,
            net_amount: new.amount - new.fees,
            exchange_rate: new.exchange_rate,
            refund_of: new.refund_of,
            idempotency_key: new.idempotency_key,
            gateway_reference: None,
            failure_reason: None,
        };

        self.index.insert(id, self.transactions.len());
        self.transactions.push(tx.clone());
        self.persist(Change::Appended(&tx)).await;
        debug!(%id, "Appended transaction");
        Ok(tx)
    }

    /// Moves a transaction to `status`, merging the optional fields in `update`.
    ///
    /// Entering `completed` stamps `processed_at`. Repeating the current status only
    /// merges the fields.
    ///
    /// # Errors
    /// Returns `TransactionNotFound` for an unknown id and `InvalidStatusTransition`
    /// when the move is not allowed.
    #[instrument(skip(self, update))]
    pub async fn update_status(
        &mut self,
        id: Uuid,
        status: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<Transaction> {
        let position = *self
            .index
            .get(&id)
            .ok_or_else(|| Error::TransactionNotFound { id: id.to_string() })?;
        let tx = &mut self.transactions[position];

        if tx.status != status && !tx.status.can_transition_to(status) {
            return Err(Error::InvalidStatusTransition {
                from: tx.status.to_string(),
                to: status.to_string(),
            });
        }

        if status == TransactionStatus::Completed && tx.status != TransactionStatus::Completed {
            tx.processed_at = Some(update.processed_at.unwrap_or_else(Utc::now));
        }
        tx.status = status;
        if let Some(description) = update.description {
            tx.description = description;
        }
        if let Some(reference) = update.gateway_reference {
            tx.gateway_reference = Some(reference);
        }
        if let Some(rate) = update.exchange_rate {
            tx.exchange_rate = Some(rate);
        }
        if let Some(reason) = update.failure_reason {
            tx.failure_reason = Some(reason);
        }

        let updated = tx.clone();
        self.persist(Change::Updated(&updated)).await;
        info!(%id, status = %status, "Updated transaction status");
        Ok(updated)
    }

    /// Records a full refund of a completed income transaction.
    ///
    /// # Errors
    /// Returns `TransactionNotFound` for an unknown id, `InvalidInput` when the
    /// transaction is not a completed income, and `AlreadyRefunded` on a second refund.
    pub async fn refund(&mut self, id: Uuid, reason: &str) -> Result<Transaction> {
        let original = self
            .get(id)
            .ok_or_else(|| Error::TransactionNotFound { id: id.to_string() })?;
        if original.kind != TransactionKind::Income
            || original.status != TransactionStatus::Completed
        {
            return Err(Error::InvalidInput {
                message: format!("Only completed income can be refunded, '{id}' is not"),
            });
        }
        if self.transactions.iter().any(|tx| tx.refund_of == Some(id)) {
            return Err(Error::AlreadyRefunded { id: id.to_string() });
        }

        let mut refund = NewTransaction::new(
            TransactionKind::Refund,
            original.amount,
            original.currency,
        )
        .description(reason)
        .category(original.category.clone())
        .payment_method(original.payment_method.clone())
        .status(TransactionStatus::Completed);
        refund.user_id.clone_from(&original.user_id);
        refund.order_id.clone_from(&original.order_id);
        refund.exchange_rate = original.exchange_rate;
        refund.refund_of = Some(id);

        self.append(refund).await
    }

    /// Transactions matching `filter`, in insertion order.
    #[must_use]
    pub fn query(&self, filter: &TransactionFilter) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|tx| filter.matches(tx))
            .collect()
    }

    /// Transaction with this id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Transaction> {
        self.index.get(&id).map(|&position| &self.transactions[position])
    }

    /// Transaction created by the checkout attempt `key`.
    #[must_use]
    pub fn find_by_idempotency_key(&self, key: &str) -> Option<&Transaction> {
        self.transactions
            .iter()
            .find(|tx| tx.idempotency_key.as_deref() == Some(key))
    }

    /// Refund recorded against `id`, if any.
    #[must_use]
    pub fn refund_for(&self, id: Uuid) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.refund_of == Some(id))
    }

    /// Every transaction, in insertion order.
    #[must_use]
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Number of transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Exchange rates in effect.
    #[must_use]
    pub const fn rates(&self) -> &ExchangeRates {
        &self.rates
    }

    /// Updates an exchange rate and persists the ledger.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `rate` is not positive and finite.
    pub async fn set_rate(&mut self, currency: Currency, rate: f64) -> Result<()> {
        self.rates.set_rate(currency, rate)?;
        self.persist(Change::RatesChanged).await;
        Ok(())
    }

    /// Last persistence failure.
    ///
    /// Write failures are cleared by the next successful write. A snapshot that could
    /// not be loaded is reported for the life of the ledger.
    #[must_use]
    pub fn persistence_error(&self) -> Option<&str> {
        self.persistence_error
            .as_deref()
            .or(self.open_error.as_deref())
    }

    async fn persist(&mut self, change: Change<'_>) {
        let result = match &self.persistence {
            Persistence::Ephemeral => Ok(()),
            Persistence::Snapshot(file) if self.snapshot_writes_blocked => Err(Error::Persistence {
                message: format!("refusing to overwrite unreadable snapshot {:?}", file.path()),
            }),
            Persistence::Snapshot(file) => file.save(&self.transactions, &self.rates),
            Persistence::Database(db) => match change {
                Change::Appended(tx) => insert_row(db, tx).await,
                Change::Updated(tx) => update_row(db, tx).await,
                // rates are not stored in the database
                Change::RatesChanged => return,
            },
        };
        self.record_persistence(result);
    }

    fn record_persistence(&mut self, result: Result<()>) {
        match result {
            Ok(()) => self.persistence_error = None,
            Err(e) => {
                error!("Ledger persistence failed, in-memory state kept: {e}");
                self.persistence_error = Some(e.to_string());
            }
        }
    }
}

async fn insert_row(db: &DatabaseConnection, tx: &Transaction) -> Result<()> {
    transaction_entity::ActiveModel::from(tx).insert(db).await?;
    Ok(())
}

async fn update_row(db: &DatabaseConnection, tx: &Transaction) -> Result<()> {
    let row = entities::Transaction::find()
        .filter(transaction_entity::Column::TransactionId.eq(tx.id.to_string()))
        .one(db)
        .await?
        .ok_or_else(|| Error::TransactionNotFound {
            id: tx.id.to_string(),
        })?;

    let mut active: transaction_entity::ActiveModel = row.into();
    active.status = Set(tx.status);
    active.processed_at = Set(tx.processed_at);
    active.description = Set(tx.description.clone());
    active.exchange_rate = Set(tx.exchange_rate);
    active.gateway_reference = Set(tx.gateway_reference.clone());
    active.failure_reason = Set(tx.failure_reason.clone());
    active.update(db).await?;
    Ok(())
}
