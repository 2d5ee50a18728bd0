//! Sale recording use-case.
//!
//! # Responsibility
//! - Record one sale (invoice plus ordered items) as a single unit of work.
//! - Translate gateway failures into the sale error taxonomy.
//!
//! # Invariants
//! - Every call either commits the invoice with all of its items or leaves
//!   the store unchanged.
//! - Item inserts run in caller order and stop at the first failure.
//! - Nothing is retried here. Repeating a call records a second invoice.
//! - Customer and item names never appear in log events.

use crate::db::{GatewayError, StorageGateway};
use crate::model::sale::{validate_customer_name, InvoiceId, SaleValidationError};
use crate::repo::sale_repo::{insert_invoice_for_customer, insert_item};
use log::{error, info, warn};
use std::borrow::{Borrow, BorrowMut};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

pub type SaleResult<T> = Result<T, SaleError>;

/// Progress point of one `record_sale` call, reported when a deadline trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleStage {
    /// No transaction opened yet.
    Idle,
    /// Transaction open, invoice not inserted.
    TransactionOpen,
    /// Invoice inserted, items in progress.
    InvoiceInserted,
    /// All items inserted, commit pending.
    ItemsInserted,
}

impl SaleStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::TransactionOpen => "transaction_open",
            Self::InvoiceInserted => "invoice_inserted",
            Self::ItemsInserted => "items_inserted",
        }
    }
}

#[derive(Debug)]
pub enum SaleError {
    /// Caller input rejected before any transaction was opened.
    InvalidInput(SaleValidationError),
    /// Empty item list while `SalePolicy::allow_empty_sales` is off.
    EmptySale,
    /// Lookup found no matching row; the payload names the entity.
    NotFound(&'static str),
    /// Customer name matched several rows; no invoice was kept.
    AmbiguousCustomer { matches: usize },
    /// Session unavailable or lost. The whole call may be retried.
    Connection(rusqlite::Error),
    /// Statement rejected. `item_position` is set for item inserts.
    Query {
        source: rusqlite::Error,
        item_position: Option<usize>,
    },
    /// Commit failed. Treat the sale as not recorded.
    Commit(rusqlite::Error),
    /// Rollback failed after `cause`.
    Rollback {
        source: rusqlite::Error,
        cause: Option<String>,
    },
    DeadlineExceeded { stage: SaleStage },
}

impl SaleError {
    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::EmptySale => "empty_sale",
            Self::NotFound(_) => "not_found",
            Self::AmbiguousCustomer { .. } => "ambiguous_customer",
            Self::Connection(_) => "connection_error",
            Self::Query { .. } => "query_error",
            Self::Commit(_) => "commit_error",
            Self::Rollback { .. } => "rollback_error",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
        }
    }

    /// Whether retrying the whole call from scratch can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Commit(_) | Self::DeadlineExceeded { .. }
        )
    }

    fn at_item(self, position: usize) -> Self {
        match self {
            Self::Query { source, .. } => Self::Query {
                source,
                item_position: Some(position),
            },
            other => other,
        }
    }
}

impl Display for SaleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(err) => write!(f, "invalid sale input: {err}"),
            Self::EmptySale => write!(f, "sale has no items and empty sales are disabled"),
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::AmbiguousCustomer { matches } => {
                write!(f, "customer name matched {matches} rows")
            }
            Self::Connection(err) => write!(f, "storage connection failed: {err}"),
            Self::Query {
                source,
                item_position: Some(position),
            } => write!(f, "item {position} rejected: {source}"),
            Self::Query {
                source,
                item_position: None,
            } => write!(f, "statement failed: {source}"),
            Self::Commit(err) => write!(f, "commit failed, sale not recorded: {err}"),
            Self::Rollback {
                source,
                cause: Some(cause),
            } => write!(f, "rollback failed: {source} (after: {cause})"),
            Self::Rollback {
                source,
                cause: None,
            } => write!(f, "rollback failed: {source}"),
            Self::DeadlineExceeded { stage } => {
                write!(f, "deadline exceeded at stage {}", stage.as_str())
            }
        }
    }
}

impl Error for SaleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInput(err) => Some(err),
            Self::Connection(err) | Self::Commit(err) => Some(err),
            Self::Query { source, .. } | Self::Rollback { source, .. } => Some(source),
            Self::EmptySale
            | Self::NotFound(_)
            | Self::AmbiguousCustomer { .. }
            | Self::DeadlineExceeded { .. } => None,
        }
    }
}

impl From<GatewayError> for SaleError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::Connection(err) => Self::Connection(err),
            GatewayError::Query(err) => Self::Query {
                source: err,
                item_position: None,
            },
            GatewayError::Commit(err) => Self::Commit(err),
            GatewayError::Rollback { source, cause } => Self::Rollback { source, cause },
        }
    }
}

/// Business policy knobs for sale recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalePolicy {
    /// Record invoices with no items (`true`) or reject them up front.
    pub allow_empty_sales: bool,
}

impl Default for SalePolicy {
    fn default() -> Self {
        Self {
            allow_empty_sales: true,
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOptions {
    /// Checked before `BEGIN`, before every statement and before `COMMIT`.
    pub deadline: Option<Instant>,
}

impl RecordOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    fn check(&self, stage: SaleStage) -> SaleResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(SaleError::DeadlineExceeded { stage })
            }
            _ => Ok(()),
        }
    }
}

/// Records sales through an injected [`StorageGateway`].
///
/// `G` is either an owned gateway or `&mut StorageGateway`.
pub struct SaleRecorder<G = StorageGateway> {
    gateway: G,
    policy: SalePolicy,
}

impl<G: BorrowMut<StorageGateway>> SaleRecorder<G> {
    pub fn new(gateway: G, policy: SalePolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> SalePolicy {
        self.policy
    }

    pub fn gateway(&self) -> &StorageGateway {
        self.gateway.borrow()
    }

    pub fn into_gateway(self) -> G {
        self.gateway
    }

    /// Records one sale and returns the new invoice id.
    ///
    /// # Contract
    /// - `customer` must be non-blank and match exactly one customer.
    /// - `items` are inserted in order; empty input follows `SalePolicy`.
    /// - On `Ok`, the invoice and all items are durable. On `Err`, nothing
    ///   from this call is.
    pub fn record_sale<S: AsRef<str>>(
        &mut self,
        customer: &str,
        items: &[S],
    ) -> SaleResult<InvoiceId> {
        self.record_sale_with(customer, items, &RecordOptions::default())
    }

    /// Same as [`record_sale`](Self::record_sale) with per-call options.
    pub fn record_sale_with<S: AsRef<str>>(
        &mut self,
        customer: &str,
        items: &[S],
        options: &RecordOptions,
    ) -> SaleResult<InvoiceId> {
        let started_at = Instant::now();
        info!(
            "event=record_sale module=service status=start item_count={}",
            items.len()
        );

        let result = self.record(customer, items, options);
        match &result {
            Ok(invoice_id) => info!(
                "event=record_sale module=service status=ok invoice_id={} item_count={} duration_ms={}",
                invoice_id,
                items.len(),
                started_at.elapsed().as_millis()
            ),
            Err(
                err @ (SaleError::InvalidInput(_)
                | SaleError::EmptySale
                | SaleError::NotFound(_)
                | SaleError::AmbiguousCustomer { .. }),
            ) => warn!(
                "event=record_sale module=service status=rejected error_code={} duration_ms={}",
                err.code(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=record_sale module=service status=error error_code={} duration_ms={} error={}",
                err.code(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn record<S: AsRef<str>>(
        &mut self,
        customer: &str,
        items: &[S],
        options: &RecordOptions,
    ) -> SaleResult<InvoiceId> {
        let customer = validate_customer_name(customer).map_err(SaleError::InvalidInput)?;
        if items.is_empty() {
            if !self.policy.allow_empty_sales {
                return Err(SaleError::EmptySale);
            }
            warn!("event=record_sale module=service status=empty_items");
        }
        options.check(SaleStage::Idle)?;

        self.gateway
            .borrow_mut()
            .with_transaction(|scope| -> SaleResult<InvoiceId> {
                options.check(SaleStage::TransactionOpen)?;
                let invoice_id = match insert_invoice_for_customer(scope, customer)?.as_slice() {
                    [] => return Err(SaleError::NotFound("customer")),
                    [invoice_id] => *invoice_id,
                    several => {
                        return Err(SaleError::AmbiguousCustomer {
                            matches: several.len(),
                        })
                    }
                };

                for (position, item) in items.iter().enumerate() {
                    options.check(SaleStage::InvoiceInserted)?;
                    insert_item(scope, invoice_id, item.as_ref())
                        .map_err(|err| SaleError::from(err).at_item(position))?;
                }

                options.check(SaleStage::ItemsInserted)?;
                Ok(invoice_id)
            })
    }
}
