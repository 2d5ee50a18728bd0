//! Sale domain model: customers, invoices and their line items.
//!
//! # Responsibility
//! - Define the records produced and read by sale recording.
//! - Validate caller-supplied names before they reach storage.
//!
//! # Invariants
//! - Ids are surrogate integers assigned by the store on insert.
//! - An `Item` always belongs to exactly one `Invoice`.
//! - An `Invoice` always references an existing `Customer`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CustomerId = i64;
pub type InvoiceId = i64;
pub type ItemId = i64;

/// Buyer looked up by unique name. Never written by sale recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
}

/// One sale event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    /// Unix epoch milliseconds, set by the store.
    pub created_at: i64,
}

/// One line of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub invoice_id: InvoiceId,
    pub name: String,
}

/// Invoice together with its items in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReceipt {
    pub invoice: Invoice,
    pub items: Vec<Item>,
}

impl SaleReceipt {
    pub fn item_names(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleValidationError {
    BlankCustomerName,
}

impl Display for SaleValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankCustomerName => write!(f, "customer name must not be blank"),
        }
    }
}

impl Error for SaleValidationError {}

/// Rejects blank customer names; returns the name unchanged otherwise.
///
/// Names are matched exactly by the store, so no trimming is applied to the
/// returned value.
pub fn validate_customer_name(name: &str) -> Result<&str, SaleValidationError> {
    if name.trim().is_empty() {
        return Err(SaleValidationError::BlankCustomerName);
    }
    Ok(name)
}
