//! Sales repository contracts, SQLite implementation and write statements.
//!
//! # Responsibility
//! - Provide read-back and seeding APIs over `customers`, `invoices` and
//!   `items`.
//! - Own the SQL used by the sale write path so statement text stays inside
//!   the persistence boundary.
//!
//! # Invariants
//! - Write-path statements only run inside a [`TransactionScope`].
//! - Items are read back in insertion order (`items.id ASC`).

use crate::db::{DbError, GatewayResult, TransactionScope};
use crate::model::sale::{
    validate_customer_name, Customer, CustomerId, Invoice, InvoiceId, Item, SaleReceipt,
    SaleValidationError,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Creates one invoice for the customer matching `?1` and returns its id.
///
/// Yields zero rows when no customer matches.
pub const INSERT_INVOICE_FOR_CUSTOMER_SQL: &str = "INSERT INTO invoices (customer_id)
    SELECT id FROM customers WHERE name = ?1
    RETURNING id AS invoice_id;";

pub const INSERT_ITEM_SQL: &str = "INSERT INTO items (name, invoice_id) VALUES (?1, ?2);";

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Validation(SaleValidationError),
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted sale data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<SaleValidationError> for RepoError {
    fn from(value: SaleValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for customer seeding and sale read-back.
pub trait SaleRepository {
    fn create_customer(&self, name: &str) -> RepoResult<CustomerId>;
    fn find_customer_by_name(&self, name: &str) -> RepoResult<Option<Customer>>;
    fn get_invoice(&self, id: InvoiceId) -> RepoResult<Option<Invoice>>;
    fn list_items(&self, invoice_id: InvoiceId) -> RepoResult<Vec<Item>>;
    fn count_invoices(&self) -> RepoResult<u64>;
    fn count_items(&self) -> RepoResult<u64>;

    /// Loads an invoice with its items, or `None` when the invoice is absent.
    fn get_receipt(&self, id: InvoiceId) -> RepoResult<Option<SaleReceipt>> {
        let Some(invoice) = self.get_invoice(id)? else {
            return Ok(None);
        };
        let items = self.list_items(invoice.id)?;
        Ok(Some(SaleReceipt { invoice, items }))
    }
}

/// SQLite-backed sales repository.
pub struct SqliteSaleRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSaleRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SaleRepository for SqliteSaleRepository<'_> {
    fn create_customer(&self, name: &str) -> RepoResult<CustomerId> {
        let name = validate_customer_name(name)?;
        let id = self.conn.query_row(
            "INSERT INTO customers (name) VALUES (?1) RETURNING id;",
            [name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn find_customer_by_name(&self, name: &str) -> RepoResult<Option<Customer>> {
        let customer = self
            .conn
            .query_row(
                "SELECT id, name FROM customers WHERE name = ?1;",
                [name],
                |row| {
                    Ok(Customer {
                        id: row.get("id")?,
                        name: row.get("name")?,
                    })
                },
            )
            .optional()?;
        Ok(customer)
    }

    fn get_invoice(&self, id: InvoiceId) -> RepoResult<Option<Invoice>> {
        let invoice = self
            .conn
            .query_row(
                "SELECT id, customer_id, created_at FROM invoices WHERE id = ?1;",
                [id],
                |row| {
                    Ok(Invoice {
                        id: row.get("id")?,
                        customer_id: row.get("customer_id")?,
                        created_at: row.get("created_at")?,
                    })
                },
            )
            .optional()?;
        Ok(invoice)
    }

    fn list_items(&self, invoice_id: InvoiceId) -> RepoResult<Vec<Item>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, invoice_id, name
             FROM items
             WHERE invoice_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([invoice_id])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let item = Item {
                id: row.get("id")?,
                invoice_id: row.get("invoice_id")?,
                name: row.get("name")?,
            };
            if item.name.trim().is_empty() {
                return Err(RepoError::InvalidData(format!(
                    "blank item name for items.id {}",
                    item.id
                )));
            }
            items.push(item);
        }
        Ok(items)
    }

    fn count_invoices(&self) -> RepoResult<u64> {
        count_rows(self.conn, "invoices")
    }

    fn count_items(&self) -> RepoResult<u64> {
        count_rows(self.conn, "items")
    }
}

/// Inserts one invoice for the named customer inside `scope`.
///
/// Returns every id produced by the statement; callers decide what zero or
/// several matches mean.
pub fn insert_invoice_for_customer(
    scope: &mut TransactionScope<'_>,
    customer_name: &str,
) -> GatewayResult<Vec<InvoiceId>> {
    let rows = scope.execute(INSERT_INVOICE_FOR_CUSTOMER_SQL, [customer_name])?;
    rows.i64_column("invoice_id")
}

pub fn insert_item(
    scope: &mut TransactionScope<'_>,
    invoice_id: InvoiceId,
    name: &str,
) -> GatewayResult<()> {
    scope.execute(INSERT_ITEM_SQL, params![name, invoice_id])?;
    Ok(())
}

fn count_rows(conn: &Connection, table: &'static str) -> RepoResult<u64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}
