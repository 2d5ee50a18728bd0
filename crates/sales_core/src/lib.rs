//! Core sale recording logic.
//! This crate owns the transactional write path and its storage schema.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, StoreConfig};
pub use db::{GatewayError, GatewayResult, ResultRows, StorageGateway, TransactionScope};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::sale::{
    Customer, CustomerId, Invoice, InvoiceId, Item, ItemId, SaleReceipt, SaleValidationError,
};
pub use repo::sale_repo::{RepoError, RepoResult, SaleRepository, SqliteSaleRepository};
pub use service::sale_recorder::{
    RecordOptions, SaleError, SalePolicy, SaleRecorder, SaleResult, SaleStage,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
