//! Persistence contract for products, orders, the stock movement ledger and
//! the activity feed.
//!
//! ## Transactions
//!
//! [`StockRepository::begin`] opens a transaction that holds exclusive locks
//! on the order row and every listed product row until it is committed or
//! rolled back. Writes made through the [`FulfillmentTx`] become visible to
//! other callers only on [`FulfillmentTx::commit`]; dropping a transaction
//! without committing discards them.
//!
//! ## Backends
//!
//! - [`InMemoryStockRepository`]: tests and single-process deployments
//! - [`PostgresStockRepository`]: `sqlx` with `SELECT ... FOR UPDATE`

mod in_memory;
mod postgres;

pub use in_memory::InMemoryStockRepository;
pub use postgres::PostgresStockRepository;

use async_trait::async_trait;
use thiserror::Error;

use stockflow_core::{ExpectedVersion, UserId};
use stockflow_inventory::{StockMovement, StockSnapshot};
use stockflow_orders::{OrderId, OrderRecord};
use stockflow_products::{Product, ProductId};

use crate::activity::Activity;

/// Repository operation error.
///
/// These are infrastructure failures; business outcomes such as insufficient
/// stock never surface here.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Duplicate key or stale version.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A row the operation requires does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Connection, query or driver failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Ledger read filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub limit: Option<usize>,
}

impl MovementFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            limit: None,
        }
    }
}

/// Writes and locked reads performed inside one stock reduction transaction.
#[async_trait]
pub trait FulfillmentTx: Send {
    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>, RepositoryError>;

    /// Stock levels of a locked product, `None` if it does not exist.
    async fn get_product_stock(
        &mut self,
        product_id: ProductId,
    ) -> Result<Option<StockSnapshot>, RepositoryError>;

    /// Subtract `quantity` from on-hand stock, returning the new level.
    ///
    /// Fails with [`RepositoryError::Conflict`] rather than go negative.
    async fn decrement_product_stock(
        &mut self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<i64, RepositoryError>;

    async fn append_movement(&mut self, movement: &StockMovement) -> Result<(), RepositoryError>;

    /// Persist an order whose `processed_at` was just set.
    ///
    /// `expected_version` is the version the order had when it was read.
    async fn mark_order_processed(
        &mut self,
        order: &OrderRecord,
        expected_version: ExpectedVersion,
    ) -> Result<(), RepositoryError>;

    async fn record_activity(&mut self, activity: &Activity) -> Result<(), RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait StockRepository: Send + Sync {
    /// Open a transaction locking `order_id` and `product_ids`.
    ///
    /// Product rows are locked in ascending id order.
    async fn begin(
        &self,
        order_id: OrderId,
        product_ids: &[ProductId],
    ) -> Result<Box<dyn FulfillmentTx>, RepositoryError>;

    /// Products ordered by name.
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError>;

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Insert a product. Opening stock is recorded as an `in` movement.
    async fn insert_product(
        &self,
        product: &Product,
        created_by: Option<UserId>,
    ) -> Result<(), RepositoryError>;

    /// Orders, newest `order_date` first.
    async fn list_orders(&self) -> Result<Vec<OrderRecord>, RepositoryError>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>, RepositoryError>;

    /// Insert a new order. Order ids and numbers are unique.
    async fn insert_order(&self, order: &OrderRecord) -> Result<(), RepositoryError>;

    /// Replace an order if its stored version matches `expected_version`.
    async fn save_order(
        &self,
        order: &OrderRecord,
        expected_version: ExpectedVersion,
    ) -> Result<(), RepositoryError>;

    /// Ledger entries, newest first (ties broken by insertion order).
    async fn list_movements(
        &self,
        filter: MovementFilter,
    ) -> Result<Vec<StockMovement>, RepositoryError>;

    /// Activity feed, newest first.
    async fn list_activities(&self, limit: Option<usize>) -> Result<Vec<Activity>, RepositoryError>;

    async fn record_activity(&self, activity: &Activity) -> Result<(), RepositoryError>;
}

/// Version check shared by the adapters.
pub(crate) fn check_version(
    order_id: OrderId,
    expected: ExpectedVersion,
    actual: u64,
) -> Result<(), RepositoryError> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(RepositoryError::Conflict(format!(
            "order {order_id}: expected version {expected:?}, found {actual}"
        )))
    }
}
