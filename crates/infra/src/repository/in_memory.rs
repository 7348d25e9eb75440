use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockflow_core::{ExpectedVersion, UserId};
use stockflow_inventory::{StockMovement, StockSnapshot};
use stockflow_orders::{OrderId, OrderRecord};
use stockflow_products::{Product, ProductId};

use super::{FulfillmentTx, MovementFilter, RepositoryError, StockRepository, check_version};
use crate::activity::Activity;

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, OrderRecord>,
    /// Append order is the insertion sequence.
    movements: Vec<StockMovement>,
    activities: Vec<Activity>,
}

/// In-memory repository.
///
/// A transaction holds the single state lock for its whole lifetime, so it
/// excludes every other transaction and read; that is stronger than the
/// per-row locks `begin` promises. Intended for tests/dev.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryStockRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Writes staged by an open transaction.
struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    stock: HashMap<ProductId, i64>,
    orders: HashMap<OrderId, OrderRecord>,
    movements: Vec<StockMovement>,
    activities: Vec<Activity>,
}

impl InMemoryTx {
    fn current_stock(&self, product_id: ProductId) -> Option<i64> {
        self.stock
            .get(&product_id)
            .copied()
            .or_else(|| self.guard.products.get(&product_id).map(|p| p.stock))
    }
}

#[async_trait]
impl FulfillmentTx for InMemoryTx {
    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        Ok(self
            .orders
            .get(&order_id)
            .or_else(|| self.guard.orders.get(&order_id))
            .cloned())
    }

    async fn get_product_stock(
        &mut self,
        product_id: ProductId,
    ) -> Result<Option<StockSnapshot>, RepositoryError> {
        let Some(product) = self.guard.products.get(&product_id) else {
            return Ok(None);
        };
        Ok(Some(StockSnapshot {
            product_id,
            product_name: product.name.clone(),
            stock: self.current_stock(product_id).unwrap_or(product.stock),
            reserved_stock: product.reserved_stock,
            low_stock_threshold: product.low_stock_threshold,
        }))
    }

    async fn decrement_product_stock(
        &mut self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<i64, RepositoryError> {
        let current = self
            .current_stock(product_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("product {product_id}")))?;

        let new_stock = current - quantity;
        if new_stock < 0 {
            return Err(RepositoryError::Conflict(format!(
                "product {product_id}: stock {current} cannot cover {quantity}"
            )));
        }

        self.stock.insert(product_id, new_stock);
        Ok(new_stock)
    }

    async fn append_movement(&mut self, movement: &StockMovement) -> Result<(), RepositoryError> {
        self.movements.push(movement.clone());
        Ok(())
    }

    async fn mark_order_processed(
        &mut self,
        order: &OrderRecord,
        expected_version: ExpectedVersion,
    ) -> Result<(), RepositoryError> {
        let stored = self
            .orders
            .get(&order.id)
            .or_else(|| self.guard.orders.get(&order.id))
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", order.id)))?;
        check_version(order.id, expected_version, stored.version)?;

        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn record_activity(&mut self, activity: &Activity) -> Result<(), RepositoryError> {
        self.activities.push(activity.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let InMemoryTx {
            mut guard,
            stock,
            orders,
            movements,
            activities,
        } = *self;

        let now = Utc::now();
        for (product_id, level) in stock {
            if let Some(product) = guard.products.get_mut(&product_id) {
                product.stock = level;
                product.updated_at = now;
            }
        }
        guard.orders.extend(orders);
        guard.movements.extend(movements);
        guard.activities.extend(activities);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl StockRepository for InMemoryStockRepository {
    async fn begin(
        &self,
        _order_id: OrderId,
        _product_ids: &[ProductId],
    ) -> Result<Box<dyn FulfillmentTx>, RepositoryError> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(InMemoryTx {
            guard,
            stock: HashMap::new(),
            orders: HashMap::new(),
            movements: Vec::new(),
            activities: Vec::new(),
        }))
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.state.lock().await.products.get(&product_id).cloned())
    }

    async fn insert_product(
        &self,
        product: &Product,
        created_by: Option<UserId>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.products.contains_key(&product.id) {
            return Err(RepositoryError::Conflict(format!("product {} already exists", product.id)));
        }
        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(RepositoryError::Conflict(format!("sku '{}' already exists", product.sku)));
        }

        state.products.insert(product.id, product.clone());
        if product.stock > 0 {
            state.movements.push(StockMovement::initial(
                product.id,
                product.stock,
                created_by,
                product.created_at,
            ));
        }
        Ok(())
    }

    async fn list_orders(&self) -> Result<Vec<OrderRecord>, RepositoryError> {
        let state = self.state.lock().await;
        let mut orders: Vec<OrderRecord> = state.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn insert_order(&self, order: &OrderRecord) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.id) {
            return Err(RepositoryError::Conflict(format!("order {} already exists", order.id)));
        }
        if state.orders.values().any(|o| o.order_number == order.order_number) {
            return Err(RepositoryError::Conflict(format!(
                "order number '{}' already exists",
                order.order_number
            )));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn save_order(
        &self,
        order: &OrderRecord,
        expected_version: ExpectedVersion,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state
            .orders
            .get(&order.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", order.id)))?;
        check_version(order.id, expected_version, stored.version)?;
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn list_movements(
        &self,
        filter: MovementFilter,
    ) -> Result<Vec<StockMovement>, RepositoryError> {
        let state = self.state.lock().await;
        let mut movements: Vec<StockMovement> = state
            .movements
            .iter()
            .rev()
            .filter(|m| filter.product_id.is_none_or(|p| m.product_id == p))
            .cloned()
            .collect();
        // Stable: equal timestamps stay newest-inserted first.
        movements.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            movements.truncate(limit);
        }
        Ok(movements)
    }

    async fn list_activities(&self, limit: Option<usize>) -> Result<Vec<Activity>, RepositoryError> {
        let state = self.state.lock().await;
        let mut activities: Vec<Activity> = state.activities.iter().rev().cloned().collect();
        activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            activities.truncate(limit);
        }
        Ok(activities)
    }

    async fn record_activity(&self, activity: &Activity) -> Result<(), RepositoryError> {
        self.state.lock().await.activities.push(activity.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_products::NewProduct;

    fn product(name: &str, sku: &str, stock: i64) -> Product {
        NewProduct::new(name, sku, stock).into_product(Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let repo = InMemoryStockRepository::new();
        let p = product("Widget", "W-1", 10);
        repo.insert_product(&p, None).await.unwrap();

        let mut tx = repo.begin(OrderId::generate(), &[p.id]).await.unwrap();
        assert_eq!(tx.decrement_product_stock(p.id, 4).await.unwrap(), 6);
        assert_eq!(tx.get_product_stock(p.id).await.unwrap().unwrap().stock, 6);
        tx.rollback().await.unwrap();

        assert_eq!(repo.get_product(p.id).await.unwrap().unwrap().stock, 10);
    }

    #[tokio::test]
    async fn dropped_transaction_releases_lock_without_writing() {
        let repo = InMemoryStockRepository::new();
        let p = product("Widget", "W-1", 10);
        repo.insert_product(&p, None).await.unwrap();

        {
            let mut tx = repo.begin(OrderId::generate(), &[p.id]).await.unwrap();
            tx.decrement_product_stock(p.id, 1).await.unwrap();
        }

        assert_eq!(repo.get_product(p.id).await.unwrap().unwrap().stock, 10);
    }

    #[tokio::test]
    async fn decrement_never_goes_negative() {
        let repo = InMemoryStockRepository::new();
        let p = product("Widget", "W-1", 3);
        repo.insert_product(&p, None).await.unwrap();

        let mut tx = repo.begin(OrderId::generate(), &[p.id]).await.unwrap();
        let err = tx.decrement_product_stock(p.id, 4).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_sku_is_a_conflict() {
        let repo = InMemoryStockRepository::new();
        repo.insert_product(&product("A", "SKU", 0), None).await.unwrap();
        let err = repo
            .insert_product(&product("B", "SKU", 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn opening_stock_is_ledgered_and_products_sort_by_name() {
        let repo = InMemoryStockRepository::new();
        let zed = product("Zed", "Z", 5);
        let alpha = product("Alpha", "A", 0);
        repo.insert_product(&zed, None).await.unwrap();
        repo.insert_product(&alpha, None).await.unwrap();

        let names: Vec<String> = repo
            .list_products()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Zed"]);

        let ledger = repo.list_movements(MovementFilter::default()).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!((ledger[0].product_id, ledger[0].new_stock), (zed.id, 5));
    }
}
