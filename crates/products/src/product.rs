use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, Entity, domain_id};

domain_id!(
    /// Product identifier.
    ProductId
);

domain_id!(
    /// Supplier identifier (weak reference; suppliers live outside this workspace).
    SupplierId
);

domain_id!(
    /// Category identifier (weak reference).
    CategoryId
);

/// Coarse stock classification used by dashboards and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    Low,
    InStock,
    Overstocked,
}

/// Catalog product.
///
/// Prices are in the smallest currency unit (e.g. cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    /// External code (barcode / supplier reference).
    pub code: Option<String>,
    pub price: u64,
    pub cost: u64,
    /// On-hand quantity. Never negative.
    pub stock: i64,
    pub low_stock_threshold: i64,
    pub reserved_stock: Option<i64>,
    pub max_stock: Option<i64>,
    pub reorder_point: Option<i64>,
    pub category_id: Option<CategoryId>,
    pub supplier_id: Option<SupplierId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Product {
    /// Quantity that can be committed to new demand: on-hand minus reservations.
    pub fn available_stock(&self) -> i64 {
        available(self.stock, self.reserved_stock)
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.low_stock_threshold
    }

    pub fn needs_reorder(&self) -> bool {
        self.reorder_point.is_some_and(|p| self.stock <= p)
    }

    pub fn can_fulfil(&self, quantity: i64) -> bool {
        quantity <= self.available_stock()
    }

    pub fn stock_status(&self) -> StockStatus {
        if self.stock <= 0 {
            StockStatus::OutOfStock
        } else if self.is_low_stock() {
            StockStatus::Low
        } else if self.max_stock.is_some_and(|max| self.stock > max) {
            StockStatus::Overstocked
        } else {
            StockStatus::InStock
        }
    }
}

/// Availability rule shared with the persistence layer, which reads raw
/// `(stock, reserved_stock)` columns without materializing a full product.
pub fn available(stock: i64, reserved_stock: Option<i64>) -> i64 {
    (stock - reserved_stock.unwrap_or(0)).max(0)
}

/// Input for creating a product through catalog management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub price: u64,
    #[serde(default)]
    pub cost: u64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub low_stock_threshold: i64,
    #[serde(default)]
    pub reserved_stock: Option<i64>,
    #[serde(default)]
    pub max_stock: Option<i64>,
    #[serde(default)]
    pub reorder_point: Option<i64>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub supplier_id: Option<SupplierId>,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, sku: impl Into<String>, stock: i64) -> Self {
        Self {
            name: name.into(),
            sku: sku.into(),
            code: None,
            price: 0,
            cost: 0,
            stock,
            low_stock_threshold: 0,
            reserved_stock: None,
            max_stock: None,
            reorder_point: None,
            category_id: None,
            supplier_id: None,
        }
    }

    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    pub fn with_reserved(mut self, reserved: i64) -> Self {
        self.reserved_stock = Some(reserved);
        self
    }

    pub fn with_price(mut self, price: u64, cost: u64) -> Self {
        self.price = price;
        self.cost = cost;
        self
    }

    /// Validate and turn the draft into a product with a fresh id.
    pub fn into_product(self, now: DateTime<Utc>) -> Result<Product, DomainError> {
        self.into_product_with_id(ProductId::generate(), now)
    }

    pub fn into_product_with_id(
        self,
        id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<Product, DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if self.stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }
        if self.low_stock_threshold < 0 {
            return Err(DomainError::validation("low_stock_threshold cannot be negative"));
        }
        for (field, value) in [
            ("reserved_stock", self.reserved_stock),
            ("max_stock", self.max_stock),
            ("reorder_point", self.reorder_point),
        ] {
            if value.is_some_and(|v| v < 0) {
                return Err(DomainError::validation(format!("{field} cannot be negative")));
            }
        }

        Ok(Product {
            id,
            name: self.name.trim().to_string(),
            sku: self.sku.trim().to_string(),
            code: self.code,
            price: self.price,
            cost: self.cost,
            stock: self.stock,
            low_stock_threshold: self.low_stock_threshold,
            reserved_stock: self.reserved_stock,
            max_stock: self.max_stock,
            reorder_point: self.reorder_point,
            category_id: self.category_id,
            supplier_id: self.supplier_id,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product(stock: i64) -> Product {
        NewProduct::new("Widget", "WID-1", stock)
            .with_threshold(5)
            .into_product(Utc::now())
            .unwrap()
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = NewProduct::new("   ", "SKU", 1).into_product(Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::validation("name cannot be empty"));
    }

    #[test]
    fn negative_stock_is_rejected() {
        let err = NewProduct::new("Widget", "SKU", -1)
            .into_product(Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("stock")));
    }

    #[test]
    fn negative_optional_levels_are_rejected() {
        let mut draft = NewProduct::new("Widget", "SKU", 3);
        draft.max_stock = Some(-4);
        let err = draft.into_product(Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("max_stock")));
    }

    #[test]
    fn reserved_stock_reduces_availability() {
        let mut p = product(10);
        assert_eq!(p.available_stock(), 10);

        p.reserved_stock = Some(3);
        assert_eq!(p.available_stock(), 7);
        assert!(p.can_fulfil(7));
        assert!(!p.can_fulfil(8));
    }

    #[test]
    fn over_reserved_product_has_zero_availability() {
        let mut p = product(2);
        p.reserved_stock = Some(5);
        assert_eq!(p.available_stock(), 0);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(product(5).is_low_stock());
        assert!(!product(6).is_low_stock());
    }

    #[test]
    fn stock_status_classification() {
        assert_eq!(product(0).stock_status(), StockStatus::OutOfStock);
        assert_eq!(product(4).stock_status(), StockStatus::Low);
        assert_eq!(product(50).stock_status(), StockStatus::InStock);

        let mut p = product(50);
        p.max_stock = Some(40);
        assert_eq!(p.stock_status(), StockStatus::Overstocked);
    }

    #[test]
    fn reorder_point_is_optional() {
        let mut p = product(8);
        assert!(!p.needs_reorder());
        p.reorder_point = Some(10);
        assert!(p.needs_reorder());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Availability is never negative and never exceeds on-hand stock.
        #[test]
        fn availability_is_bounded(stock in 0i64..1_000_000, reserved in proptest::option::of(0i64..2_000_000)) {
            let a = available(stock, reserved);
            prop_assert!(a >= 0);
            prop_assert!(a <= stock);
        }
    }
}
