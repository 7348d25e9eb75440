//! Planning the stock deduction for an order.
//!
//! Planning is pure: given the locked stock levels it decides whether every
//! line fits, and if so which decrements to persist. Lines for the same
//! product consume stock cumulatively in input order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use stockflow_core::DomainError;
use stockflow_orders::OrderId;
use stockflow_products::{ProductId, available};

use crate::outcome::InsufficientItem;

/// One line of a processing request, resolved by the caller from the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
    pub total_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOrderRequest {
    pub order_id: OrderId,
    pub items: Vec<LineItemRequest>,
}

impl ProcessOrderRequest {
    pub fn new(order_id: OrderId, items: Vec<LineItemRequest>) -> Self {
        Self { order_id, items }
    }

    /// Shape checks that need no stored state.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::validation("items cannot be empty"));
        }
        for (idx, item) in self.items.iter().enumerate() {
            if item.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "item {idx}: quantity must be positive"
                )));
            }
            let expected = (item.quantity as u64).checked_mul(item.unit_price);
            if expected != Some(item.total_price) {
                return Err(DomainError::validation(format!(
                    "item {idx}: total_price must equal quantity * unit_price"
                )));
            }
        }
        Ok(())
    }

    /// Distinct product ids in ascending order (the row lock order).
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self.items.iter().map(|i| i.product_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Stock levels of a product as read under lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub product_id: ProductId,
    pub product_name: String,
    pub stock: i64,
    pub reserved_stock: Option<i64>,
    pub low_stock_threshold: i64,
}

impl StockSnapshot {
    pub fn available(&self) -> i64 {
        available(self.stock, self.reserved_stock)
    }
}

/// A decrement that will be persisted with one `out` movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDecrement {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub low_stock_threshold: i64,
}

impl PlannedDecrement {
    pub fn leaves_low_stock(&self) -> bool {
        self.new_stock <= self.low_stock_threshold
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReductionPlan {
    /// Every line fits; decrements in input order.
    Apply(Vec<PlannedDecrement>),
    /// At least one line does not fit; every offending line in input order.
    Reject(Vec<InsufficientItem>),
}

/// Decide the outcome of deducting `items` from the given stock levels.
///
/// A line referencing a product absent from `snapshots` is reported as
/// insufficient with zero availability.
pub fn plan_reduction(
    items: &[LineItemRequest],
    snapshots: &HashMap<ProductId, StockSnapshot>,
) -> ReductionPlan {
    let mut consumed: HashMap<ProductId, i64> = HashMap::new();
    let mut decrements = Vec::with_capacity(items.len());
    let mut insufficient = Vec::new();

    for line in items {
        let Some(snapshot) = snapshots.get(&line.product_id) else {
            insufficient.push(InsufficientItem {
                product_id: line.product_id,
                product_name: String::new(),
                requested: line.quantity,
                available: 0,
                reason: format!("Product {} not found", line.product_id),
            });
            continue;
        };

        let already = consumed.get(&line.product_id).copied().unwrap_or(0);
        let remaining = (snapshot.available() - already).max(0);

        if line.quantity > remaining {
            insufficient.push(InsufficientItem {
                product_id: line.product_id,
                product_name: snapshot.product_name.clone(),
                requested: line.quantity,
                available: remaining,
                reason: format!(
                    "Insufficient stock for {}: requested {}, available {}",
                    snapshot.product_name, line.quantity, remaining
                ),
            });
            continue;
        }

        let previous_stock = snapshot.stock - already;
        consumed.insert(line.product_id, already + line.quantity);
        decrements.push(PlannedDecrement {
            product_id: line.product_id,
            product_name: snapshot.product_name.clone(),
            quantity: line.quantity,
            previous_stock,
            new_stock: previous_stock - line.quantity,
            low_stock_threshold: snapshot.low_stock_threshold,
        });
    }

    if insufficient.is_empty() {
        ReductionPlan::Apply(decrements)
    } else {
        ReductionPlan::Reject(insufficient)
    }
}
