use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::UserId;
use stockflow_events::Event;
use stockflow_orders::OrderId;
use stockflow_products::ProductId;

use crate::outcome::StockUpdate;

/// Event: OrderFulfilled, published as `inventory.order.processed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFulfilled {
    pub order_id: OrderId,
    pub order_number: String,
    pub stock_updates: Vec<StockUpdate>,
    pub processed_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LowStockDetected.
///
/// Emitted when a deduction leaves a product at or below its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockDetected {
    pub product_id: ProductId,
    pub product_name: String,
    pub stock: i64,
    pub low_stock_threshold: i64,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    OrderFulfilled(OrderFulfilled),
    LowStockDetected(LowStockDetected),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::OrderFulfilled(_) => "inventory.order.processed",
            InventoryEvent::LowStockDetected(_) => "inventory.product.low_stock",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::OrderFulfilled(e) => e.occurred_at,
            InventoryEvent::LowStockDetected(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_are_namespaced() {
        let now = Utc::now();
        let processed = InventoryEvent::OrderFulfilled(OrderFulfilled {
            order_id: OrderId::generate(),
            order_number: "PO-1".to_string(),
            stock_updates: vec![],
            processed_by: None,
            occurred_at: now,
        });
        assert_eq!(processed.event_type(), "inventory.order.processed");
        assert_eq!(processed.occurred_at(), now);

        let low = InventoryEvent::LowStockDetected(LowStockDetected {
            product_id: ProductId::generate(),
            product_name: "Bolt".to_string(),
            stock: 1,
            low_stock_threshold: 5,
            order_id: OrderId::generate(),
            occurred_at: now,
        });
        assert_eq!(low.event_type(), "inventory.product.low_stock");
    }

    #[test]
    fn fulfilled_event_is_tagged_with_its_payload_name() {
        let event = InventoryEvent::OrderFulfilled(OrderFulfilled {
            order_id: OrderId::generate(),
            order_number: "PO-2".to_string(),
            stock_updates: vec![],
            processed_by: None,
            occurred_at: Utc::now(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("OrderFulfilled").is_some());
    }
}
