//! Dashboard activity feed entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use stockflow_core::{UserId, domain_id};
use stockflow_inventory::StockUpdate;
use stockflow_orders::OrderId;

domain_id!(
    /// Activity entry identifier.
    ActivityId
);

/// Activity type tag (stored as text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    OrderProcessed,
    OrderCreated,
    OrderStatusChanged,
    ProductCreated,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::OrderProcessed => "order_processed",
            ActivityType::OrderCreated => "order_created",
            ActivityType::OrderStatusChanged => "order_status_changed",
            ActivityType::ProductCreated => "product_created",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "order_processed" => Some(ActivityType::OrderProcessed),
            "order_created" => Some(ActivityType::OrderCreated),
            "order_status_changed" => Some(ActivityType::OrderStatusChanged),
            "product_created" => Some(ActivityType::ProductCreated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub activity_type: ActivityType,
    pub description: String,
    pub actor: Option<UserId>,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        activity_type: ActivityType,
        description: impl Into<String>,
        actor: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActivityId::generate(),
            activity_type,
            description: description.into(),
            actor,
            metadata: None,
            created_at,
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn order_processed(
        order_id: OrderId,
        order_number: &str,
        updates: &[StockUpdate],
        actor: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let units: i64 = updates.iter().map(|u| u.quantity).sum();
        Self::new(
            ActivityType::OrderProcessed,
            format!(
                "Order {order_number} processed: {units} units across {} lines",
                updates.len()
            ),
            actor,
            created_at,
        )
        .with_metadata(json!({
            "order_id": order_id,
            "order_number": order_number,
            "line_count": updates.len(),
            "units": units,
        }))
    }
}
