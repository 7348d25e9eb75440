//! Result of processing an order's stock.
//!
//! Insufficient stock is an expected business outcome carried as data, not
//! an error. On the wire the outcome is tagged by a `success` flag:
//!
//! ```text
//! {"success": true,  "stock_updates": [...]}
//! {"success": false, "insufficient_items": [...]}
//! {"success": true,  "stock_updates": [], "processed_at": "..."}   // already processed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_products::ProductId;

use crate::movement::MovementId;

/// Stock change applied to one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub movement_id: MovementId,
}

/// A line that could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub requested: i64,
    pub available: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "OutcomeWire", try_from = "OutcomeWire")]
pub enum ProcessOrderOutcome {
    /// Stock deducted for every line; one update per line in input order.
    Processed { stock_updates: Vec<StockUpdate> },
    /// Nothing changed; every offending line in input order.
    InsufficientStock { insufficient_items: Vec<InsufficientItem> },
    /// The order's stock was already deducted by an earlier call.
    AlreadyProcessed { processed_at: DateTime<Utc> },
}

impl ProcessOrderOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ProcessOrderOutcome::InsufficientStock { .. })
    }
}

#[derive(Serialize, Deserialize)]
struct OutcomeWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stock_updates: Option<Vec<StockUpdate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    insufficient_items: Option<Vec<InsufficientItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processed_at: Option<DateTime<Utc>>,
}

impl From<ProcessOrderOutcome> for OutcomeWire {
    fn from(value: ProcessOrderOutcome) -> Self {
        match value {
            ProcessOrderOutcome::Processed { stock_updates } => OutcomeWire {
                success: true,
                stock_updates: Some(stock_updates),
                insufficient_items: None,
                processed_at: None,
            },
            ProcessOrderOutcome::InsufficientStock { insufficient_items } => OutcomeWire {
                success: false,
                stock_updates: None,
                insufficient_items: Some(insufficient_items),
                processed_at: None,
            },
            ProcessOrderOutcome::AlreadyProcessed { processed_at } => OutcomeWire {
                success: true,
                stock_updates: Some(Vec::new()),
                insufficient_items: None,
                processed_at: Some(processed_at),
            },
        }
    }
}

impl TryFrom<OutcomeWire> for ProcessOrderOutcome {
    type Error = String;

    fn try_from(wire: OutcomeWire) -> Result<Self, Self::Error> {
        match (wire.success, wire.processed_at) {
            (true, Some(processed_at)) => Ok(ProcessOrderOutcome::AlreadyProcessed { processed_at }),
            (true, None) => Ok(ProcessOrderOutcome::Processed {
                stock_updates: wire.stock_updates.unwrap_or_default(),
            }),
            (false, _) => wire
                .insufficient_items
                .map(|insufficient_items| ProcessOrderOutcome::InsufficientStock { insufficient_items })
                .ok_or_else(|| "failed outcome without insufficient_items".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shortage() -> InsufficientItem {
        InsufficientItem {
            product_id: ProductId::generate(),
            product_name: "Bolt".to_string(),
            requested: 5,
            available: 2,
            reason: "Insufficient stock for Bolt: requested 5, available 2".to_string(),
        }
    }

    #[test]
    fn insufficient_outcome_is_tagged_unsuccessful() {
        let item = shortage();
        let outcome = ProcessOrderOutcome::InsufficientStock {
            insufficient_items: vec![item.clone()],
        };
        assert!(!outcome.is_success());

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["insufficient_items"][0]["requested"], json!(5));
        assert_eq!(value["insufficient_items"][0]["product_id"], json!(item.product_id.to_string()));
        assert!(value.get("stock_updates").is_none());
    }

    #[test]
    fn processed_outcome_carries_updates() {
        let outcome = ProcessOrderOutcome::Processed {
            stock_updates: vec![StockUpdate {
                product_id: ProductId::generate(),
                product_name: "Nut".to_string(),
                quantity: 4,
                previous_stock: 10,
                new_stock: 6,
                movement_id: MovementId::generate(),
            }],
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["stock_updates"][0]["new_stock"], json!(6));
        assert!(value.get("processed_at").is_none());
    }

    #[test]
    fn already_processed_is_distinguishable_on_the_wire() {
        let outcome = ProcessOrderOutcome::AlreadyProcessed {
            processed_at: Utc::now(),
        };
        let text = serde_json::to_string(&outcome).unwrap();
        let back: ProcessOrderOutcome = serde_json::from_str(&text).unwrap();
        assert_eq!(back, outcome);
        assert!(back.is_success());
    }

    #[test]
    fn failure_without_items_does_not_decode() {
        let err = serde_json::from_value::<ProcessOrderOutcome>(json!({"success": false}));
        assert!(err.is_err());
    }
}
