use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use stockflow_core::{DomainError, UserId};
use stockflow_orders::{CreateOrder, OrderId, OrderItem};
use stockflow_products::{Product, ProductId, SupplierId};

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub order_number: String,
    #[serde(default)]
    pub supplier_id: Option<SupplierId>,
    pub items: Vec<OrderLineRequest>,
    /// Defaults to now.
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expected_delivery: Option<DateTime<Utc>>,
}

impl CreateOrderRequest {
    pub fn into_command(
        self,
        order_id: OrderId,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<CreateOrder, DomainError> {
        let items = self
            .items
            .into_iter()
            .map(|l| OrderItem::new(l.product_id, l.quantity, l.unit_price))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CreateOrder {
            order_id,
            order_number: self.order_number,
            supplier_id: self.supplier_id,
            items,
            order_date: self.order_date.unwrap_or(now),
            expected_delivery: self.expected_delivery,
            created_by,
            occurred_at: now,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementsQuery {
    pub product_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivitiesQuery {
    pub limit: Option<usize>,
}

/// Product row plus the derived fields dashboards display.
pub fn product_to_json(p: &Product) -> JsonValue {
    let mut value = json!(p);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("available_stock".to_string(), json!(p.available_stock()));
        obj.insert("stock_status".to_string(), json!(p.stock_status()));
    }
    value
}
