use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{Aggregate, AggregateRoot, DomainError, UserId, domain_id};
use stockflow_events::Event;
use stockflow_products::{ProductId, SupplierId};

domain_id!(
    /// Order identifier.
    OrderId
);

/// Order status lifecycle.
///
/// `pending → confirmed → shipped → delivered`, with `cancelled` reachable
/// from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status '{other}'"))),
        }
    }
}

/// Order line item. Prices in smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
    pub total_price: u64,
}

impl OrderItem {
    pub fn new(product_id: ProductId, quantity: i64, unit_price: u64) -> Result<Self, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let total_price = (quantity as u64)
            .checked_mul(unit_price)
            .ok_or_else(|| DomainError::validation("line total overflows"))?;
        Ok(Self {
            product_id,
            quantity,
            unit_price,
            total_price,
        })
    }
}

/// Persisted state of an order (one row per order).
///
/// The aggregate is rehydrated from this record rather than from an event
/// stream; `version` guards concurrent writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: String,
    pub supplier_id: Option<SupplierId>,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_amount: u64,
    pub order_date: DateTime<Utc>,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_by: Option<UserId>,
    pub version: u64,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    order_number: String,
    supplier_id: Option<SupplierId>,
    status: OrderStatus,
    items: Vec<OrderItem>,
    total_amount: u64,
    order_date: DateTime<Utc>,
    expected_delivery: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    created_by: Option<UserId>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            supplier_id: None,
            status: OrderStatus::Pending,
            items: Vec::new(),
            total_amount: 0,
            order_date: DateTime::<Utc>::UNIX_EPOCH,
            expected_delivery: None,
            processed_at: None,
            cancel_reason: None,
            created_by: None,
            version: 0,
            created: false,
        }
    }

    /// Rehydrate from a persisted record.
    pub fn from_record(record: OrderRecord) -> Self {
        Self {
            id: record.id,
            order_number: record.order_number,
            supplier_id: record.supplier_id,
            status: record.status,
            items: record.items,
            total_amount: record.total_amount,
            order_date: record.order_date,
            expected_delivery: record.expected_delivery,
            processed_at: record.processed_at,
            cancel_reason: record.cancel_reason,
            created_by: record.created_by,
            version: record.version,
            created: true,
        }
    }

    pub fn to_record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id,
            order_number: self.order_number.clone(),
            supplier_id: self.supplier_id,
            status: self.status,
            items: self.items.clone(),
            total_amount: self.total_amount,
            order_date: self.order_date,
            expected_delivery: self.expected_delivery,
            processed_at: self.processed_at,
            cancel_reason: self.cancel_reason.clone(),
            created_by: self.created_by,
            version: self.version,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Whether the stock reduction transaction may run against this order.
    pub fn can_process(&self) -> bool {
        self.created && self.status == OrderStatus::Confirmed && !self.is_processed()
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub supplier_id: Option<SupplierId>,
    pub items: Vec<OrderItem>,
    pub order_date: DateTime<Utc>,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub created_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem (pending orders only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub order_id: OrderId,
    pub item: OrderItem,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirm {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Ship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ship {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliver {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub order_id: OrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkProcessed (issued by the fulfillment engine inside its transaction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkProcessed {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    AddItem(AddItem),
    Confirm(Confirm),
    Ship(Ship),
    Deliver(Deliver),
    Cancel(Cancel),
    MarkProcessed(MarkProcessed),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_number: String,
    pub supplier_id: Option<SupplierId>,
    pub items: Vec<OrderItem>,
    pub total_amount: u64,
    pub order_date: DateTime<Utc>,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub created_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub order_id: OrderId,
    pub item: OrderItem,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderShipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub reason: Option<String>,
    /// Set when stock had already been deducted; it is not restored.
    pub was_processed: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderProcessed.
///
/// Stock for every line was deducted in the same transaction that recorded
/// this event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProcessed {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    ItemAdded(ItemAdded),
    OrderConfirmed(OrderConfirmed),
    OrderShipped(OrderShipped),
    OrderDelivered(OrderDelivered),
    OrderCancelled(OrderCancelled),
    OrderProcessed(OrderProcessed),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "orders.order.created",
            OrderEvent::ItemAdded(_) => "orders.order.item_added",
            OrderEvent::OrderConfirmed(_) => "orders.order.confirmed",
            OrderEvent::OrderShipped(_) => "orders.order.shipped",
            OrderEvent::OrderDelivered(_) => "orders.order.delivered",
            OrderEvent::OrderCancelled(_) => "orders.order.cancelled",
            OrderEvent::OrderProcessed(_) => "orders.order.processed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::ItemAdded(e) => e.occurred_at,
            OrderEvent::OrderConfirmed(e) => e.occurred_at,
            OrderEvent::OrderShipped(e) => e.occurred_at,
            OrderEvent::OrderDelivered(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::OrderProcessed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.supplier_id = e.supplier_id;
                self.status = OrderStatus::Pending;
                self.items = e.items.clone();
                self.total_amount = e.total_amount;
                self.order_date = e.order_date;
                self.expected_delivery = e.expected_delivery;
                self.created_by = e.created_by;
                self.created = true;
            }
            OrderEvent::ItemAdded(e) => {
                self.total_amount = self.total_amount.saturating_add(e.item.total_price);
                self.items.push(e.item.clone());
            }
            OrderEvent::OrderConfirmed(_) => {
                self.status = OrderStatus::Confirmed;
            }
            OrderEvent::OrderShipped(_) => {
                self.status = OrderStatus::Shipped;
            }
            OrderEvent::OrderDelivered(_) => {
                self.status = OrderStatus::Delivered;
            }
            OrderEvent::OrderCancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancel_reason = e.reason.clone();
            }
            OrderEvent::OrderProcessed(e) => {
                self.processed_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::AddItem(cmd) => self.handle_add_item(cmd),
            OrderCommand::Confirm(cmd) => self.handle_confirm(cmd),
            OrderCommand::Ship(cmd) => self.handle_ship(cmd),
            OrderCommand::Deliver(cmd) => self.handle_deliver(cmd),
            OrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
            OrderCommand::MarkProcessed(cmd) => self.handle_mark_processed(cmd),
        }
    }
}

impl Order {
    fn ensure_exists(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: OrderStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::transition(format!(
                "cannot {action} an order in status '{}' (requires '{}')",
                self.status, expected
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order_number cannot be empty"));
        }
        validate_items(&cmd.items)?;

        let total_amount = cmd
            .items
            .iter()
            .try_fold(0u64, |acc, i| acc.checked_add(i.total_price))
            .ok_or_else(|| DomainError::validation("order total overflows"))?;

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            order_number: cmd.order_number.trim().to_string(),
            supplier_id: cmd.supplier_id,
            items: cmd.items.clone(),
            total_amount,
            order_date: cmd.order_date,
            expected_delivery: cmd.expected_delivery,
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(OrderStatus::Pending, "add items to")?;
        validate_items(std::slice::from_ref(&cmd.item))?;
        if self.total_amount.checked_add(cmd.item.total_price).is_none() {
            return Err(DomainError::validation("order total overflows"));
        }

        Ok(vec![OrderEvent::ItemAdded(ItemAdded {
            order_id: cmd.order_id,
            item: cmd.item.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &Confirm) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(OrderStatus::Pending, "confirm")?;

        if self.items.is_empty() {
            return Err(DomainError::validation("cannot confirm an order without items"));
        }

        Ok(vec![OrderEvent::OrderConfirmed(OrderConfirmed {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_ship(&self, cmd: &Ship) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(OrderStatus::Confirmed, "ship")?;

        if !self.is_processed() {
            return Err(DomainError::transition(
                "cannot ship an order before its stock has been processed",
            ));
        }

        Ok(vec![OrderEvent::OrderShipped(OrderShipped {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deliver(&self, cmd: &Deliver) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(OrderStatus::Shipped, "deliver")?;

        Ok(vec![OrderEvent::OrderDelivered(OrderDelivered {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.status.is_terminal() {
            return Err(DomainError::transition(format!(
                "cannot cancel an order in terminal status '{}'",
                self.status
            )));
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            was_processed: self.is_processed(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_processed(&self, cmd: &MarkProcessed) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(OrderStatus::Confirmed, "process")?;

        if self.is_processed() {
            return Err(DomainError::conflict("order stock has already been processed"));
        }

        Ok(vec![OrderEvent::OrderProcessed(OrderProcessed {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn validate_items(items: &[OrderItem]) -> Result<(), DomainError> {
    for (idx, item) in items.iter().enumerate() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockflow_events::execute;

    fn test_order_id() -> OrderId {
        OrderId::generate()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn item(quantity: i64, unit_price: u64) -> OrderItem {
        OrderItem::new(ProductId::generate(), quantity, unit_price).unwrap()
    }

    fn created_order(items: Vec<OrderItem>) -> Order {
        let order_id = test_order_id();
        let mut order = Order::empty(order_id);
        execute(
            &mut order,
            &OrderCommand::CreateOrder(CreateOrder {
                order_id,
                order_number: "PO-0001".to_string(),
                supplier_id: Some(SupplierId::generate()),
                items,
                order_date: test_time(),
                expected_delivery: None,
                created_by: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        order
    }

    fn confirmed_order() -> Order {
        let mut order = created_order(vec![item(4, 250)]);
        let order_id = order.id_typed();
        execute(
            &mut order,
            &OrderCommand::Confirm(Confirm {
                order_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        order
    }

    fn processed_order() -> Order {
        let mut order = confirmed_order();
        let order_id = order.id_typed();
        execute(
            &mut order,
            &OrderCommand::MarkProcessed(MarkProcessed {
                order_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        order
    }

    #[test]
    fn create_starts_pending_with_summed_total() {
        let order = created_order(vec![item(2, 100), item(3, 50)]);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total_amount(), 350);
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn item_with_wrong_total_is_rejected() {
        let mut bad = item(2, 100);
        bad.total_price = 150;
        let order_id = test_order_id();
        let err = Order::empty(order_id)
            .handle(&OrderCommand::CreateOrder(CreateOrder {
                order_id,
                order_number: "PO-1".to_string(),
                supplier_id: None,
                items: vec![bad],
                order_date: test_time(),
                expected_delivery: None,
                created_by: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("total_price")));
    }

    #[test]
    fn order_total_overflow_is_rejected() {
        let half = u64::MAX / 2 + 1;
        let order_id = test_order_id();
        let mut order = Order::empty(order_id);
        let err = execute(
            &mut order,
            &OrderCommand::CreateOrder(CreateOrder {
                order_id,
                order_number: "PO-BIG".to_string(),
                supplier_id: None,
                items: vec![item(1, half), item(1, half)],
                order_date: test_time(),
                expected_delivery: None,
                created_by: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::validation("order total overflows"));
        assert_eq!(order.version(), 0);
    }

    #[test]
    fn adding_item_that_overflows_total_is_rejected() {
        let half = u64::MAX / 2 + 1;
        let mut order = created_order(vec![item(1, half)]);
        let order_id = order.id_typed();

        let err = execute(
            &mut order,
            &OrderCommand::AddItem(AddItem {
                order_id,
                item: item(1, half),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::validation("order total overflows"));
        assert_eq!(order.total_amount(), half);
        assert_eq!(order.items().len(), 1);
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let err = OrderItem::new(ProductId::generate(), 0, 10).unwrap_err();
        assert_eq!(err, DomainError::validation("quantity must be positive"));
    }

    #[test]
    fn add_item_only_while_pending() {
        let mut order = created_order(vec![item(1, 10)]);
        let order_id = order.id_typed();
        execute(
            &mut order,
            &OrderCommand::AddItem(AddItem {
                order_id,
                item: item(2, 5),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.total_amount(), 20);

        let mut confirmed = confirmed_order();
        let confirmed_id = confirmed.id_typed();
        let err = execute(
            &mut confirmed,
            &OrderCommand::AddItem(AddItem {
                order_id: confirmed_id,
                item: item(1, 1),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn confirm_requires_items() {
        let order = created_order(vec![]);
        let err = order
            .handle(&OrderCommand::Confirm(Confirm {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("without items")));
    }

    #[test]
    fn only_confirmed_unprocessed_orders_can_process() {
        assert!(!created_order(vec![item(1, 1)]).can_process());
        assert!(confirmed_order().can_process());
        assert!(!processed_order().can_process());
    }

    #[test]
    fn mark_processed_twice_is_a_conflict() {
        let order = processed_order();
        let err = order
            .handle(&OrderCommand::MarkProcessed(MarkProcessed {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn ship_requires_processing() {
        let order = confirmed_order();
        let err = order
            .handle(&OrderCommand::Ship(Ship {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(msg) if msg.contains("processed")));
    }

    #[test]
    fn full_lifecycle_reaches_delivered() {
        let mut order = processed_order();
        let order_id = order.id_typed();
        execute(
            &mut order,
            &OrderCommand::Ship(Ship {
                order_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        execute(
            &mut order,
            &OrderCommand::Deliver(Deliver {
                order_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert!(order.status().is_terminal());
    }

    #[test]
    fn cancel_from_terminal_state_is_rejected() {
        let mut order = confirmed_order();
        let order_id = order.id_typed();
        execute(
            &mut order,
            &OrderCommand::Cancel(Cancel {
                order_id,
                reason: Some("supplier out of business".to_string()),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);

        let err = order
            .handle(&OrderCommand::Cancel(Cancel {
                order_id,
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn cancelling_processed_order_is_flagged() {
        let order = processed_order();
        let events = order
            .handle(&OrderCommand::Cancel(Cancel {
                order_id: order.id_typed(),
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        match &events[0] {
            OrderEvent::OrderCancelled(e) => assert!(e.was_processed),
            other => panic!("expected OrderCancelled, got {other:?}"),
        }
    }

    #[test]
    fn record_round_trip_preserves_state() {
        let order = processed_order();
        let restored = Order::from_record(order.to_record());
        assert_eq!(restored, order);
    }

    #[test]
    fn status_parses_from_wire_names() {
        for s in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<OrderStatus>().unwrap(), s);
        }
        assert!("processing".parse::<OrderStatus>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Any command sequence keeps the lifecycle consistent: terminal
        /// states are never left, and shipped/delivered orders were processed.
        #[test]
        fn lifecycle_invariants_hold(steps in prop::collection::vec(0usize..5, 0..20)) {
            let mut order = created_order(vec![item(1, 1)]);
            let order_id = order.id_typed();
            let all = [
                OrderCommand::Confirm(Confirm { order_id, occurred_at: Utc::now() }),
                OrderCommand::Ship(Ship { order_id, occurred_at: Utc::now() }),
                OrderCommand::Deliver(Deliver { order_id, occurred_at: Utc::now() }),
                OrderCommand::Cancel(Cancel { order_id, reason: None, occurred_at: Utc::now() }),
                OrderCommand::MarkProcessed(MarkProcessed { order_id, occurred_at: Utc::now() }),
            ];

            for step in steps {
                let before = order.status();
                let version_before = order.version();
                match execute(&mut order, &all[step]) {
                    Ok(events) => {
                        prop_assert!(!before.is_terminal());
                        prop_assert_eq!(order.version(), version_before + events.len() as u64);
                    }
                    Err(_) => prop_assert_eq!(order.status(), before),
                }
                if matches!(order.status(), OrderStatus::Shipped | OrderStatus::Delivered) {
                    prop_assert!(order.is_processed());
                }
            }
        }
    }
}
