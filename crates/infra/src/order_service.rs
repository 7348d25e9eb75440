//! Order lifecycle commands.
//!
//! [`OrderService::dispatch`] runs one command through the order aggregate:
//!
//! 1. **Load** the stored record
//! 2. **Rehydrate** it into an [`Order`]
//! 3. **Decide** and apply events (`execute`, no IO)
//! 4. **Persist** the new record, expecting the version that was loaded
//! 5. **Publish** the decided events, then append to the activity feed
//!
//! A concurrent write between steps 1 and 4 surfaces as
//! [`DispatchError::Conflict`]; callers may reload and retry.
//!
//! Stock deduction is not a lifecycle command: it goes through
//! [`crate::StockReductionEngine`], which owns its own transaction.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{instrument, warn};

use stockflow_core::{AggregateRoot, DomainError, ExpectedVersion, UserId};
use stockflow_events::{EventBus, EventEnvelope, execute};
use stockflow_orders::{CreateOrder, Order, OrderCommand, OrderEvent, OrderId, OrderRecord};

use crate::JsonEnvelope;
use crate::activity::{Activity, ActivityType};
use crate::repository::{RepositoryError, StockRepository};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Stale version or duplicate key.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(RepositoryError),
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                DispatchError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => DispatchError::Validation(msg),
            DomainError::InvalidTransition(msg) => DispatchError::InvalidTransition(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::NotFound => DispatchError::NotFound("order".to_string()),
        }
    }
}

impl From<RepositoryError> for DispatchError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(msg) => DispatchError::Conflict(msg),
            RepositoryError::NotFound(msg) => DispatchError::NotFound(msg),
            other => DispatchError::Store(other),
        }
    }
}

pub struct OrderService<B> {
    repo: Arc<dyn StockRepository>,
    bus: B,
}

impl<B> OrderService<B>
where
    B: EventBus<JsonEnvelope>,
{
    pub fn new(repo: Arc<dyn StockRepository>, bus: B) -> Self {
        Self { repo, bus }
    }

    /// Create a pending order.
    #[instrument(skip(self, cmd), fields(order_id = %cmd.order_id, order_number = %cmd.order_number), err)]
    pub async fn create(&self, cmd: CreateOrder) -> Result<OrderRecord, DispatchError> {
        let actor = cmd.created_by;
        let mut order = Order::empty(cmd.order_id);
        let events = execute(&mut order, &OrderCommand::CreateOrder(cmd))?;

        let record = order.to_record();
        self.repo.insert_order(&record).await?;

        self.publish(record.id, &events);
        self.record(
            Activity::new(
                ActivityType::OrderCreated,
                format!(
                    "Order {} created with {} lines",
                    record.order_number,
                    record.items.len()
                ),
                actor,
                Utc::now(),
            )
            .with_metadata(json!({
                "order_id": record.id,
                "order_number": record.order_number,
                "total_amount": record.total_amount,
            })),
        )
        .await;

        Ok(record)
    }

    /// Run a lifecycle command against an existing order.
    #[instrument(skip(self, command), fields(order_id = %order_id), err)]
    pub async fn dispatch(
        &self,
        order_id: OrderId,
        command: OrderCommand,
        actor: Option<UserId>,
    ) -> Result<OrderRecord, DispatchError> {
        // 1) Load
        let stored = self
            .repo
            .get_order(order_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("order {order_id}")))?;
        let previous_status = stored.status;

        // 2) Rehydrate
        let mut order = Order::from_record(stored);
        let expected = ExpectedVersion::Exact(order.version());

        // 3) Decide
        let events = execute(&mut order, &command)?;
        if events.is_empty() {
            return Ok(order.to_record());
        }

        // 4) Persist
        let record = order.to_record();
        self.repo.save_order(&record, expected).await?;

        // 5) Publish, then feed
        self.publish(order_id, &events);
        if record.status != previous_status {
            self.record(
                Activity::new(
                    ActivityType::OrderStatusChanged,
                    format!(
                        "Order {} moved from {} to {}",
                        record.order_number, previous_status, record.status
                    ),
                    actor,
                    Utc::now(),
                )
                .with_metadata(json!({
                    "order_id": record.id,
                    "from": previous_status,
                    "to": record.status,
                })),
            )
            .await;
        }

        Ok(record)
    }

    fn publish(&self, order_id: OrderId, events: &[OrderEvent]) {
        for event in events {
            match EventEnvelope::from_typed(order_id.0, "order", event) {
                Ok(envelope) => {
                    if let Err(err) = self.bus.publish(envelope) {
                        warn!(error = ?err, "failed to publish order event");
                    }
                }
                Err(err) => warn!(error = %err, "failed to encode order event"),
            }
        }
    }

    /// The feed is informational; the order change has already been saved.
    async fn record(&self, activity: Activity) {
        if let Err(err) = self.repo.record_activity(&activity).await {
            warn!(error = %err, "failed to record activity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use stockflow_events::InMemoryEventBus;
    use stockflow_orders::{Cancel, Confirm, OrderItem, OrderStatus, Ship};
    use stockflow_products::ProductId;

    use crate::repository::InMemoryStockRepository;

    type Bus = Arc<InMemoryEventBus<JsonEnvelope>>;

    fn setup() -> (InMemoryStockRepository, OrderService<Bus>, Bus) {
        let repo = InMemoryStockRepository::new();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let service = OrderService::new(Arc::new(repo.clone()), bus.clone());
        (repo, service, bus)
    }

    fn create_cmd(number: &str) -> CreateOrder {
        CreateOrder {
            order_id: OrderId::generate(),
            order_number: number.to_string(),
            supplier_id: None,
            items: vec![OrderItem::new(ProductId::generate(), 3, 250).unwrap()],
            order_date: Utc::now(),
            expected_delivery: None,
            created_by: None,
            occurred_at: Utc::now(),
        }
    }

    fn confirm(order_id: OrderId) -> OrderCommand {
        OrderCommand::Confirm(Confirm {
            order_id,
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn create_persists_pending_order_and_publishes() {
        let (repo, service, bus) = setup();
        let sub = bus.subscribe();

        let record = service.create(create_cmd("PO-1")).await.unwrap();
        assert_eq!(record.status, OrderStatus::Pending);
        assert_eq!(record.total_amount, 750);
        assert_eq!(repo.get_order(record.id).await.unwrap(), Some(record.clone()));

        let envelope = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(envelope.event_type(), "orders.order.created");

        let feed = repo.list_activities(None).await.unwrap();
        assert_eq!(feed[0].activity_type, ActivityType::OrderCreated);
    }

    #[tokio::test]
    async fn duplicate_order_number_is_a_conflict() {
        let (_repo, service, _bus) = setup();
        service.create(create_cmd("PO-1")).await.unwrap();

        let err = service.create(create_cmd("PO-1")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
    }

    #[tokio::test]
    async fn confirm_moves_status_and_records_activity() {
        let (repo, service, _bus) = setup();
        let created = service.create(create_cmd("PO-2")).await.unwrap();

        let confirmed = service
            .dispatch(created.id, confirm(created.id), None)
            .await
            .unwrap();
        assert_eq!(confirmed.status, OrderStatus::Confirmed);
        assert_eq!(confirmed.version, created.version + 1);

        let feed = repo.list_activities(Some(1)).await.unwrap();
        assert_eq!(feed[0].activity_type, ActivityType::OrderStatusChanged);
        assert_eq!(feed[0].metadata.as_ref().unwrap()["to"], "confirmed");
    }

    #[tokio::test]
    async fn shipping_an_unprocessed_order_is_rejected() {
        let (repo, service, _bus) = setup();
        let created = service.create(create_cmd("PO-3")).await.unwrap();
        service
            .dispatch(created.id, confirm(created.id), None)
            .await
            .unwrap();

        let err = service
            .dispatch(
                created.id,
                OrderCommand::Ship(Ship {
                    order_id: created.id,
                    occurred_at: Utc::now(),
                }),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition(_)));
        assert_eq!(
            repo.get_order(created.id).await.unwrap().unwrap().status,
            OrderStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn cancel_keeps_the_reason() {
        let (_repo, service, _bus) = setup();
        let created = service.create(create_cmd("PO-4")).await.unwrap();

        let cancelled = service
            .dispatch(
                created.id,
                OrderCommand::Cancel(Cancel {
                    order_id: created.id,
                    reason: Some("supplier out of business".to_string()),
                    occurred_at: Utc::now(),
                }),
                None,
            )
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("supplier out of business"));
    }

    #[tokio::test]
    async fn stale_write_is_a_conflict() {
        let (repo, _service, _bus) = setup_with_order().await;
        let created = repo.list_orders().await.unwrap().remove(0);

        // A racing writer bumps the version between load and save.
        let mut bumped = created.clone();
        bumped.version += 1;
        repo.save_order(&bumped, ExpectedVersion::Exact(created.version))
            .await
            .unwrap();

        let mut order = Order::from_record(created.clone());
        execute(&mut order, &confirm(created.id)).unwrap();
        let err = repo
            .save_order(&order.to_record(), ExpectedVersion::Exact(created.version))
            .await
            .unwrap_err();
        assert!(matches!(DispatchError::from(err), DispatchError::Conflict(_)));
    }

    async fn setup_with_order() -> (InMemoryStockRepository, OrderService<Bus>, Bus) {
        let (repo, service, bus) = setup();
        service.create(create_cmd("PO-5")).await.unwrap();
        (repo, service, bus)
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (_repo, service, _bus) = setup();
        let id = OrderId::generate();
        let err = service.dispatch(id, confirm(id), None).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));
    }
}
