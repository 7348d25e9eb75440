//! Stock reduction transaction.
//!
//! [`StockReductionEngine::process_order`] is the single entry point that
//! deducts stock for a confirmed order. It owns the transaction boundary:
//!
//! ```text
//! validate request (no IO)
//!   ↓
//! begin: lock order row + product rows (ascending id)
//!   ↓
//! load order ── missing ──────────────→ NotFound
//!   │ already processed ──────────────→ AlreadyProcessed (no writes)
//!   │ not confirmed ──────────────────→ Precondition
//!   ↓
//! plan against locked stock ── short ─→ rollback, InsufficientStock
//!   ↓
//! decrement + `out` movement per line, mark processed, record activity
//!   ↓
//! commit, then publish events (best effort)
//! ```
//!
//! Any repository failure rolls the transaction back, so state is unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{Span, info, instrument, warn};

use stockflow_core::{AggregateId, AggregateRoot, DomainError, ExpectedVersion, UserId};
use stockflow_events::{EventBus, EventEnvelope, execute};
use stockflow_inventory::{
    InventoryEvent, LowStockDetected, OrderFulfilled, PlannedDecrement, ProcessOrderOutcome,
    ProcessOrderRequest, ReductionPlan, StockMovement, StockUpdate, plan_reduction,
};
use stockflow_orders::{MarkProcessed, Order, OrderCommand, OrderStatus};

use crate::JsonEnvelope;
use crate::activity::Activity;
use crate::repository::{FulfillmentTx, RepositoryError, StockRepository};

#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The request is malformed; nothing was read or written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The order is not in a state that allows processing.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Storage failure; the transaction was rolled back.
    #[error("infrastructure error: {0}")]
    Infrastructure(#[from] RepositoryError),
}

impl From<DomainError> for FulfillmentError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                FulfillmentError::Validation(msg)
            }
            DomainError::NotFound => FulfillmentError::NotFound("order".to_string()),
            DomainError::InvalidTransition(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::Conflict(msg) => FulfillmentError::Precondition(msg),
        }
    }
}

/// Event plus the aggregate it is about: `(aggregate_id, aggregate_type, event)`.
type Fact = (AggregateId, &'static str, InventoryEvent);

/// What the locked section decided.
enum Decision {
    Commit {
        updates: Vec<StockUpdate>,
        events: Vec<Fact>,
    },
    Abort(ProcessOrderOutcome),
}

/// Runs the stock reduction transaction and publishes its facts.
pub struct StockReductionEngine<B> {
    repo: Arc<dyn StockRepository>,
    bus: B,
}

impl<B> StockReductionEngine<B>
where
    B: EventBus<JsonEnvelope>,
{
    pub fn new(repo: Arc<dyn StockRepository>, bus: B) -> Self {
        Self { repo, bus }
    }

    pub fn repository(&self) -> &Arc<dyn StockRepository> {
        &self.repo
    }

    /// Deduct stock for every line of `request`, or for none of them.
    ///
    /// Insufficient stock is returned as [`ProcessOrderOutcome::InsufficientStock`]
    /// listing every offending line in input order. A second call for an
    /// order that was already processed changes nothing and returns
    /// [`ProcessOrderOutcome::AlreadyProcessed`].
    #[instrument(
        skip(self, request),
        fields(
            order_id = %request.order_id,
            line_count = request.items.len(),
            outcome = tracing::field::Empty
        ),
        err
    )]
    pub async fn process_order(
        &self,
        request: &ProcessOrderRequest,
        actor: Option<UserId>,
    ) -> Result<ProcessOrderOutcome, FulfillmentError> {
        request.validate()?;

        let mut tx = self
            .repo
            .begin(request.order_id, &request.product_ids())
            .await?;

        let decision = match decide(tx.as_mut(), request, actor).await {
            Ok(decision) => decision,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed processing also failed");
                }
                return Err(err);
            }
        };

        let span = Span::current();
        match decision {
            Decision::Abort(outcome) => {
                tx.rollback().await?;
                match &outcome {
                    ProcessOrderOutcome::InsufficientStock { insufficient_items } => {
                        span.record("outcome", "insufficient_stock");
                        warn!(
                            short_lines = insufficient_items.len(),
                            "order not processed: insufficient stock"
                        );
                    }
                    ProcessOrderOutcome::AlreadyProcessed { processed_at } => {
                        span.record("outcome", "already_processed");
                        info!(%processed_at, "order already processed; nothing to do");
                    }
                    ProcessOrderOutcome::Processed { .. } => {}
                }
                Ok(outcome)
            }
            Decision::Commit { updates, events } => {
                tx.commit().await?;
                span.record("outcome", "processed");
                info!(lines = updates.len(), "order processed");

                self.publish(events);
                Ok(ProcessOrderOutcome::Processed {
                    stock_updates: updates,
                })
            }
        }
    }

    /// Publication is best effort: the transaction has already committed.
    fn publish(&self, events: Vec<Fact>) {
        for (aggregate_id, aggregate_type, event) in events {
            let envelope = match EventEnvelope::from_typed(aggregate_id, aggregate_type, &event) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(error = %err, "failed to encode event");
                    continue;
                }
            };
            if let Err(err) = self.bus.publish(envelope) {
                warn!(error = ?err, "failed to publish event");
            }
        }
    }
}

/// The locked section: everything between `begin` and commit/rollback.
async fn decide(
    tx: &mut dyn FulfillmentTx,
    request: &ProcessOrderRequest,
    actor: Option<UserId>,
) -> Result<Decision, FulfillmentError> {
    let record = tx
        .get_order(request.order_id)
        .await?
        .ok_or_else(|| FulfillmentError::NotFound(format!("order {}", request.order_id)))?;
    let mut order = Order::from_record(record);

    if let Some(processed_at) = order.processed_at() {
        return Ok(Decision::Abort(ProcessOrderOutcome::AlreadyProcessed { processed_at }));
    }
    if order.status() != OrderStatus::Confirmed {
        return Err(FulfillmentError::Precondition(format!(
            "order {} is {}; only confirmed orders can be processed",
            order.order_number(),
            order.status()
        )));
    }

    let mut snapshots = HashMap::new();
    for product_id in request.product_ids() {
        if let Some(snapshot) = tx.get_product_stock(product_id).await? {
            snapshots.insert(product_id, snapshot);
        }
    }

    let decrements = match plan_reduction(&request.items, &snapshots) {
        ReductionPlan::Reject(insufficient_items) => {
            return Ok(Decision::Abort(ProcessOrderOutcome::InsufficientStock {
                insufficient_items,
            }));
        }
        ReductionPlan::Apply(decrements) => decrements,
    };

    let now = Utc::now();
    let mut updates = Vec::with_capacity(decrements.len());
    for d in &decrements {
        let new_stock = tx.decrement_product_stock(d.product_id, d.quantity).await?;
        if new_stock != d.new_stock {
            return Err(RepositoryError::Conflict(format!(
                "product {}: stock changed while locked (expected {}, found {})",
                d.product_id, d.new_stock, new_stock
            ))
            .into());
        }

        let movement = StockMovement::order_out(
            d.product_id,
            d.quantity,
            d.previous_stock,
            request.order_id,
            order.order_number(),
            actor,
            now,
        );
        tx.append_movement(&movement).await?;

        updates.push(StockUpdate {
            product_id: d.product_id,
            product_name: d.product_name.clone(),
            quantity: d.quantity,
            previous_stock: d.previous_stock,
            new_stock,
            movement_id: movement.id,
        });
    }

    let read_version = order.version();
    execute(
        &mut order,
        &OrderCommand::MarkProcessed(MarkProcessed {
            order_id: request.order_id,
            occurred_at: now,
        }),
    )?;
    tx.mark_order_processed(&order.to_record(), ExpectedVersion::Exact(read_version))
        .await?;

    tx.record_activity(&Activity::order_processed(
        request.order_id,
        order.order_number(),
        &updates,
        actor,
        now,
    ))
    .await?;

    let events = facts(&order, &updates, &decrements, actor, now);
    Ok(Decision::Commit { updates, events })
}

/// Events describing a committed reduction: one `OrderFulfilled`, then one
/// `LowStockDetected` per product left at or below its threshold.
fn facts(
    order: &Order,
    updates: &[StockUpdate],
    decrements: &[PlannedDecrement],
    actor: Option<UserId>,
    now: DateTime<Utc>,
) -> Vec<Fact> {
    let order_id = order.id_typed();
    let mut events = vec![(
        order_id.0,
        "order",
        InventoryEvent::OrderFulfilled(OrderFulfilled {
            order_id,
            order_number: order.order_number().to_string(),
            stock_updates: updates.to_vec(),
            processed_by: actor,
            occurred_at: now,
        }),
    )];

    // Duplicate lines: only the last decrement holds the final level.
    let mut last: Vec<&PlannedDecrement> = Vec::new();
    for d in decrements.iter().rev() {
        if !last.iter().any(|seen| seen.product_id == d.product_id) {
            last.push(d);
        }
    }
    last.reverse();

    for d in last.into_iter().filter(|d| d.leaves_low_stock()) {
        events.push((
            d.product_id.0,
            "product",
            InventoryEvent::LowStockDetected(LowStockDetected {
                product_id: d.product_id,
                product_name: d.product_name.clone(),
                stock: d.new_stock,
                low_stock_threshold: d.low_stock_threshold,
                order_id,
                occurred_at: now,
            }),
        ));
    }

    events
}
