//! Notification side effects of committed stock reductions.
//!
//! The [`NotificationWorker`] subscribes to the event bus and turns
//! `inventory.*` facts into notifications. It runs on its own thread and
//! never touches the transaction that produced the event: a failed delivery
//! is logged and dropped.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use stockflow_events::{EventBus, Subscription};
use stockflow_inventory::{InventoryEvent, LowStockDetected, OrderFulfilled};

use crate::JsonEnvelope;

pub const ORDER_PROCESSED_TEMPLATE: &str = "order_processed";
pub const LOW_STOCK_TEMPLATE: &str = "low_stock_alert";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("no recipients configured")]
    NoRecipients,
}

/// Delivery channel (email, chat, ...).
pub trait Notifier: Send + Sync {
    fn send_notification(
        &self,
        recipient: &str,
        template: &str,
        context: &JsonValue,
    ) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn send_notification(
        &self,
        recipient: &str,
        template: &str,
        context: &JsonValue,
    ) -> Result<(), NotifyError> {
        info!(recipient, template, %context, "notification");
        Ok(())
    }
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

#[derive(Debug)]
pub struct NotificationWorker;

impl NotificationWorker {
    /// Spawn the worker thread.
    ///
    /// The subscription is taken before the thread starts, so events
    /// published after `spawn` returns are never missed.
    pub fn spawn<B>(
        bus: B,
        notifier: Arc<dyn Notifier>,
        recipients: Vec<String>,
    ) -> Result<WorkerHandle, std::io::Error>
    where
        B: EventBus<JsonEnvelope>,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name("notification-worker".to_string())
            .spawn(move || worker_loop(sub, shutdown_rx, notifier.as_ref(), &recipients))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop(
    sub: Subscription<JsonEnvelope>,
    shutdown_rx: mpsc::Receiver<()>,
    notifier: &dyn Notifier,
    recipients: &[String],
) {
    let tick = Duration::from_millis(100);
    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(envelope) => {
                if let Err(err) = handle_envelope(&envelope, notifier, recipients) {
                    warn!(
                        event_type = envelope.event_type(),
                        event_id = %envelope.event_id(),
                        error = %err,
                        "notification failed"
                    );
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Route one envelope. Envelopes outside `inventory.*` are ignored.
pub fn handle_envelope(
    envelope: &JsonEnvelope,
    notifier: &dyn Notifier,
    recipients: &[String],
) -> Result<(), NotifyError> {
    if !envelope.event_type().starts_with("inventory.") {
        debug!(event_type = envelope.event_type(), "skipping event");
        return Ok(());
    }

    let event: InventoryEvent = envelope
        .decode()
        .map_err(|e| NotifyError::Delivery(format!("undecodable payload: {e}")))?;
    let (template, context) = match &event {
        InventoryEvent::OrderFulfilled(e) => (ORDER_PROCESSED_TEMPLATE, order_context(e)),
        InventoryEvent::LowStockDetected(e) => (LOW_STOCK_TEMPLATE, low_stock_context(e)),
    };

    if recipients.is_empty() {
        return Err(NotifyError::NoRecipients);
    }

    let mut failures = Vec::new();
    for recipient in recipients {
        if let Err(err) = notifier.send_notification(recipient, template, &context) {
            failures.push(format!("{recipient}: {err}"));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(NotifyError::Delivery(failures.join("; ")))
    }
}

fn order_context(e: &OrderFulfilled) -> JsonValue {
    json!({
        "order_id": e.order_id,
        "order_number": e.order_number,
        "line_count": e.stock_updates.len(),
        "units": e.stock_updates.iter().map(|u| u.quantity).sum::<i64>(),
        "processed_at": e.occurred_at,
    })
}

fn low_stock_context(e: &LowStockDetected) -> JsonValue {
    json!({
        "product_id": e.product_id,
        "product_name": e.product_name,
        "stock": e.stock,
        "low_stock_threshold": e.low_stock_threshold,
        "order_id": e.order_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    use chrono::Utc;
    use stockflow_core::AggregateId;
    use stockflow_events::InMemoryEventBus;
    use stockflow_orders::OrderId;
    use stockflow_products::ProductId;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String, JsonValue)>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(String, String, JsonValue)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn send_notification(
            &self,
            recipient: &str,
            template: &str,
            context: &JsonValue,
        ) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), template.to_string(), context.clone()));
            Ok(())
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn send_notification(&self, _: &str, _: &str, _: &JsonValue) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp unavailable".to_string()))
        }
    }

    fn low_stock_envelope() -> JsonEnvelope {
        let product_id = ProductId::generate();
        let event = InventoryEvent::LowStockDetected(LowStockDetected {
            product_id,
            product_name: "Bolt".to_string(),
            stock: 2,
            low_stock_threshold: 5,
            order_id: OrderId::generate(),
            occurred_at: Utc::now(),
        });
        JsonEnvelope::from_typed(product_id.0, "product", &event).unwrap()
    }

    fn processed_envelope() -> JsonEnvelope {
        let order_id = OrderId::generate();
        let event = InventoryEvent::OrderFulfilled(OrderFulfilled {
            order_id,
            order_number: "PO-7".to_string(),
            stock_updates: vec![],
            processed_by: None,
            occurred_at: Utc::now(),
        });
        JsonEnvelope::from_typed(order_id.0, "order", &event).unwrap()
    }

    #[test]
    fn low_stock_goes_to_every_recipient() {
        let notifier = RecordingNotifier::default();
        let recipients = vec!["ops@example.com".to_string(), "buyer@example.com".to_string()];

        handle_envelope(&low_stock_envelope(), &notifier, &recipients).unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, t, _)| t == LOW_STOCK_TEMPLATE));
        assert_eq!(sent[0].2["product_name"], "Bolt");
        assert_eq!(sent[1].0, "buyer@example.com");
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let notifier = RecordingNotifier::default();
        let envelope = JsonEnvelope::new(
            uuid::Uuid::now_v7(),
            AggregateId::new(),
            "order",
            "orders.order.confirmed",
            1,
            Utc::now(),
            json!({}),
        );

        handle_envelope(&envelope, &notifier, &["a@example.com".to_string()]).unwrap();
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn missing_recipients_is_reported() {
        let err = handle_envelope(&processed_envelope(), &RecordingNotifier::default(), &[])
            .unwrap_err();
        assert!(matches!(err, NotifyError::NoRecipients));
    }

    #[test]
    fn delivery_failures_are_collected() {
        let err = handle_envelope(
            &processed_envelope(),
            &FailingNotifier,
            &["a@example.com".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(msg) if msg.contains("smtp unavailable")));
    }

    #[test]
    fn worker_delivers_published_events_and_survives_failures() {
        let bus = Arc::new(InMemoryEventBus::<JsonEnvelope>::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let failing = NotificationWorker::spawn(
            bus.clone(),
            Arc::new(FailingNotifier),
            vec!["a@example.com".to_string()],
        )
        .unwrap();
        let recording = NotificationWorker::spawn(
            bus.clone(),
            notifier.clone(),
            vec!["a@example.com".to_string()],
        )
        .unwrap();

        bus.publish(processed_envelope()).unwrap();
        bus.publish(low_stock_envelope()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while notifier.sent().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let templates: Vec<String> = notifier.sent().into_iter().map(|(_, t, _)| t).collect();
        assert_eq!(templates, vec![ORDER_PROCESSED_TEMPLATE, LOW_STOCK_TEMPLATE]);

        failing.shutdown();
        recording.shutdown();
    }
}
