//! Infrastructure layer: persistence adapters, the fulfillment engine that
//! owns the stock reduction transaction, and side-effect workers.

pub mod activity;
pub mod fulfillment;
pub mod notifications;
pub mod order_service;
pub mod repository;


pub use activity::{Activity, ActivityId, ActivityType};
pub use fulfillment::{FulfillmentError, StockReductionEngine};
pub use notifications::{
    LoggingNotifier, NotificationWorker, Notifier, NotifyError, WorkerHandle,
};
pub use order_service::{DispatchError, OrderService};
pub use repository::{
    FulfillmentTx, InMemoryStockRepository, MovementFilter, PostgresStockRepository,
    RepositoryError, StockRepository,
};

/// Envelope type carried on the event bus.
pub type JsonEnvelope = stockflow_events::EventEnvelope<serde_json::Value>;
