use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use stockflow_core::UserId;
use stockflow_events::InMemoryEventBus;
use stockflow_infra::{
    Activity, ActivityType, DispatchError, InMemoryStockRepository, JsonEnvelope, LoggingNotifier,
    NotificationWorker, OrderService, PostgresStockRepository, RepositoryError,
    StockReductionEngine, StockRepository, WorkerHandle,
};
use stockflow_products::{NewProduct, Product};

use crate::config::AppConfig;

pub type Bus = Arc<InMemoryEventBus<JsonEnvelope>>;

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    repo: Arc<dyn StockRepository>,
    bus: Bus,
    engine: StockReductionEngine<Bus>,
    orders: OrderService<Bus>,
}

impl AppServices {
    pub fn new(repo: Arc<dyn StockRepository>) -> Self {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        Self {
            engine: StockReductionEngine::new(repo.clone(), bus.clone()),
            orders: OrderService::new(repo.clone(), bus.clone()),
            repo,
            bus,
        }
    }

    /// In-memory wiring (dev/test).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStockRepository::new()))
    }

    pub async fn postgres(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let repo = PostgresStockRepository::connect(url, max_connections).await?;
        repo.ensure_schema().await?;
        Ok(Self::new(Arc::new(repo)))
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self, RepositoryError> {
        match &config.database_url {
            Some(url) => {
                info!(max_connections = config.database_max_connections, "using postgres repository");
                Self::postgres(url, config.database_max_connections).await
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory repository");
                Ok(Self::in_memory())
            }
        }
    }

    /// Start the notification worker on this instance's bus.
    pub fn spawn_notifications(&self, recipients: Vec<String>) -> std::io::Result<WorkerHandle> {
        if recipients.is_empty() {
            warn!("NOTIFY_RECIPIENTS is empty; notifications will be dropped");
        }
        NotificationWorker::spawn(self.bus.clone(), Arc::new(LoggingNotifier), recipients)
    }

    pub fn repository(&self) -> &Arc<dyn StockRepository> {
        &self.repo
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn engine(&self) -> &StockReductionEngine<Bus> {
        &self.engine
    }

    pub fn orders(&self) -> &OrderService<Bus> {
        &self.orders
    }

    /// Catalog a product; opening stock lands in the ledger.
    pub async fn create_product(
        &self,
        draft: NewProduct,
        actor: Option<UserId>,
    ) -> Result<Product, DispatchError> {
        let now = Utc::now();
        let product = draft.into_product(now)?;
        self.repo.insert_product(&product, actor).await?;

        let activity = Activity::new(
            ActivityType::ProductCreated,
            format!("Product {} ({}) created", product.name, product.sku),
            actor,
            now,
        )
        .with_metadata(json!({
            "product_id": product.id,
            "sku": product.sku,
            "stock": product.stock,
        }));
        if let Err(err) = self.repo.record_activity(&activity).await {
            warn!(error = %err, "failed to record activity");
        }

        Ok(product)
    }
}
