//! Postgres-backed repository.
//!
//! ## Locking
//!
//! [`StockRepository::begin`] starts a transaction and takes row locks with
//! `SELECT ... FOR UPDATE`: the order row first, then product rows in
//! ascending id order so concurrent transactions cannot deadlock on each
//! other. Locks are held until commit or rollback.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RepositoryError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (check violation) | `23514` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | Decode / ColumnNotFound | N/A | `Corrupt` |
//! | Other | N/A | `Backend` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use stockflow_core::{AggregateId, ExpectedVersion, UserId};
use stockflow_inventory::{MovementId, StockMovement, StockSnapshot};
use stockflow_orders::{OrderId, OrderItem, OrderRecord};
use stockflow_products::{CategoryId, Product, ProductId, SupplierId};

use super::{FulfillmentTx, MovementFilter, RepositoryError, StockRepository, check_version};
use crate::activity::{Activity, ActivityId, ActivityType};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id                  UUID PRIMARY KEY,
        name                TEXT NOT NULL,
        sku                 TEXT NOT NULL UNIQUE,
        code                TEXT NULL,
        price               BIGINT NOT NULL CHECK (price >= 0),
        cost                BIGINT NOT NULL CHECK (cost >= 0),
        stock               BIGINT NOT NULL CHECK (stock >= 0),
        low_stock_threshold BIGINT NOT NULL DEFAULT 0,
        reserved_stock      BIGINT NULL,
        max_stock           BIGINT NULL,
        reorder_point       BIGINT NULL,
        category_id         UUID NULL,
        supplier_id         UUID NULL,
        created_at          TIMESTAMPTZ NOT NULL,
        updated_at          TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id                UUID PRIMARY KEY,
        order_number      TEXT NOT NULL UNIQUE,
        supplier_id       UUID NULL,
        status            TEXT NOT NULL,
        items             JSONB NOT NULL,
        total_amount      BIGINT NOT NULL,
        order_date        TIMESTAMPTZ NOT NULL,
        expected_delivery TIMESTAMPTZ NULL,
        processed_at      TIMESTAMPTZ NULL,
        cancel_reason     TEXT NULL,
        created_by        UUID NULL,
        version           BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_movements (
        seq            BIGSERIAL PRIMARY KEY,
        id             UUID NOT NULL UNIQUE,
        product_id     UUID NOT NULL REFERENCES products (id),
        movement_type  TEXT NOT NULL,
        quantity       BIGINT NOT NULL,
        reference_type TEXT NULL,
        reference_id   UUID NULL,
        reason         TEXT NULL,
        previous_stock BIGINT NOT NULL,
        new_stock      BIGINT NOT NULL,
        created_by     UUID NULL,
        created_at     TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS stock_movements_product_idx
        ON stock_movements (product_id, created_at DESC, seq DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activities (
        seq           BIGSERIAL PRIMARY KEY,
        id            UUID NOT NULL UNIQUE,
        activity_type TEXT NOT NULL,
        description   TEXT NOT NULL,
        actor         UUID NULL,
        metadata      JSONB NULL,
        created_at    TIMESTAMPTZ NOT NULL
    )
    "#,
];

const PRODUCT_COLUMNS: &str = "id, name, sku, code, price, cost, stock, low_stock_threshold, \
     reserved_stock, max_stock, reorder_point, category_id, supplier_id, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, order_number, supplier_id, status, items, total_amount, \
     order_date, expected_delivery, processed_at, cancel_reason, created_by, version";

const MOVEMENT_COLUMNS: &str = "id, product_id, movement_type, quantity, reference_type, \
     reference_id, reason, previous_stock, new_stock, created_by, created_at";

/// Postgres-backed repository. Cheap to clone (shares the pool).
#[derive(Debug, Clone)]
pub struct PostgresStockRepository {
    pool: PgPool,
}

impl PostgresStockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool of at most `max_connections`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

/// Open stock reduction transaction.
struct PgFulfillmentTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl FulfillmentTx for PgFulfillmentTx {
    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(uuid_of(order_id.0))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn get_product_stock(
        &mut self,
        product_id: ProductId,
    ) -> Result<Option<StockSnapshot>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, stock, reserved_stock, low_stock_threshold
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(uuid_of(product_id.0))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get_product_stock", e))?;

        row.map(|row| -> Result<StockSnapshot, RepositoryError> {
            Ok(StockSnapshot {
                product_id,
                product_name: col(&row, "name")?,
                stock: col(&row, "stock")?,
                reserved_stock: col(&row, "reserved_stock")?,
                low_stock_threshold: col(&row, "low_stock_threshold")?,
            })
        })
        .transpose()
    }

    async fn decrement_product_stock(
        &mut self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(uuid_of(product_id.0))
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("decrement_product_stock", e))?;

        match row {
            Some(row) => col(&row, "stock"),
            None => Err(RepositoryError::Conflict(format!(
                "product {product_id}: missing or stock cannot cover {quantity}"
            ))),
        }
    }

    async fn append_movement(&mut self, movement: &StockMovement) -> Result<(), RepositoryError> {
        insert_movement(&mut self.tx, movement).await
    }

    async fn mark_order_processed(
        &mut self,
        order: &OrderRecord,
        expected_version: ExpectedVersion,
    ) -> Result<(), RepositoryError> {
        update_order(&mut self.tx, order, expected_version).await
    }

    async fn record_activity(&mut self, activity: &Activity) -> Result<(), RepositoryError> {
        insert_activity(&mut *self.tx, activity).await
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl StockRepository for PostgresStockRepository {
    #[instrument(
        skip(self, product_ids),
        fields(
            order_id = %order_id,
            product_count = product_ids.len(),
            locked_products = tracing::field::Empty
        ),
        err
    )]
    async fn begin(
        &self,
        order_id: OrderId,
        product_ids: &[ProductId],
    ) -> Result<Box<dyn FulfillmentTx>, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
            .bind(uuid_of(order_id.0))
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order", e))?;

        let mut ids: Vec<Uuid> = product_ids.iter().map(|p| uuid_of(p.0)).collect();
        ids.sort();
        ids.dedup();
        let locked = sqlx::query("SELECT id FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_products", e))?;

        Span::current().record("locked_products", locked.len());
        Ok(Box::new(PgFulfillmentTx { tx }))
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name, id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;
        rows.iter().map(product_from_row).collect()
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(uuid_of(product_id.0))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self, product), fields(product_id = %product.id, sku = %product.sku), err)]
    async fn insert_product(
        &self,
        product: &Product,
        created_by: Option<UserId>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(uuid_of(product.id.0))
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.code)
        .bind(to_i64(product.price, "price")?)
        .bind(to_i64(product.cost, "cost")?)
        .bind(product.stock)
        .bind(product.low_stock_threshold)
        .bind(product.reserved_stock)
        .bind(product.max_stock)
        .bind(product.reorder_point)
        .bind(product.category_id.map(|c| uuid_of(c.0)))
        .bind(product.supplier_id.map(|s| uuid_of(s.0)))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;

        if product.stock > 0 {
            let opening =
                StockMovement::initial(product.id, product.stock, created_by, product.created_at);
            insert_movement(&mut tx, &opening).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn list_orders(&self) -> Result<Vec<OrderRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY order_date DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;
        rows.iter().map(order_from_row).collect()
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(uuid_of(order_id.0))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;
        row.as_ref().map(order_from_row).transpose()
    }

    #[instrument(skip(self, order), fields(order_id = %order.id, order_number = %order.order_number), err)]
    async fn insert_order(&self, order: &OrderRecord) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(uuid_of(order.id.0))
        .bind(&order.order_number)
        .bind(order.supplier_id.map(|s| uuid_of(s.0)))
        .bind(order.status.as_str())
        .bind(Json(&order.items))
        .bind(to_i64(order.total_amount, "total_amount")?)
        .bind(order.order_date)
        .bind(order.expected_delivery)
        .bind(order.processed_at)
        .bind(&order.cancel_reason)
        .bind(order.created_by.map(|u| *u.as_uuid()))
        .bind(to_i64(order.version, "version")?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id, version = order.version), err)]
    async fn save_order(
        &self,
        order: &OrderRecord,
        expected_version: ExpectedVersion,
    ) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        update_order(&mut tx, order, expected_version).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn list_movements(
        &self,
        filter: MovementFilter,
    ) -> Result<Vec<StockMovement>, RepositoryError> {
        let limit = sql_limit(filter.limit);
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE ($1::uuid IS NULL OR product_id = $1) \
             ORDER BY created_at DESC, seq DESC \
             LIMIT $2"
        ))
        .bind(filter.product_id.map(|p| uuid_of(p.0)))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    async fn list_activities(&self, limit: Option<usize>) -> Result<Vec<Activity>, RepositoryError> {
        let limit = sql_limit(limit);
        let rows = sqlx::query(
            r#"
            SELECT id, activity_type, description, actor, metadata, created_at
            FROM activities
            ORDER BY created_at DESC, seq DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_activities", e))?;
        rows.iter().map(activity_from_row).collect()
    }

    async fn record_activity(&self, activity: &Activity) -> Result<(), RepositoryError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        insert_activity(&mut conn, activity).await
    }
}

async fn insert_movement(
    tx: &mut Transaction<'static, Postgres>,
    movement: &StockMovement,
) -> Result<(), RepositoryError> {
    sqlx::query(&format!(
        "INSERT INTO stock_movements ({MOVEMENT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    ))
    .bind(uuid_of(movement.id.0))
    .bind(uuid_of(movement.product_id.0))
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity)
    .bind(movement.reference_type.map(|r| r.as_str()))
    .bind(movement.reference_id.map(uuid_of))
    .bind(&movement.reason)
    .bind(movement.previous_stock)
    .bind(movement.new_stock)
    .bind(movement.created_by.map(|u| *u.as_uuid()))
    .bind(movement.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;
    Ok(())
}

async fn insert_activity(
    conn: &mut sqlx::PgConnection,
    activity: &Activity,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO activities (id, activity_type, description, actor, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(uuid_of(activity.id.0))
    .bind(activity.activity_type.as_str())
    .bind(&activity.description)
    .bind(activity.actor.map(|u| *u.as_uuid()))
    .bind(activity.metadata.as_ref().map(Json))
    .bind(activity.created_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_activity", e))?;
    Ok(())
}

/// Version-checked order update inside an open transaction.
async fn update_order(
    tx: &mut Transaction<'static, Postgres>,
    order: &OrderRecord,
    expected_version: ExpectedVersion,
) -> Result<(), RepositoryError> {
    let row = sqlx::query("SELECT version FROM orders WHERE id = $1 FOR UPDATE")
        .bind(uuid_of(order.id.0))
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("check_order_version", e))?
        .ok_or_else(|| RepositoryError::NotFound(format!("order {}", order.id)))?;
    let current: i64 = col(&row, "version")?;
    check_version(order.id, expected_version, to_u64(current, "version")?)?;

    sqlx::query(
        r#"
        UPDATE orders
        SET status = $2,
            items = $3,
            total_amount = $4,
            expected_delivery = $5,
            processed_at = $6,
            cancel_reason = $7,
            version = $8
        WHERE id = $1
        "#,
    )
    .bind(uuid_of(order.id.0))
    .bind(order.status.as_str())
    .bind(Json(&order.items))
    .bind(to_i64(order.total_amount, "total_amount")?)
    .bind(order.expected_delivery)
    .bind(order.processed_at)
    .bind(&order.cancel_reason)
    .bind(to_i64(order.version, "version")?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_order", e))?;
    Ok(())
}

fn uuid_of(id: AggregateId) -> Uuid {
    *id.as_uuid()
}

fn aggregate_id(uuid: Uuid) -> AggregateId {
    AggregateId::from_uuid(uuid)
}

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| RepositoryError::Corrupt(format!("column '{name}': {e}")))
}

fn to_i64(value: u64, field: &str) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::Conflict(format!("{field} {value} exceeds BIGINT range")))
}

/// `LIMIT` bind value; absent or oversized limits mean no limit.
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(i64::MAX, |l| i64::try_from(l).unwrap_or(i64::MAX))
}

fn to_u64(value: i64, field: &str) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("{field} is negative: {value}")))
}

fn product_from_row(row: &PgRow) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: ProductId::new(aggregate_id(col(row, "id")?)),
        name: col(row, "name")?,
        sku: col(row, "sku")?,
        code: col(row, "code")?,
        price: to_u64(col(row, "price")?, "price")?,
        cost: to_u64(col(row, "cost")?, "cost")?,
        stock: col(row, "stock")?,
        low_stock_threshold: col(row, "low_stock_threshold")?,
        reserved_stock: col(row, "reserved_stock")?,
        max_stock: col(row, "max_stock")?,
        reorder_point: col(row, "reorder_point")?,
        category_id: col::<Option<Uuid>>(row, "category_id")?
            .map(|u| CategoryId::new(aggregate_id(u))),
        supplier_id: col::<Option<Uuid>>(row, "supplier_id")?
            .map(|u| SupplierId::new(aggregate_id(u))),
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<OrderRecord, RepositoryError> {
    let status: String = col(row, "status")?;
    let items: Json<Vec<OrderItem>> = col(row, "items")?;
    Ok(OrderRecord {
        id: OrderId::new(aggregate_id(col(row, "id")?)),
        order_number: col(row, "order_number")?,
        supplier_id: col::<Option<Uuid>>(row, "supplier_id")?
            .map(|u| SupplierId::new(aggregate_id(u))),
        status: status
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("order status: {e}")))?,
        items: items.0,
        total_amount: to_u64(col(row, "total_amount")?, "total_amount")?,
        order_date: col(row, "order_date")?,
        expected_delivery: col(row, "expected_delivery")?,
        processed_at: col(row, "processed_at")?,
        cancel_reason: col(row, "cancel_reason")?,
        created_by: col::<Option<Uuid>>(row, "created_by")?.map(UserId::from_uuid),
        version: to_u64(col(row, "version")?, "version")?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<StockMovement, RepositoryError> {
    let movement_type: String = col(row, "movement_type")?;
    let reference_type: Option<String> = col(row, "reference_type")?;
    let created_at: DateTime<Utc> = col(row, "created_at")?;
    Ok(StockMovement {
        id: MovementId::new(aggregate_id(col(row, "id")?)),
        product_id: ProductId::new(aggregate_id(col(row, "product_id")?)),
        movement_type: movement_type
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("movement_type: {e}")))?,
        quantity: col(row, "quantity")?,
        reference_type: reference_type
            .map(|r| r.parse())
            .transpose()
            .map_err(|e| RepositoryError::Corrupt(format!("reference_type: {e}")))?,
        reference_id: col::<Option<Uuid>>(row, "reference_id")?.map(aggregate_id),
        reason: col(row, "reason")?,
        previous_stock: col(row, "previous_stock")?,
        new_stock: col(row, "new_stock")?,
        created_by: col::<Option<Uuid>>(row, "created_by")?.map(UserId::from_uuid),
        created_at,
    })
}

fn activity_from_row(row: &PgRow) -> Result<Activity, RepositoryError> {
    let activity_type: String = col(row, "activity_type")?;
    let metadata: Option<Json<serde_json::Value>> = col(row, "metadata")?;
    Ok(Activity {
        id: ActivityId::new(aggregate_id(col(row, "id")?)),
        activity_type: ActivityType::parse(&activity_type).ok_or_else(|| {
            RepositoryError::Corrupt(format!("unknown activity type '{activity_type}'"))
        })?,
        description: col(row, "description")?,
        actor: col::<Option<Uuid>>(row, "actor")?.map(UserId::from_uuid),
        metadata: metadata.map(|m| m.0),
        created_at: col(row, "created_at")?,
    })
}

/// Map SQLx errors to RepositoryError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23514") => RepositoryError::Conflict(msg),
                _ => RepositoryError::Backend(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            RepositoryError::Corrupt(format!("{operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            RepositoryError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => RepositoryError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_conversions_reject_out_of_range() {
        assert_eq!(to_i64(42, "price").unwrap(), 42);
        assert!(matches!(to_i64(u64::MAX, "price"), Err(RepositoryError::Conflict(_))));
        assert!(matches!(to_u64(-1, "version"), Err(RepositoryError::Corrupt(_))));
    }

    #[test]
    fn oversized_limits_clamp_instead_of_wrapping() {
        assert_eq!(sql_limit(None), i64::MAX);
        assert_eq!(sql_limit(Some(50)), 50);
        assert_eq!(sql_limit(Some(usize::MAX)), i64::MAX);
    }

    #[test]
    fn pool_closed_maps_to_backend() {
        let err = map_sqlx_error("list_orders", sqlx::Error::PoolClosed);
        assert!(matches!(err, RepositoryError::Backend(msg) if msg.contains("list_orders")));
    }

    #[test]
    fn schema_enforces_non_negative_stock() {
        assert!(SCHEMA.iter().any(|s| s.contains("CHECK (stock >= 0)")));
    }
}
