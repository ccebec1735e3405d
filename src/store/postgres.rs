use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Row};
use std::time::Duration;

use crate::models::{Delivery, Item, Order, Payment};
use crate::utils::{retry_on_transient, IsTransient, RetryConfig, RetryResult};
use super::{OrderStore, StoreError};

// ============================================================================
// Postgres Order Store
// ============================================================================
//
// Write path: one transaction per order.
//   orders -> deliveries -> payments -> items, then COMMIT.
//   Any failure rolls the whole transaction back before the error returns,
//   so a partially written order is never visible to readers.
//
// Duplicate detection:
//   The EXISTS probe is only a fast path. Two writers racing on the same
//   order_uid both pass it; the primary key on orders is what decides,
//   and its unique violation (SQLSTATE 23505) is mapped to DuplicateKey.
//
// ============================================================================

pub const SCHEMA_SQL: &str = include_str!("../../schema.sql");

const INSERT_ORDER: &str = "INSERT INTO orders (
        order_uid, track_number, entry, locale, internal_signature, customer_id,
        delivery_service, shardkey, sm_id, date_created, oof_shard
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

const INSERT_DELIVERY: &str = "INSERT INTO deliveries (
        order_uid, name, phone, zip, city, address, region, email
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const INSERT_PAYMENT: &str = "INSERT INTO payments (
        order_uid, transaction, request_id, currency, provider, amount,
        payment_dt, bank, delivery_cost, goods_total, custom_fee
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

const INSERT_ITEM: &str = "INSERT INTO items (
        order_uid, chrt_id, track_number, price, rid, name, sale, size,
        total_price, nm_id, brand, status
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

const SELECT_ORDER: &str = "SELECT order_uid, track_number, entry, locale, internal_signature,
        customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
    FROM orders WHERE order_uid = $1";

const SELECT_DELIVERY: &str = "SELECT name, phone, zip, city, address, region, email
    FROM deliveries WHERE order_uid = $1";

const SELECT_PAYMENT: &str = "SELECT transaction, request_id, currency, provider, amount,
        payment_dt, bank, delivery_cost, goods_total, custom_fee
    FROM payments WHERE order_uid = $1";

const SELECT_ITEMS: &str = "SELECT chrt_id, track_number, price, rid, name, sale, size,
        total_price, nm_id, brand, status
    FROM items WHERE order_uid = $1 ORDER BY id ASC";

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool, retrying while the database is still coming up
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        retry: RetryConfig,
    ) -> anyhow::Result<Self> {
        let result = retry_on_transient(retry, |attempt| async move {
            tracing::debug!(attempt = attempt, "Connecting to Postgres");
            PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(url)
                .await
        })
        .await;

        match result {
            RetryResult::Success(pool) => {
                tracing::info!(max_connections = max_connections, "✅ Connected to Postgres");
                Ok(Self::new(pool))
            }
            RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => {
                Err(anyhow::Error::new(e).context("failed to connect to Postgres"))
            }
        }
    }

    /// Create the four order tables if they are missing
    pub async fn bootstrap_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::internal("bootstrap schema", e))?;

        tracing::info!("Order schema is in place");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Postgres pool closed");
    }

    async fn exists(&self, order_uid: &str) -> Result<bool, StoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM orders WHERE order_uid = $1)")
                .bind(order_uid)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::internal("check order exists", e))?;
        Ok(exists)
    }

    async fn insert_rows(conn: &mut PgConnection, order: &Order) -> Result<(), StoreError> {
        sqlx::query(INSERT_ORDER)
            .bind(&order.order_uid)
            .bind(&order.track_number)
            .bind(&order.entry)
            .bind(&order.locale)
            .bind(&order.internal_signature)
            .bind(&order.customer_id)
            .bind(&order.delivery_service)
            .bind(&order.shard_key)
            .bind(order.sm_id)
            .bind(order.date_created)
            .bind(&order.oof_shard)
            .execute(&mut *conn)
            .await
            .map_err(|e| classify_order_insert(&order.order_uid, e))?;

        let delivery = &order.delivery;
        sqlx::query(INSERT_DELIVERY)
            .bind(&order.order_uid)
            .bind(&delivery.name)
            .bind(&delivery.phone)
            .bind(&delivery.zip)
            .bind(&delivery.city)
            .bind(&delivery.address)
            .bind(&delivery.region)
            .bind(&delivery.email)
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::internal("insert delivery", e))?;

        let payment = &order.payment;
        sqlx::query(INSERT_PAYMENT)
            .bind(&order.order_uid)
            .bind(&payment.transaction)
            .bind(&payment.request_id)
            .bind(&payment.currency)
            .bind(&payment.provider)
            .bind(payment.amount)
            .bind(payment.payment_dt)
            .bind(&payment.bank)
            .bind(payment.delivery_cost)
            .bind(payment.goods_total)
            .bind(payment.custom_fee)
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::internal("insert payment", e))?;

        for item in &order.items {
            sqlx::query(INSERT_ITEM)
                .bind(&order.order_uid)
                .bind(item.chrt_id)
                .bind(&item.track_number)
                .bind(item.price)
                .bind(&item.rid)
                .bind(&item.name)
                .bind(item.sale)
                .bind(&item.size)
                .bind(item.total_price)
                .bind(item.nm_id)
                .bind(&item.brand)
                .bind(item.status)
                .execute(&mut *conn)
                .await
                .map_err(|e| StoreError::internal("insert item", e))?;
        }

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        if self.exists(&order.order_uid).await? {
            tracing::debug!(order_uid = %order.order_uid, "Duplicate rejected by existence probe");
            return Err(StoreError::DuplicateKey(order.order_uid.clone()));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::internal("begin transaction", e))?;

        if let Err(e) = Self::insert_rows(&mut tx, order).await {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(
                    order_uid = %order.order_uid,
                    error = %rollback_err,
                    "Rollback failed after insert error"
                );
            }
            return Err(e);
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::internal("commit transaction", e))?;

        tracing::debug!(
            order_uid = %order.order_uid,
            item_count = order.items.len(),
            "Order committed"
        );

        Ok(())
    }

    async fn get_by_id(&self, order_uid: &str) -> Result<Order, StoreError> {
        let not_found = || StoreError::NotFound(order_uid.to_string());

        let row = sqlx::query(SELECT_ORDER)
            .bind(order_uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::internal("query order", e))?
            .ok_or_else(not_found)?;
        let mut order = order_from_row(&row).map_err(|e| StoreError::internal("decode order", e))?;

        let row = sqlx::query(SELECT_DELIVERY)
            .bind(order_uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::internal("query delivery", e))?
            .ok_or_else(not_found)?;
        order.delivery = delivery_from_row(&row).map_err(|e| StoreError::internal("decode delivery", e))?;

        let row = sqlx::query(SELECT_PAYMENT)
            .bind(order_uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::internal("query payment", e))?
            .ok_or_else(not_found)?;
        order.payment = payment_from_row(&row).map_err(|e| StoreError::internal("decode payment", e))?;

        let rows = sqlx::query(SELECT_ITEMS)
            .bind(order_uid)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::internal("query items", e))?;
        if rows.is_empty() {
            tracing::warn!(order_uid = %order_uid, "Order has no item rows, treating as incomplete");
            return Err(not_found());
        }
        order.items = rows
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::internal("decode items", e))?;

        Ok(order)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::internal("ping", e))?;
        Ok(())
    }
}

impl IsTransient for sqlx::Error {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
        )
    }
}

/// Unique violation on the orders primary key means another writer won the race
fn classify_order_insert(order_uid: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            tracing::debug!(
                order_uid = %order_uid,
                constraint = ?db_err.constraint(),
                "Duplicate rejected by unique constraint"
            );
            return StoreError::DuplicateKey(order_uid.to_string());
        }
    }
    StoreError::internal("insert order", err)
}

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shard_key: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
        ..Order::default()
    })
}

fn delivery_from_row(row: &PgRow) -> Result<Delivery, sqlx::Error> {
    Ok(Delivery {
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        zip: row.try_get("zip")?,
        city: row.try_get("city")?,
        address: row.try_get("address")?,
        region: row.try_get("region")?,
        email: row.try_get("email")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        transaction: row.try_get("transaction")?,
        request_id: row.try_get("request_id")?,
        currency: row.try_get("currency")?,
        provider: row.try_get("provider")?,
        amount: row.try_get("amount")?,
        payment_dt: row.try_get("payment_dt")?,
        bank: row.try_get("bank")?,
        delivery_cost: row.try_get("delivery_cost")?,
        goods_total: row.try_get("goods_total")?,
        custom_fee: row.try_get("custom_fee")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}
