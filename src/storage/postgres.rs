//! `PostgreSQL` backend on a `sqlx` connection pool.
//!
//! Every save runs in its own transaction; concurrent workers share nothing
//! but the pool. Reads of one order run inside a single read-only
//! `REPEATABLE READ` transaction, so the four queries see one snapshot.

use super::{BackendError, InsertStage, SaveOutcome, StorageError, DEFAULT_RECOVERY_WINDOW_HOURS};
use crate::model::{Delivery, Item, Order, Payment};
use crate::service::OrderStorage;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, info, instrument, warn};

/// Create a `PostgreSQL` connection pool.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &SecretString,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

const INSERT_HEADER: &str = r#"
    INSERT INTO orders (
        order_uid, track_number, entry, locale, internal_signature,
        customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (order_uid) DO NOTHING
"#;

const INSERT_DELIVERY: &str = r#"
    INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

const INSERT_PAYMENT: &str = r#"
    INSERT INTO payment (
        order_uid, transaction, request_id, currency, provider,
        amount, payment_dt, bank, delivery_cost, goods_total, custom_fee
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
"#;

const INSERT_ITEM: &str = r#"
    INSERT INTO items (
        order_uid, chrt_id, track_number, price, rid, name, sale, size,
        total_price, nm_id, brand, status
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
"#;

#[derive(FromRow)]
struct HeaderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i64,
    date_created: DateTime<Utc>,
    oof_shard: String,
}

#[derive(FromRow)]
struct DeliveryRow {
    name: String,
    phone: String,
    zip: String,
    city: String,
    address: String,
    region: String,
    email: String,
}

#[derive(FromRow)]
struct PaymentRow {
    transaction: String,
    request_id: String,
    currency: String,
    provider: String,
    amount: i64,
    payment_dt: i64,
    bank: String,
    delivery_cost: i64,
    goods_total: i64,
    custom_fee: i64,
}

#[derive(FromRow)]
struct ItemRow {
    chrt_id: i64,
    track_number: String,
    price: i64,
    rid: String,
    name: String,
    sale: i64,
    size: String,
    total_price: i64,
    nm_id: i64,
    brand: String,
    status: i64,
}

impl From<DeliveryRow> for Delivery {
    fn from(r: DeliveryRow) -> Self {
        Self {
            name: r.name,
            phone: r.phone,
            zip: r.zip,
            city: r.city,
            address: r.address,
            region: r.region,
            email: r.email,
        }
    }
}

impl From<PaymentRow> for Payment {
    fn from(r: PaymentRow) -> Self {
        Self {
            transaction: r.transaction,
            request_id: r.request_id,
            currency: r.currency,
            provider: r.provider,
            amount: r.amount,
            payment_dt: r.payment_dt,
            bank: r.bank,
            delivery_cost: r.delivery_cost,
            goods_total: r.goods_total,
            custom_fee: r.custom_fee,
        }
    }
}

impl From<ItemRow> for Item {
    fn from(r: ItemRow) -> Self {
        Self {
            chrt_id: r.chrt_id,
            track_number: r.track_number,
            price: r.price,
            rid: r.rid,
            name: r.name,
            sale: r.sale,
            size: r.size,
            total_price: r.total_price,
            nm_id: r.nm_id,
            brand: r.brand,
            status: r.status,
        }
    }
}

fn boxed(e: sqlx::Error) -> BackendError {
    Box::new(e)
}

/// Storage backend for `PostgreSQL`.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    recovery_window: Duration,
}

impl PostgresStorage {
    /// Wraps an existing pool with the default recovery window.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            recovery_window: Duration::hours(DEFAULT_RECOVERY_WINDOW_HOURS),
        }
    }

    /// Overrides how far back [`load_orders`](OrderStorage::load_orders) looks.
    pub fn with_recovery_window(mut self, window: Duration) -> Self {
        self.recovery_window = window;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn begin(&self, order_uid: &str) -> Result<Transaction<'static, Postgres>, StorageError> {
        self.pool
            .begin()
            .await
            .map_err(|e| StorageError::Transaction {
                order_uid: order_uid.to_owned(),
                source: boxed(e),
            })
    }

    async fn insert_children(
        tx: &mut Transaction<'static, Postgres>,
        order: &Order,
    ) -> Result<(), StorageError> {
        let uid = order.order_uid.as_str();
        let insert_err = |stage: InsertStage| {
            move |e: sqlx::Error| StorageError::Insert {
                stage,
                order_uid: uid.to_owned(),
                source: boxed(e),
            }
        };

        let d = &order.delivery;
        sqlx::query(INSERT_DELIVERY)
            .bind(uid)
            .bind(&d.name)
            .bind(&d.phone)
            .bind(&d.zip)
            .bind(&d.city)
            .bind(&d.address)
            .bind(&d.region)
            .bind(&d.email)
            .execute(&mut **tx)
            .await
            .map_err(insert_err(InsertStage::Delivery))?;

        let p = &order.payment;
        sqlx::query(INSERT_PAYMENT)
            .bind(uid)
            .bind(&p.transaction)
            .bind(&p.request_id)
            .bind(&p.currency)
            .bind(&p.provider)
            .bind(p.amount)
            .bind(p.payment_dt)
            .bind(&p.bank)
            .bind(p.delivery_cost)
            .bind(p.goods_total)
            .bind(p.custom_fee)
            .execute(&mut **tx)
            .await
            .map_err(insert_err(InsertStage::Payment))?;

        for (index, item) in order.items.iter().enumerate() {
            sqlx::query(INSERT_ITEM)
                .bind(uid)
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
                .execute(&mut **tx)
                .await
                .map_err(insert_err(InsertStage::Item(index)))?;
        }
        Ok(())
    }

    async fn read_order(
        tx: &mut Transaction<'static, Postgres>,
        order_uid: &str,
    ) -> Result<Order, StorageError> {
        let query_err = |what: &'static str| {
            move |e: sqlx::Error| StorageError::Query {
                what,
                order_uid: order_uid.to_owned(),
                source: boxed(e),
            }
        };

        let header: HeaderRow = sqlx::query_as(
            r#"
            SELECT order_uid, track_number, entry, locale, internal_signature,
                   customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            FROM orders WHERE order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(&mut **tx)
        .await
        .map_err(query_err("orders"))?
        .ok_or_else(|| StorageError::NotFound(order_uid.to_owned()))?;

        let delivery: DeliveryRow = sqlx::query_as(
            "SELECT name, phone, zip, city, address, region, email FROM delivery WHERE order_uid = $1",
        )
        .bind(order_uid)
        .fetch_optional(&mut **tx)
        .await
        .map_err(query_err("delivery"))?
        .ok_or_else(|| StorageError::Incomplete {
            order_uid: order_uid.to_owned(),
            missing: "delivery",
        })?;

        let payment: PaymentRow = sqlx::query_as(
            r#"
            SELECT transaction, request_id, currency, provider, amount, payment_dt, bank,
                   delivery_cost, goods_total, custom_fee
            FROM payment WHERE order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(&mut **tx)
        .await
        .map_err(query_err("payment"))?
        .ok_or_else(|| StorageError::Incomplete {
            order_uid: order_uid.to_owned(),
            missing: "payment",
        })?;

        let items: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT chrt_id, track_number, price, rid, name, sale, size,
                   total_price, nm_id, brand, status
            FROM items WHERE order_uid = $1
            ORDER BY id
            "#,
        )
        .bind(order_uid)
        .fetch_all(&mut **tx)
        .await
        .map_err(query_err("items"))?;

        Ok(Order {
            order_uid: header.order_uid,
            track_number: header.track_number,
            entry: header.entry,
            delivery: delivery.into(),
            payment: payment.into(),
            items: items.into_iter().map(Item::from).collect(),
            locale: header.locale,
            internal_signature: header.internal_signature,
            customer_id: header.customer_id,
            delivery_service: header.delivery_service,
            shardkey: header.shardkey,
            sm_id: header.sm_id,
            date_created: header.date_created,
            oof_shard: header.oof_shard,
        })
    }
}

#[async_trait]
impl OrderStorage for PostgresStorage {
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    async fn save_order(&self, order: &Order) -> Result<SaveOutcome, StorageError> {
        let uid = order.order_uid.as_str();
        let mut tx = self.begin(uid).await?;

        let inserted = sqlx::query(INSERT_HEADER)
            .bind(uid)
            .bind(&order.track_number)
            .bind(&order.entry)
            .bind(&order.locale)
            .bind(&order.internal_signature)
            .bind(&order.customer_id)
            .bind(&order.delivery_service)
            .bind(&order.shardkey)
            .bind(order.sm_id)
            .bind(order.date_created)
            .bind(&order.oof_shard)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Insert {
                stage: InsertStage::Header,
                order_uid: uid.to_owned(),
                source: boxed(e),
            })?
            .rows_affected();

        if inserted == 0 {
            // Dropping the transaction rolls it back; nothing was written.
            drop(tx);
            debug!("Header already present, skipping insert");
            return Ok(SaveOutcome::AlreadyPresent);
        }

        // An early return drops `tx`, which rolls back every insert so far.
        Self::insert_children(&mut tx, order).await?;

        tx.commit().await.map_err(|e| StorageError::Transaction {
            order_uid: uid.to_owned(),
            source: boxed(e),
        })?;
        debug!(items = order.items.len(), "Saved");
        Ok(SaveOutcome::Inserted)
    }

    #[instrument(skip(self))]
    async fn get_order(&self, order_uid: &str) -> Result<Order, StorageError> {
        let mut tx = self.begin(order_uid).await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Transaction {
                order_uid: order_uid.to_owned(),
                source: boxed(e),
            })?;

        let order = Self::read_order(&mut tx, order_uid).await?;

        tx.commit().await.map_err(|e| StorageError::Transaction {
            order_uid: order_uid.to_owned(),
            source: boxed(e),
        })?;
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn load_orders(&self) -> Result<Vec<Order>, StorageError> {
        let cutoff = Utc::now() - self.recovery_window;
        let uids: Vec<String> = sqlx::query_scalar(
            "SELECT order_uid FROM orders WHERE date_created >= $1 ORDER BY date_created",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query {
            what: "recent orders",
            order_uid: String::from("*"),
            source: boxed(e),
        })?;

        let mut orders = Vec::with_capacity(uids.len());
        for uid in uids {
            match self.get_order(&uid).await {
                Ok(order) => orders.push(order),
                Err(e) => warn!(order_uid = %uid, error = %e, "Skipping order during recovery"),
            }
        }
        info!(count = orders.len(), %cutoff, "Loaded recent orders");
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    //! These run against a real database: set `TEST_DATABASE_URL` to a
    //! scratch database with `schema.sql` applied and run with `--ignored`.

    use super::*;
    use crate::test_support::sample_order;

    async fn storage() -> PostgresStorage {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL not set");
        let pool = create_pool(&SecretString::from(url), 4).await.unwrap();
        PostgresStorage::new(pool)
    }

    async fn row_count(pool: &PgPool, table: &str, uid: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE order_uid = $1"))
            .bind(uid)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn test_save_then_get_round_trips_all_tables() {
        let storage = storage().await;
        let uid = format!("pg-{}", Utc::now().timestamp_nanos_opt().unwrap());
        let mut order = sample_order(&uid);
        order.date_created = Utc::now();
        let mut second = order.items[0].clone();
        second.rid = "second".into();
        order.items.push(second);

        assert_eq!(storage.save_order(&order).await.unwrap(), SaveOutcome::Inserted);
        let got = storage.get_order(&uid).await.unwrap();
        assert_eq!(got.items.len(), 2);
        assert_eq!(got.items[1].rid, "second");
        assert_eq!(got.delivery, order.delivery);
        assert_eq!(got.payment, order.payment);
    }

    #[tokio::test]
    #[ignore]
    async fn test_repeated_saves_leave_one_copy() {
        let storage = storage().await;
        let uid = format!("pg-dup-{}", Utc::now().timestamp_nanos_opt().unwrap());
        let order = sample_order(&uid);

        assert_eq!(storage.save_order(&order).await.unwrap(), SaveOutcome::Inserted);
        for _ in 0..3 {
            assert_eq!(
                storage.save_order(&order).await.unwrap(),
                SaveOutcome::AlreadyPresent
            );
        }
        let pool = storage.pool();
        assert_eq!(row_count(pool, "orders", &uid).await, 1);
        assert_eq!(row_count(pool, "delivery", &uid).await, 1);
        assert_eq!(row_count(pool, "payment", &uid).await, 1);
        assert_eq!(row_count(pool, "items", &uid).await, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_missing_order_is_not_found() {
        let storage = storage().await;
        let err = storage.get_order("does-not-exist").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
