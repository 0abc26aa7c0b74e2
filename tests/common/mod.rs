#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use order_ingest::cache::MemoryCache;
use order_ingest::ingest::{MockBroker, PipelineConfig};
use order_ingest::model::Order;
use order_ingest::service::OrderStorage;
use order_ingest::storage::{MemoryStorage, SaveOutcome, StorageError};
use order_ingest::validator::OrderValidator;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A valid order as it arrives on the topic.
pub const ORDER_JSON: &str = r#"{
  "order_uid": "b563feb7b2b84b6test",
  "track_number": "WBILMTESTTRACK",
  "entry": "WBIL",
  "delivery": {
    "name": "Test Testov",
    "phone": "+9720000000",
    "zip": "2639809",
    "city": "Kiryat Mozkin",
    "address": "Ploshad Mira 15",
    "region": "Kraiot",
    "email": "test@gmail.com"
  },
  "payment": {
    "transaction": "b563feb7b2b84b6test",
    "request_id": "",
    "currency": "USD",
    "provider": "wbpay",
    "amount": 1817,
    "payment_dt": 1637907727,
    "bank": "alpha",
    "delivery_cost": 1500,
    "goods_total": 317,
    "custom_fee": 0
  },
  "items": [
    {
      "chrt_id": 9934930,
      "track_number": "WBILMTESTTRACK",
      "price": 453,
      "rid": "ab4219087a764ae0btest",
      "name": "Mascaras",
      "sale": 30,
      "size": "0",
      "total_price": 317,
      "nm_id": 2389212,
      "brand": "Vivienne Sabo",
      "status": 202
    }
  ],
  "locale": "en",
  "internal_signature": "",
  "customer_id": "test",
  "delivery_service": "meest",
  "shardkey": "9",
  "sm_id": 99,
  "date_created": "2021-11-26T06:22:19Z",
  "oof_shard": "1"
}"#;

/// The fixture order with a different identifier.
pub fn order(order_uid: &str) -> Order {
    let mut order = Order::from_json(ORDER_JSON.as_bytes()).expect("fixture must decode");
    order.order_uid = order_uid.to_string();
    order.payment.transaction = order_uid.to_string();
    order
}

/// The fixture order created `age` ago.
pub fn order_created(order_uid: &str, age: Duration) -> Order {
    let mut order = order(order_uid);
    order.date_created = now_minus(age);
    order
}

fn now_minus(age: Duration) -> DateTime<Utc> {
    Utc::now() - age
}

pub struct Backends {
    pub broker: Arc<MockBroker>,
    pub storage: Arc<MemoryStorage>,
    pub cache: Arc<MemoryCache>,
}

pub fn backends(cache_capacity: usize) -> Backends {
    Backends {
        broker: Arc::new(MockBroker::new()),
        storage: Arc::new(MemoryStorage::new()),
        cache: Arc::new(MemoryCache::new(cache_capacity).expect("valid capacity")),
    }
}

pub fn validator() -> OrderValidator {
    OrderValidator::new().expect("patterns compile")
}

pub fn pipeline_config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        fetch_retry_backoff: std::time::Duration::from_millis(5),
    }
}

/// Storage whose saves wait for a permit, so workers stay busy until released.
pub struct GatedStorage {
    pub inner: Arc<MemoryStorage>,
    gate: Semaphore,
}

impl GatedStorage {
    pub fn closed(inner: Arc<MemoryStorage>) -> Self {
        Self { inner, gate: Semaphore::new(0) }
    }

    /// Lets `saves` more saves through.
    pub fn open(&self, saves: usize) {
        self.gate.add_permits(saves);
    }
}

#[async_trait]
impl OrderStorage for GatedStorage {
    async fn save_order(&self, order: &Order) -> Result<SaveOutcome, StorageError> {
        self.gate.acquire().await.expect("gate is never closed").forget();
        self.inner.save_order(order).await
    }

    async fn get_order(&self, order_uid: &str) -> Result<Order, StorageError> {
        self.inner.get_order(order_uid).await
    }

    async fn load_orders(&self) -> Result<Vec<Order>, StorageError> {
        self.inner.load_orders().await
    }
}
