//! In-memory storage backend.
//!
//! Keeps the same four-table shape as the database so tests can assert on row
//! counts, and exposes switches to make individual operations fail.

use super::{InsertStage, SaveOutcome, StorageError, DEFAULT_RECOVERY_WINDOW_HOURS};
use crate::model::{Delivery, Item, Order, Payment};
use crate::service::OrderStorage;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Header columns of an order, without the related rows.
#[derive(Debug)]
struct HeaderRow {
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

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<String, HeaderRow>,
    delivery: HashMap<String, Delivery>,
    payment: HashMap<String, Payment>,
    items: Vec<(String, Item)>,
}

/// Number of rows stored per table for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowCounts {
    pub orders: usize,
    pub delivery: usize,
    pub payment: usize,
    pub items: usize,
}

/// How many times each storage operation has been called.
#[derive(Debug, Default)]
struct CallCounts {
    save: AtomicUsize,
    get: AtomicUsize,
    load: AtomicUsize,
}

/// Storage backend holding all rows in memory.
#[derive(Debug)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
    fail_at: Mutex<Option<InsertStage>>,
    unavailable: Mutex<bool>,
    recovery_window: Duration,
    calls: CallCounts,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            fail_at: Mutex::new(None),
            unavailable: Mutex::new(false),
            recovery_window: Duration::hours(DEFAULT_RECOVERY_WINDOW_HOURS),
            calls: CallCounts::default(),
        }
    }

    pub fn with_recovery_window(mut self, window: Duration) -> Self {
        self.recovery_window = window;
        self
    }

    /// Makes every subsequent save fail at `stage`. `None` clears it.
    pub fn fail_saves_at(&self, stage: Option<InsertStage>) {
        *lock(&self.fail_at) = stage;
    }

    /// Makes every operation fail with [`StorageError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        *lock(&self.unavailable) = unavailable;
    }

    /// Removes the delivery row of a stored order so reading it fails.
    pub fn corrupt(&self, order_uid: &str) {
        lock(&self.tables).delivery.remove(order_uid);
    }

    /// Stores an order directly, bypassing failure injection and counters.
    pub fn seed(&self, order: &Order) {
        let mut tables = lock(&self.tables);
        if !tables.orders.contains_key(&order.order_uid) {
            insert_rows(&mut tables, order);
        }
    }

    pub fn row_counts(&self, order_uid: &str) -> RowCounts {
        let tables = lock(&self.tables);
        RowCounts {
            orders: usize::from(tables.orders.contains_key(order_uid)),
            delivery: usize::from(tables.delivery.contains_key(order_uid)),
            payment: usize::from(tables.payment.contains_key(order_uid)),
            items: tables.items.iter().filter(|(uid, _)| uid == order_uid).count(),
        }
    }

    /// Number of stored order headers.
    pub fn order_count(&self) -> usize {
        lock(&self.tables).orders.len()
    }

    pub fn save_calls(&self) -> usize {
        self.calls.save.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.calls.get.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> usize {
        self.calls.load.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if *lock(&self.unavailable) {
            return Err(StorageError::Unavailable("memory storage switched off".into()));
        }
        Ok(())
    }

    fn read(tables: &Tables, order_uid: &str) -> Result<Order, StorageError> {
        let header = tables
            .orders
            .get(order_uid)
            .ok_or_else(|| StorageError::NotFound(order_uid.to_owned()))?;
        let delivery = tables
            .delivery
            .get(order_uid)
            .ok_or_else(|| StorageError::Incomplete {
                order_uid: order_uid.to_owned(),
                missing: "delivery",
            })?;
        let payment = tables
            .payment
            .get(order_uid)
            .ok_or_else(|| StorageError::Incomplete {
                order_uid: order_uid.to_owned(),
                missing: "payment",
            })?;
        let items = tables
            .items
            .iter()
            .filter(|(uid, _)| uid == order_uid)
            .map(|(_, item)| item.clone())
            .collect();

        Ok(Order {
            order_uid: order_uid.to_owned(),
            track_number: header.track_number.clone(),
            entry: header.entry.clone(),
            delivery: delivery.clone(),
            payment: payment.clone(),
            items,
            locale: header.locale.clone(),
            internal_signature: header.internal_signature.clone(),
            customer_id: header.customer_id.clone(),
            delivery_service: header.delivery_service.clone(),
            shardkey: header.shardkey.clone(),
            sm_id: header.sm_id,
            date_created: header.date_created,
            oof_shard: header.oof_shard.clone(),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn insert_rows(tables: &mut Tables, order: &Order) {
    let uid = order.order_uid.clone();
    tables.orders.insert(
        uid.clone(),
        HeaderRow {
            track_number: order.track_number.clone(),
            entry: order.entry.clone(),
            locale: order.locale.clone(),
            internal_signature: order.internal_signature.clone(),
            customer_id: order.customer_id.clone(),
            delivery_service: order.delivery_service.clone(),
            shardkey: order.shardkey.clone(),
            sm_id: order.sm_id,
            date_created: order.date_created,
            oof_shard: order.oof_shard.clone(),
        },
    );
    tables.delivery.insert(uid.clone(), order.delivery.clone());
    tables.payment.insert(uid.clone(), order.payment.clone());
    tables
        .items
        .extend(order.items.iter().map(|item| (uid.clone(), item.clone())));
}

fn injected(stage: InsertStage, order_uid: &str) -> StorageError {
    StorageError::Insert {
        stage,
        order_uid: order_uid.to_owned(),
        source: format!("injected failure at {stage}").into(),
    }
}

#[async_trait]
impl OrderStorage for MemoryStorage {
    async fn save_order(&self, order: &Order) -> Result<SaveOutcome, StorageError> {
        self.calls.save.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let fail_at = *lock(&self.fail_at);
        let uid = order.order_uid.as_str();

        let mut tables = lock(&self.tables);
        if fail_at == Some(InsertStage::Header) {
            return Err(injected(InsertStage::Header, uid));
        }
        if tables.orders.contains_key(uid) {
            debug!(order_uid = %uid, "Header already present, skipping insert");
            return Ok(SaveOutcome::AlreadyPresent);
        }

        // All stages are checked before the first row is written.
        let stages = [InsertStage::Delivery, InsertStage::Payment]
            .into_iter()
            .chain((0..order.items.len()).map(InsertStage::Item));
        for stage in stages {
            if fail_at == Some(stage) {
                return Err(injected(stage, uid));
            }
        }
        insert_rows(&mut tables, order);
        Ok(SaveOutcome::Inserted)
    }

    async fn get_order(&self, order_uid: &str) -> Result<Order, StorageError> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Self::read(&lock(&self.tables), order_uid)
    }

    async fn load_orders(&self) -> Result<Vec<Order>, StorageError> {
        self.calls.load.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let cutoff = Utc::now() - self.recovery_window;
        let tables = lock(&self.tables);

        let mut recent: Vec<(&String, DateTime<Utc>)> = tables
            .orders
            .iter()
            .filter(|(_, header)| header.date_created >= cutoff)
            .map(|(uid, header)| (uid, header.date_created))
            .collect();
        recent.sort_by_key(|(_, created)| *created);

        let mut orders = Vec::with_capacity(recent.len());
        for (uid, _) in recent {
            match Self::read(&tables, uid) {
                Ok(order) => orders.push(order),
                Err(e) => warn!(order_uid = %uid, error = %e, "Skipping order during recovery"),
            }
        }
        Ok(orders)
    }
}
