//! Daily generation quota backed by a [`QuotaStore`]
//!
//! The limit is advisory: two processes sharing one store may both pass
//! [`QuotaTracker::check_and_reserve`] before either commits.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tracing::{debug, info};

use crate::config::DAILY_LIMIT;
use crate::error::GenerationError;
use crate::models::QuotaRecord;
use crate::traits::QuotaStore;

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Quota store living only as long as the process
#[derive(Default)]
pub struct MemoryQuotaStore {
    record: Mutex<Option<QuotaRecord>>,
}

impl MemoryQuotaStore {
    pub fn with_record(record: QuotaRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }

    pub fn snapshot(&self) -> Option<QuotaRecord> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn read(&self) -> Result<Option<QuotaRecord>> {
        Ok(self.snapshot())
    }

    async fn write(&self, record: &QuotaRecord) -> Result<()> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = Some(*record);
        Ok(())
    }
}

#[derive(Clone)]
pub struct QuotaTracker {
    store: Arc<dyn QuotaStore>,
    limit: u32,
    today: Clock,
}

impl QuotaTracker {
    /// Tracker with the default daily limit and the local calendar day
    pub fn new(store: Arc<dyn QuotaStore>) -> Self {
        Self {
            store,
            limit: DAILY_LIMIT,
            today: Arc::new(|| Local::now().date_naive()),
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Replace the source of "today", mostly for tests
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Arc::new(today);
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count for today. A record from another day reads as zero and is left as is.
    async fn used_today(&self) -> Result<u32, GenerationError> {
        let today = (self.today)();
        let record = self.store.read().await.map_err(GenerationError::Storage)?;

        Ok(match record {
            Some(record) if record.date == today => record.count,
            Some(record) => {
                debug!("Ignoring quota record from {}", record.date);
                0
            }
            None => 0,
        })
    }

    /// Returns `(used, limit)` for today
    pub async fn peek(&self) -> Result<(u32, u32), GenerationError> {
        Ok((self.used_today().await?, self.limit))
    }

    /// `true` if another generation may start today. Never mutates the store.
    pub async fn check_and_reserve(&self) -> Result<bool, GenerationError> {
        Ok(self.used_today().await? < self.limit)
    }

    /// Records one successful generation. Only call after the image has arrived.
    pub async fn commit(&self) -> Result<QuotaRecord, GenerationError> {
        let record = QuotaRecord {
            date: (self.today)(),
            count: self.used_today().await? + 1,
        };

        self.store
            .write(&record)
            .await
            .map_err(GenerationError::Storage)?;

        info!("Quota used: {}/{}", record.count, self.limit);
        Ok(record)
    }
}
