//! In-memory collection adapter used for service wiring, demos, and tests.

use std::sync::Mutex;

use super::{CollectionError, EntityCollection, EntityFilter, EntityRecord};

/// Mutex-guarded record list satisfying [`EntityCollection`].
pub struct MemoryCollection {
    records: Mutex<Vec<EntityRecord>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn with_records(records: Vec<EntityRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn insert(&self, record: EntityRecord) {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        records.push(record);
    }

    fn snapshot(&self) -> Result<Vec<EntityRecord>, CollectionError> {
        let records = self
            .records
            .lock()
            .map_err(|_| CollectionError::Unavailable("memory collection poisoned".to_string()))?;
        Ok(records.clone())
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityCollection for MemoryCollection {
    fn find_by_referral_code(&self, code: &str) -> Result<Option<EntityRecord>, CollectionError> {
        let records = self.snapshot()?;
        Ok(records
            .into_iter()
            .find(|record| record.referral_code.as_deref() == Some(code)))
    }

    fn find_by_phone(&self, phone: &str) -> Result<Option<EntityRecord>, CollectionError> {
        let records = self.snapshot()?;
        Ok(records.into_iter().find(|record| record.phone == phone))
    }

    fn count_where(&self, filter: &EntityFilter) -> Result<u64, CollectionError> {
        let records = self.snapshot()?;
        Ok(records.iter().filter(|record| filter.matches(record)).count() as u64)
    }

    fn list(&self) -> Result<Vec<EntityRecord>, CollectionError> {
        self.snapshot()
    }
}
