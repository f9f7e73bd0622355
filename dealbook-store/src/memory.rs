//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access; the version check in
//! `update` gives the same lost-update protection as the SQL store.

use crate::error::StoreError;
use crate::repository::{DealRecord, DealRepository};
use async_trait::async_trait;
use dealbook_domain::{Deal, DealId, OwnerId};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory deal store for testing
pub struct MemoryStore {
    deals: RwLock<HashMap<DealId, DealRecord>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            deals: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of stored deals
    pub fn deal_count(&self) -> usize {
        self.deals.read().unwrap().len()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        self.deals.write().unwrap().clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DealRepository for MemoryStore {
    async fn insert(&self, deal: &Deal) -> Result<DealRecord, StoreError> {
        let mut deals = self.deals.write().unwrap();
        if deals.contains_key(&deal.id) {
            return Err(StoreError::duplicate("deal", deal.id.to_string()));
        }
        let record = DealRecord {
            deal: deal.clone(),
            version: 1,
        };
        deals.insert(deal.id, record.clone());
        Ok(record)
    }

    async fn find(&self, id: DealId, owner_id: OwnerId) -> Result<Option<DealRecord>, StoreError> {
        let deals = self.deals.read().unwrap();
        Ok(deals
            .get(&id)
            .filter(|r| r.deal.owner_id == owner_id)
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<DealRecord>, StoreError> {
        let deals = self.deals.read().unwrap();
        let mut records: Vec<DealRecord> = deals
            .values()
            .filter(|r| r.deal.owner_id == owner_id)
            .cloned()
            .collect();
        // UUIDv7 ids are time-ordered; newest first
        records.sort_by(|a, b| b.deal.id.cmp(&a.deal.id));
        Ok(records)
    }

    async fn update(&self, deal: &Deal, expected_version: i64) -> Result<DealRecord, StoreError> {
        let mut deals = self.deals.write().unwrap();
        let current = deals
            .get(&deal.id)
            .filter(|r| r.deal.owner_id == deal.owner_id)
            .ok_or_else(|| StoreError::not_found("deal", deal.id.to_string()))?;

        if current.version != expected_version {
            tracing::warn!(
                deal_id = %deal.id,
                expected = expected_version,
                actual = current.version,
                "version conflict on deal update"
            );
            return Err(StoreError::VersionConflict {
                id: deal.id.to_string(),
                expected: expected_version,
            });
        }

        let record = DealRecord {
            deal: deal.clone(),
            version: expected_version + 1,
        };
        deals.insert(deal.id, record.clone());
        Ok(record)
    }

    async fn delete(&self, id: DealId, owner_id: OwnerId) -> Result<(), StoreError> {
        let mut deals = self.deals.write().unwrap();
        match deals.get(&id) {
            Some(r) if r.deal.owner_id == owner_id => {
                deals.remove(&id);
                Ok(())
            },
            _ => Err(StoreError::not_found("deal", id.to_string())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
