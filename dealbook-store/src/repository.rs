//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the deal aggregate.
//! Implementations can be PostgreSQL (JSONB documents), in-memory, or
//! mock for testing.
//!
//! Every stored deal carries a version counter. Updates must present the
//! version they read; a stale version is rejected with
//! `StoreError::VersionConflict` so the caller can reload and retry.
//! This is what serializes concurrent read-modify-write cycles on the
//! same deal.

use crate::error::StoreError;
use async_trait::async_trait;
use dealbook_domain::{Deal, DealId, OwnerId};

/// A deal document plus its optimistic-concurrency version.
#[derive(Debug, Clone)]
pub struct DealRecord {
    /// The deal aggregate (already normalized from any legacy shape)
    pub deal: Deal,
    /// Version counter, incremented on every successful update
    pub version: i64,
}

/// Repository for Deal aggregates, keyed by deal id + owner id.
///
/// Reads are owner-scoped: a deal owned by someone else is reported as
/// not found, never as a permission error, so ownership is not leaked.
#[async_trait]
pub trait DealRepository: Send + Sync {
    /// Insert a new deal at version 1.
    ///
    /// Fails with `Duplicate` if the id already exists.
    async fn insert(&self, deal: &Deal) -> Result<DealRecord, StoreError>;

    /// Find a deal by id, scoped to its owner.
    async fn find(&self, id: DealId, owner_id: OwnerId) -> Result<Option<DealRecord>, StoreError>;

    /// List all deals for an owner, newest first.
    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<DealRecord>, StoreError>;

    /// Replace a deal document if `expected_version` still matches.
    ///
    /// On success returns the record at `expected_version + 1`. A stale
    /// version fails with `VersionConflict` and writes nothing.
    async fn update(
        &self,
        deal: &Deal,
        expected_version: i64,
    ) -> Result<DealRecord, StoreError>;

    /// Hard-delete a deal, scoped to its owner.
    async fn delete(&self, id: DealId, owner_id: OwnerId) -> Result<(), StoreError>;
}
