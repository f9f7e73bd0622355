//! PostgreSQL document store for deals.
//!
//! Deals are stored as JSONB documents keyed by deal id + owner id, with a
//! bigint version column for the compare-and-swap update path. Single-row
//! writes are atomic; no multi-document transactions are assumed.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::error::StoreError;
use crate::repository::{DealRecord, DealRepository};
use async_trait::async_trait;
use dealbook_domain::{Deal, DealId, OwnerId};
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// PostgreSQL-backed deal repository.
pub struct PgDealStore {
    pool: Arc<PgPool>,
}

impl PgDealStore {
    /// Create a new PostgreSQL deal store.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the deals table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deals (
                id UUID PRIMARY KEY,
                owner_id UUID NOT NULL,
                doc JSONB NOT NULL,
                version BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS deals_owner_idx ON deals (owner_id);
            "#,
        )
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<DealRecord, StoreError> {
        let doc: serde_json::Value = row
            .try_get("doc")
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let version: i64 = row
            .try_get("version")
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut deal: Deal =
            serde_json::from_value(doc).map_err(|e| StoreError::Serialization(e.to_string()))?;
        // Stored documents may predate multi-leg tracking
        deal.normalize();
        Ok(DealRecord { deal, version })
    }

    fn doc_for(deal: &Deal) -> Result<serde_json::Value, StoreError> {
        serde_json::to_value(deal).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl DealRepository for PgDealStore {
    async fn insert(&self, deal: &Deal) -> Result<DealRecord, StoreError> {
        let doc = Self::doc_for(deal)?;
        sqlx::query(
            "INSERT INTO deals (id, owner_id, doc, version) VALUES ($1, $2, $3, 1)",
        )
        .bind(deal.id)
        .bind(deal.owner_id)
        .bind(&doc)
        .execute(&*self.pool)
        .await?;

        Ok(DealRecord {
            deal: deal.clone(),
            version: 1,
        })
    }

    async fn find(&self, id: DealId, owner_id: OwnerId) -> Result<Option<DealRecord>, StoreError> {
        let row = sqlx::query("SELECT doc, version FROM deals WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<DealRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc, version FROM deals WHERE owner_id = $1 ORDER BY id DESC",
        )
        .bind(owner_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn update(&self, deal: &Deal, expected_version: i64) -> Result<DealRecord, StoreError> {
        let doc = Self::doc_for(deal)?;
        let result = sqlx::query(
            r#"
            UPDATE deals
            SET doc = $4, version = version + 1, updated_at = now()
            WHERE id = $1 AND owner_id = $2 AND version = $3
            "#,
        )
        .bind(deal.id)
        .bind(deal.owner_id)
        .bind(expected_version)
        .bind(&doc)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from a stale version
            let exists =
                sqlx::query("SELECT 1 FROM deals WHERE id = $1 AND owner_id = $2")
                    .bind(deal.id)
                    .bind(deal.owner_id)
                    .fetch_optional(&*self.pool)
                    .await?;
            return if exists.is_some() {
                tracing::warn!(deal_id = %deal.id, expected = expected_version, "version conflict on deal update");
                Err(StoreError::VersionConflict {
                    id: deal.id.to_string(),
                    expected: expected_version,
                })
            } else {
                Err(StoreError::not_found("deal", deal.id.to_string()))
            };
        }

        Ok(DealRecord {
            deal: deal.clone(),
            version: expected_version + 1,
        })
    }

    async fn delete(&self, id: DealId, owner_id: OwnerId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM deals WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&*self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("deal", id.to_string()));
        }
        Ok(())
    }
}
