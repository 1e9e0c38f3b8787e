//! Shame List read API (spec §4.I): a thin wrapper over the Data Store's
//! projection, plus the supplemented admin deactivate operation (see
//! SPEC_FULL.md).

use uuid::Uuid;

use crate::domain::ShameEntry;
use crate::error::StoreError;
use crate::store::Store;

#[derive(Clone)]
pub struct ShameList {
    store: Store,
}

impl ShameList {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// `topN(limit) -> [ShameEntry]`, ordered `displayOrder ASC, bot DESC,
    /// createdAt DESC` (spec §4.I).
    pub async fn top_n(&self, limit: u32) -> Result<Vec<ShameEntry>, StoreError> {
        self.store.list_shame(limit).await
    }

    pub async fn deactivate(&self, analysis_id: Uuid) -> Result<(), StoreError> {
        self.store.deactivate_shame_entry(analysis_id).await
    }
}
