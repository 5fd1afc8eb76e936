//! Resolve fused record ids to full catalog records.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use vitrine_core::db::{ConnectionPool, records};
use vitrine_core::{Record, RecordId};

/// System of record reachable with one batched lookup.
pub trait RecordStore: Send + Sync {
    /// Records for the given ids, in any order. Unknown ids are omitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn fetch(&self, ids: &[RecordId]) -> Result<Vec<Record>>;
}

/// [`RecordStore`] over the pooled SQLite catalog.
pub struct SqliteRecordStore {
    pool: Arc<ConnectionPool>,
}

impl SqliteRecordStore {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

impl RecordStore for SqliteRecordStore {
    fn fetch(&self, ids: &[RecordId]) -> Result<Vec<Record>> {
        let mut conn = self.pool.get()?;
        records::fetch_records(&mut conn, ids)
    }
}

/// Hydrated records in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hydrated {
    pub records: Vec<Record>,
    /// Failure reason when the store could not be reached.
    pub degraded: Option<String>,
}

#[derive(Clone)]
pub struct Hydrator {
    store: Arc<dyn RecordStore>,
}

impl Hydrator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Fetch records for `ids` in one batch and return them in `ids` order.
    ///
    /// Unknown ids are dropped and repeated ids hydrate once. A store failure
    /// is logged and yields an empty, degraded result.
    #[must_use]
    pub fn hydrate(&self, ids: &[RecordId]) -> Hydrated {
        if ids.is_empty() {
            return Hydrated::default();
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<RecordId> = ids.iter().filter(|id| seen.insert(*id)).cloned().collect();

        let fetched = match self.store.fetch(&unique) {
            Ok(records) => records,
            Err(err) => {
                warn!("catalog lookup failed, returning no results: {err:#}");
                return Hydrated {
                    records: Vec::new(),
                    degraded: Some(format!("{err:#}")),
                };
            }
        };

        let mut by_id: HashMap<RecordId, Record> = fetched
            .into_iter()
            .map(|record| (record.record_id.clone(), record))
            .collect();

        let records: Vec<Record> = unique.iter().filter_map(|id| by_id.remove(id)).collect();
        if records.len() < unique.len() {
            debug!(
                requested = unique.len(),
                found = records.len(),
                "dropped ids with no catalog record"
            );
        }

        Hydrated {
            records,
            degraded: None,
        }
    }
}
