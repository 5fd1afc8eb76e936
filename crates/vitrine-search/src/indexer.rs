//! Offline batch indexing from the catalog into both indexes.
//!
//! The lexical index is rebuilt from every catalog record and committed once
//! at the end of the run; a failed run rolls it back and the previous index
//! stays live. A record's vector is recomputed only when the SHA-256 of its
//! embedding text and image bytes differs from the stored hash, and vector
//! batches commit as they go. Records whose image cannot be read or decoded,
//! or whose embedding fails, are skipped with a warning.

use crate::embed::{EmbeddingError, EmbeddingGateway, QueryVector, decode_image};
use crate::retrieve::TantivyLexicalIndex;
use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tantivy::IndexWriter;
use tracing::{info, warn};
use vitrine_core::db::{ConnectionPool, records, vectors};
use vitrine_core::{Record, RecordId};

/// Default records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 64;

const LEXICAL_WRITER_BUDGET: usize = 50_000_000;

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub batch_size: usize,
    /// Base directory for relative `image_path` values.
    pub image_root: PathBuf,
    /// Re-embed every record even when its content hash is unchanged.
    pub force: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            image_root: PathBuf::from("."),
            force: false,
        }
    }
}

/// Counters reported after an indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub scanned: usize,
    pub embedded: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub batches: usize,
}

pub struct BatchIndexer<'a> {
    pool: &'a ConnectionPool,
    gateway: &'a EmbeddingGateway,
    lexical: &'a TantivyLexicalIndex,
    options: IndexOptions,
}

struct Pending<'r> {
    record: &'r Record,
    content_hash: String,
    image: Option<Vec<u8>>,
}

impl<'a> BatchIndexer<'a> {
    pub fn new(
        pool: &'a ConnectionPool,
        gateway: &'a EmbeddingGateway,
        lexical: &'a TantivyLexicalIndex,
        options: IndexOptions,
    ) -> Self {
        Self {
            pool,
            gateway,
            lexical,
            options,
        }
    }

    /// Index the whole catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or either index cannot be read or
    /// written. Per-record embedding failures are counted, not returned.
    pub fn run(&self) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        let mut writer = self.lexical.writer(LEXICAL_WRITER_BUDGET)?;

        if let Err(err) = self.index_all(&writer, &mut stats) {
            if let Err(rollback) = writer.rollback() {
                warn!("lexical rollback failed: {rollback}");
            }
            return Err(err);
        }
        writer.commit().context("commit lexical index")?;

        info!(
            scanned = stats.scanned,
            embedded = stats.embedded,
            unchanged = stats.unchanged,
            skipped = stats.skipped,
            "indexing complete"
        );
        Ok(stats)
    }

    /// Stage the full lexical rebuild on `writer` and write vectors batch by
    /// batch. Nothing is committed to the lexical index here.
    fn index_all(&self, writer: &IndexWriter, stats: &mut IndexStats) -> Result<()> {
        let batch_size = self.options.batch_size.max(1);
        writer
            .delete_all_documents()
            .context("clear lexical index")?;

        let mut after: Option<RecordId> = None;
        loop {
            let batch = {
                let conn = self.pool.get()?;
                records::list_records(&conn, after.as_ref(), batch_size)?
            };
            let Some(last) = batch.last() else {
                return Ok(());
            };
            after = Some(last.record_id.clone());

            for record in &batch {
                self.lexical.upsert_record(writer, record)?;
            }

            let pending = self.pending(&batch, stats)?;
            let embedded: Vec<(&RecordId, String, QueryVector)> = pending
                .into_iter()
                .filter_map(|p| match self.embed_record(p.record, p.image.as_deref()) {
                    Ok(vector) => Some((&p.record.record_id, p.content_hash, vector)),
                    Err(err) => {
                        warn!(record_id = %p.record.record_id, "skipping record: {err}");
                        stats.skipped += 1;
                        None
                    }
                })
                .collect();

            {
                let mut conn = self.pool.get()?;
                let tx = conn.transaction().context("begin vector batch")?;
                for (id, hash, vector) in &embedded {
                    vectors::upsert_vector(&tx, id, hash, vector.as_slice())?;
                }
                tx.commit().context("commit vector batch")?;
            }

            stats.scanned += batch.len();
            stats.embedded += embedded.len();
            stats.batches += 1;
            info!(
                batch = stats.batches,
                records = batch.len(),
                embedded = embedded.len(),
                "indexed batch"
            );
        }
    }

    /// Records in `batch` whose vector needs (re)computing.
    fn pending<'r>(&self, batch: &'r [Record], stats: &mut IndexStats) -> Result<Vec<Pending<'r>>> {
        let conn = self.pool.get()?;
        let mut pending = Vec::with_capacity(batch.len());

        for record in batch {
            let image = match self.load_image(record) {
                Ok(image) => image,
                Err(err) => {
                    warn!(record_id = %record.record_id, "skipping record: {err:#}");
                    stats.skipped += 1;
                    continue;
                }
            };

            let content_hash = content_hash_hex(record.embedding_text(), image.as_deref());
            if !self.options.force
                && vectors::stored_hash(&conn, &record.record_id)?.as_deref()
                    == Some(content_hash.as_str())
            {
                stats.unchanged += 1;
                continue;
            }

            pending.push(Pending {
                record,
                content_hash,
                image,
            });
        }

        Ok(pending)
    }

    fn load_image(&self, record: &Record) -> Result<Option<Vec<u8>>> {
        let Some(image_path) = record.image_path.as_deref() else {
            return Ok(None);
        };
        let path = resolve_image_path(&self.options.image_root, image_path);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("read image {}", path.display()))?;
        Ok(Some(bytes))
    }

    /// Text vector, averaged with the image vector when the record has one.
    /// The image is decoded before any model call.
    fn embed_record(
        &self,
        record: &Record,
        image: Option<&[u8]>,
    ) -> Result<QueryVector, EmbeddingError> {
        let decoded = image.map(decode_image).transpose()?;
        let text_vector = self.gateway.text_vector(record.embedding_text())?;
        match decoded {
            None => Ok(text_vector),
            Some(image) => {
                let image_vector = self.gateway.image_vector(&image)?;
                QueryVector::mean(&text_vector, &image_vector)
            }
        }
    }
}

fn resolve_image_path(root: &Path, image_path: &str) -> PathBuf {
    let path = Path::new(image_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn content_hash_hex(text: &str, image: Option<&[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    if let Some(bytes) = image {
        hasher.update(bytes);
    }
    format!("{:x}", hasher.finalize())
}
