use crate::output::{self, OutputMode};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use vitrine_core::{ErrorCode, VitrineConfig};
use vitrine_core::db::ConnectionPool;
use vitrine_search::indexer::{BatchIndexer, DEFAULT_BATCH_SIZE, IndexOptions, IndexStats};
use vitrine_search::{EmbeddingGateway, HttpEncoder, TantivyLexicalIndex};

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Records embedded and committed per batch.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Base directory for relative `image_path` values.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub image_root: PathBuf,

    /// Re-embed every record even when its content is unchanged.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct IndexReport {
    #[serde(flatten)]
    stats: IndexStats,
    elapsed_ms: u128,
}

/// Execute `vt index`.
///
/// # Errors
///
/// Returns an error if the catalog or either index cannot be opened or
/// written.
pub fn run_index(args: &IndexArgs, config: &VitrineConfig, mode: OutputMode) -> Result<()> {
    if args.batch_size == 0 {
        anyhow::bail!("--batch-size must be at least 1");
    }

    let storage = &config.storage;
    let pool = ConnectionPool::open(&storage.catalog_path, storage.pool_size)
        .map_err(|err| ErrorCode::CatalogUnavailable.wrap(err))?;
    let lexical = TantivyLexicalIndex::open(&storage.lexical_index_dir)
        .map_err(|err| ErrorCode::LexicalIndexUnavailable.wrap(err))?;
    let gateway = EmbeddingGateway::new(Arc::new(HttpEncoder::new(&config.embedding)));

    let started = Instant::now();
    let stats = BatchIndexer::new(
        &pool,
        &gateway,
        &lexical,
        IndexOptions {
            batch_size: args.batch_size,
            image_root: args.image_root.clone(),
            force: args.force,
        },
    )
    .run()?;
    let report = IndexReport {
        stats,
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(?stats, elapsed_ms = report.elapsed_ms, "index run finished");

    output::render(mode, &report, |r, w| {
        writeln!(
            w,
            "Indexed {} records in {} batches ({} ms)",
            r.stats.scanned, r.stats.batches, r.elapsed_ms
        )?;
        output::kv(w, "embedded", r.stats.embedded)?;
        output::kv(w, "unchanged", r.stats.unchanged)?;
        output::kv(w, "skipped", r.stats.skipped)?;
        if r.stats.skipped > 0 {
            writeln!(w, "Skipped records are searchable by text only; see the log for reasons.")?;
        }
        Ok(())
    })
}
