use crate::output::{self, OutputMode};
use anyhow::{Context as _, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use vitrine_core::{ErrorCode, VitrineConfig};
use vitrine_core::db::{self, migrations, records, sqlite_vec, vectors};
use vitrine_search::TantivyLexicalIndex;

#[derive(Debug, Serialize)]
struct InitReport {
    catalog: PathBuf,
    lexical_index: PathBuf,
    schema_version: u32,
    sqlite_vec: bool,
    records: u64,
    vectors: u64,
    lexical_docs: u64,
}

/// Execute `vt init`: create (or migrate) the catalog and open the lexical
/// index directory. Running it again reports the current state.
///
/// # Errors
///
/// Returns an error if the catalog or the index directory cannot be created.
pub fn run_init(config: &VitrineConfig, mode: OutputMode) -> Result<()> {
    let storage = &config.storage;
    let conn = db::open_catalog(&storage.catalog_path)
        .map_err(|err| ErrorCode::CatalogUnavailable.wrap(err))?;
    let lexical = TantivyLexicalIndex::open(&storage.lexical_index_dir)
        .map_err(|err| ErrorCode::LexicalIndexUnavailable.wrap(err))?;

    let report = InitReport {
        catalog: storage.catalog_path.clone(),
        lexical_index: storage.lexical_index_dir.clone(),
        schema_version: migrations::current_schema_version(&conn)
            .context("read schema version")?,
        sqlite_vec: sqlite_vec::is_available(&conn),
        records: records::count_records(&conn)?,
        vectors: vectors::count_vectors(&conn)?,
        lexical_docs: lexical.num_docs()?,
    };
    info!(
        catalog = %report.catalog.display(),
        schema_version = report.schema_version,
        "catalog ready"
    );

    output::render(mode, &report, |r, w| {
        writeln!(w, "Initialized vitrine storage")?;
        output::kv(w, "catalog", r.catalog.display())?;
        output::kv(w, "lexical", r.lexical_index.display())?;
        output::kv(w, "schema", format!("v{}", r.schema_version))?;
        output::kv(
            w,
            "sqlite-vec",
            if r.sqlite_vec { "loaded" } else { "unavailable (scan fallback)" },
        )?;
        output::kv(
            w,
            "contents",
            format!(
                "{} records, {} vectors, {} lexical docs",
                r.records, r.vectors, r.lexical_docs
            ),
        )
    })
}
