use crate::output::{self, OutputMode};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;
use vitrine_core::db::{self, records::{self, ImportMode}};
use vitrine_core::{ErrorCode, Record, VitrineConfig};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSONL file with one product record per line.
    #[arg(value_name = "PATH")]
    pub input: PathBuf,

    /// Delete every existing record (and its vectors) before importing.
    #[arg(long)]
    pub replace: bool,
}

#[derive(Debug, Serialize)]
struct ImportReport {
    input: PathBuf,
    imported: usize,
    replaced: bool,
    total_records: u64,
}

/// Parse `path` as JSONL records. Blank lines are ignored.
///
/// # Errors
///
/// Returns an error naming the line for any unreadable or invalid record,
/// including records with a blank `record_id`.
pub fn read_jsonl(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut out = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("read {} line {line_no}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("{} line {line_no}: invalid record", path.display()))?;
        if record.record_id.is_blank() {
            anyhow::bail!("{} line {line_no}: record_id is blank", path.display());
        }
        out.push(record);
    }
    Ok(out)
}

/// Execute `vt import`. All records land in one transaction or none do.
///
/// # Errors
///
/// Returns an error if the file is invalid or the catalog write fails.
pub fn run_import(args: &ImportArgs, config: &VitrineConfig, mode: OutputMode) -> Result<()> {
    let batch = read_jsonl(&args.input)?;
    let mut conn = db::open_catalog(&config.storage.catalog_path)
        .map_err(|err| ErrorCode::CatalogUnavailable.wrap(err))?;

    let import_mode = if args.replace {
        ImportMode::Replace
    } else {
        ImportMode::Upsert
    };
    let imported = records::import_records(&mut conn, &batch, import_mode)
        .with_context(|| format!("import {}", args.input.display()))?;
    info!(imported, replace = args.replace, "records imported");

    let report = ImportReport {
        input: args.input.clone(),
        imported,
        replaced: args.replace,
        total_records: records::count_records(&conn)?,
    };
    output::render(mode, &report, |r, w| {
        writeln!(
            w,
            "Imported {} records from {}{}",
            r.imported,
            r.input.display(),
            if r.replaced { " (replaced catalog)" } else { "" }
        )?;
        output::kv(w, "catalog", format!("{} records", r.total_records))?;
        writeln!(w, "Run `vt index` to refresh the search indexes.")
    })
}
