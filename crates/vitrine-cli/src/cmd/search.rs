use crate::output::{self, OutputMode};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use vitrine_core::{Record, VitrineConfig};
use vitrine_search::{Component, FusedCandidate, SearchRequest};
use vitrine_server::AppState;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Free-text query.
    #[arg(default_value = "")]
    pub text: String,

    /// Image file to search with.
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Number of results (default from config).
    #[arg(short = 'n', long = "limit")]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    rank: usize,
    #[serde(flatten)]
    record: Record,
    score: Option<f64>,
    vector_rank: Option<usize>,
    lexical_rank: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SearchReport {
    results: Vec<SearchHit>,
    degraded: Vec<Component>,
}

/// Execute `vt search` against the configured local indexes.
///
/// # Errors
///
/// Returns an error if the image cannot be read, any collaborator fails to
/// initialise, or the query itself is rejected.
pub fn run_search(args: &SearchArgs, config: &VitrineConfig, mode: OutputMode) -> Result<()> {
    let image = args
        .image
        .as_ref()
        .map(|path| std::fs::read(path).with_context(|| format!("read {}", path.display())))
        .transpose()?;
    let request = SearchRequest {
        text: Some(args.text.clone()),
        image,
        top_k: args.limit,
    };

    let state = AppState::from_config(config)?;
    let response = state
        .search
        .search(&request)
        .map_err(|err| err.code().wrap(err.into()))?;

    let report = SearchReport {
        results: hits(response.results, &response.ranking),
        degraded: response.degraded,
    };
    output::render(mode, &report, |r, w| {
        if r.results.is_empty() {
            writeln!(w, "No results.")?;
        }
        for hit in &r.results {
            writeln!(
                w,
                "{:>3}. {:<12} {}  [{}]",
                hit.rank,
                hit.record.record_id,
                hit.record.name,
                rank_summary(hit)
            )?;
            if let Some(group) = &hit.record.category.product_group {
                writeln!(w, "     {group}")?;
            }
        }
        if !r.degraded.is_empty() {
            let parts: Vec<String> = r
                .degraded
                .iter()
                .map(|c| format!("{} ({})", c.as_str(), c.code()))
                .collect();
            output::kv(w, "degraded", parts.join(", "))?;
        }
        Ok(())
    })
}

fn hits(records: Vec<Record>, ranking: &[FusedCandidate]) -> Vec<SearchHit> {
    let by_id: HashMap<&str, &FusedCandidate> = ranking
        .iter()
        .map(|c| (c.record_id.as_str(), c))
        .collect();

    records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            let fused = by_id.get(record.record_id.as_str()).copied();
            let rank_in = |list: usize| fused.and_then(|c| c.ranks.get(list).copied().flatten());
            SearchHit {
                rank: idx + 1,
                score: fused.map(|c| c.score),
                vector_rank: rank_in(0),
                lexical_rank: rank_in(1),
                record,
            }
        })
        .collect()
}

fn rank_summary(hit: &SearchHit) -> String {
    let fmt = |rank: Option<usize>| rank.map_or_else(|| "-".to_string(), |r| r.to_string());
    format!(
        "score {:.4} | vector {} | lexical {}",
        hit.score.unwrap_or_default(),
        fmt(hit.vector_rank),
        fmt(hit.lexical_rank)
    )
}
