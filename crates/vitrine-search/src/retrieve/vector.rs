//! Dense KNN over `record_vectors` in the catalog database.

use super::VectorIndex;
use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;
use vitrine_core::RecordId;
use vitrine_core::db::{ConnectionPool, sqlite_vec, vectors::encode_embedding_json};

/// Vector index stored alongside the catalog.
///
/// Uses sqlite-vec's `vec_distance_cosine` when the extension is loaded and
/// falls back to an in-process cosine scan otherwise.
pub struct SqliteVectorIndex {
    pool: Arc<ConnectionPool>,
    dimension: usize,
}

impl SqliteVectorIndex {
    pub fn new(pool: Arc<ConnectionPool>, dimension: usize) -> Self {
        Self { pool, dimension }
    }
}

impl VectorIndex for SqliteVectorIndex {
    fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<RecordId>> {
        let conn = self.pool.get()?;
        knn_search(&conn, query, self.dimension, limit)
    }
}

fn knn_search(
    conn: &Connection,
    query: &[f32],
    dimension: usize,
    limit: usize,
) -> Result<Vec<RecordId>> {
    if query.len() != dimension {
        bail!(
            "query vector dimension mismatch: expected {dimension}, got {}",
            query.len()
        );
    }
    if limit == 0 {
        return Ok(Vec::new());
    }

    if sqlite_vec::is_available(conn) {
        match knn_search_sqlite_vec(conn, query, dimension, limit) {
            Ok(ids) => return Ok(ids),
            Err(err) => debug!("sqlite-vec KNN failed, falling back to in-process scan: {err:#}"),
        }
    }

    knn_search_scan(conn, query, dimension, limit)
}

fn knn_search_sqlite_vec(
    conn: &Connection,
    query: &[f32],
    dimension: usize,
    limit: usize,
) -> Result<Vec<RecordId>> {
    let mut stmt = conn.prepare(
        "SELECT record_id,
                vec_distance_cosine(vec_f32(embedding_json), vec_f32(?1)) AS distance
         FROM record_vectors
         WHERE dimension = ?2
         ORDER BY distance ASC, record_id ASC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(
        params![
            encode_embedding_json(query),
            i64::try_from(dimension).unwrap_or(i64::MAX),
            i64::try_from(limit).unwrap_or(i64::MAX)
        ],
        |row| row.get::<_, String>(0),
    )?;

    rows.map(|row| row.map(RecordId::new).map_err(Into::into))
        .collect()
}

fn knn_search_scan(
    conn: &Connection,
    query: &[f32],
    dimension: usize,
    limit: usize,
) -> Result<Vec<RecordId>> {
    let mut stmt = conn
        .prepare("SELECT record_id, embedding_json FROM record_vectors WHERE dimension = ?1")
        .context("prepare vector scan (vector table missing?)")?;

    let rows = stmt
        .query_map([i64::try_from(dimension).unwrap_or(i64::MAX)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .context("execute vector scan")?;

    let mut scored: Vec<(String, f32)> = Vec::new();
    for row in rows {
        let (record_id, embedding_json) = row.context("read vector row")?;
        let embedding: Vec<f32> = match serde_json::from_str(&embedding_json) {
            Ok(value) => value,
            Err(err) => {
                debug!("skipping malformed vector row for {record_id}: {err}");
                continue;
            }
        };

        if let Some(similarity) = cosine_similarity(query, &embedding) {
            scored.push((record_id, similarity));
        }
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(limit);

    Ok(scored.into_iter().map(|(id, _)| RecordId::new(id)).collect())
}

/// Cosine similarity in `[-1, 1]`; `None` for mismatched or zero vectors.
#[must_use]
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> Option<f32> {
    if left.len() != right.len() || left.is_empty() {
        return None;
    }

    let mut dot = 0.0_f32;
    let mut left_norm_sq = 0.0_f32;
    let mut right_norm_sq = 0.0_f32;

    for (a, b) in left.iter().zip(right) {
        dot += a * b;
        left_norm_sq += a * a;
        right_norm_sq += b * b;
    }

    let denom = left_norm_sq.sqrt() * right_norm_sq.sqrt();
    if denom <= f32::EPSILON {
        return None;
    }

    Some((dot / denom).clamp(-1.0, 1.0))
}
