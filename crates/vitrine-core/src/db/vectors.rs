//! Stored record embeddings (`record_vectors`).

use crate::model::RecordId;
use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};

/// Content hash recorded alongside the stored vector for `id`, if any.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn stored_hash(conn: &Connection, id: &RecordId) -> Result<Option<String>> {
    conn.query_row(
        "SELECT content_hash FROM record_vectors WHERE record_id = ?1",
        [id.as_str()],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("read stored vector hash for {id}"))
}

/// Insert or replace the vector for `id`.
///
/// # Errors
///
/// Returns an error if `embedding` has a NaN or infinite component, or the
/// write fails (for example, `id` is not a record).
pub fn upsert_vector(
    conn: &Connection,
    id: &RecordId,
    content_hash: &str,
    embedding: &[f32],
) -> Result<()> {
    if embedding.iter().any(|v| !v.is_finite()) {
        bail!("vector for {id} has non-finite components");
    }
    let dimension = i64::try_from(embedding.len()).unwrap_or(i64::MAX);
    conn.execute(
        "INSERT INTO record_vectors (record_id, content_hash, dimension, embedding_json)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(record_id) DO UPDATE SET
             content_hash = excluded.content_hash,
             dimension = excluded.dimension,
             embedding_json = excluded.embedding_json",
        params![
            id.as_str(),
            content_hash,
            dimension,
            encode_embedding_json(embedding)
        ],
    )
    .with_context(|| format!("store vector for {id}"))?;
    Ok(())
}

/// Number of stored vectors.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_vectors(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM record_vectors", [], |row| row.get(0))
        .context("count stored vectors")?;
    Ok(u64::try_from(count).unwrap_or_default())
}

/// Encode a vector as the JSON array text sqlite-vec's `vec_f32()` accepts.
#[must_use]
pub fn encode_embedding_json(embedding: &[f32]) -> String {
    let mut encoded = String::from("[");
    for (idx, value) in embedding.iter().enumerate() {
        if idx != 0 {
            encoded.push(',');
        }
        encoded.push_str(&value.to_string());
    }
    encoded.push(']');
    encoded
}
