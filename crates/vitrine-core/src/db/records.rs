//! Reads and writes against the `records` table.

use crate::model::{CategoryMeta, Record, RecordId};
use anyhow::{Context, Result};
use rusqlite::{Connection, Row, Transaction, params};
use tracing::warn;

const RECORD_COLUMNS: &str =
    "record_id, name, description, image_path, product_group, colour_group, section";

/// How an import treats rows already in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Insert new rows and overwrite rows with the same id.
    Upsert,
    /// Delete every existing row first.
    Replace,
}

/// Fetch the records for `ids` in one batched lookup.
///
/// Runs inside a read transaction; on failure the transaction is rolled back
/// and the error returned. Unknown ids are absent from the output, and the
/// output order is unspecified.
///
/// # Errors
///
/// Returns an error if the lookup fails.
pub fn fetch_records(conn: &mut Connection, ids: &[RecordId]) -> Result<Vec<Record>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let id_json = serde_json::to_string(ids).context("encode record id batch")?;
    let tx = conn.transaction().context("begin catalog read")?;

    match query_batch(&tx, &id_json) {
        Ok(records) => {
            tx.commit().context("finish catalog read")?;
            Ok(records)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!("catalog rollback failed after lookup error: {rollback_err}");
            }
            Err(err)
        }
    }
}

fn query_batch(tx: &Transaction<'_>, id_json: &str) -> Result<Vec<Record>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM records
         WHERE record_id IN (SELECT value FROM json_each(?1))"
    );
    let mut stmt = tx.prepare(&sql).context("prepare record lookup")?;
    let rows = stmt
        .query_map([id_json], record_from_row)
        .context("execute record lookup")?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("read record lookup rows")
}

/// Page through records in id order, starting strictly after `after`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_records(
    conn: &Connection,
    after: Option<&RecordId>,
    limit: usize,
) -> Result<Vec<Record>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM records
         WHERE ?1 IS NULL OR record_id > ?1
         ORDER BY record_id
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql).context("prepare record listing")?;
    let rows = stmt
        .query_map(params![after.map(RecordId::as_str), limit], record_from_row)
        .context("execute record listing")?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("read record listing rows")
}

/// Number of records in the catalog.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_records(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
        .context("count records")?;
    Ok(u64::try_from(count).unwrap_or_default())
}

/// Write `records` in a single transaction.
///
/// Either every row lands or none do.
///
/// # Errors
///
/// Returns an error if any write fails; the transaction is rolled back.
pub fn import_records(conn: &mut Connection, records: &[Record], mode: ImportMode) -> Result<usize> {
    let tx = conn.transaction().context("begin import")?;

    if mode == ImportMode::Replace {
        tx.execute("DELETE FROM records", [])
            .context("clear existing records")?;
    }

    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO records
                     (record_id, name, description, image_path, product_group, colour_group, section)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(record_id) DO UPDATE SET
                     name = excluded.name,
                     description = excluded.description,
                     image_path = excluded.image_path,
                     product_group = excluded.product_group,
                     colour_group = excluded.colour_group,
                     section = excluded.section",
            )
            .context("prepare record upsert")?;

        for record in records {
            stmt.execute(params![
                record.record_id.as_str(),
                record.name,
                record.description,
                record.image_path,
                record.category.product_group,
                record.category.colour_group,
                record.category.section,
            ])
            .with_context(|| format!("write record {}", record.record_id))?;
        }
    }

    tx.commit().context("commit import")?;
    Ok(records.len())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        record_id: RecordId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        image_path: row.get(3)?,
        category: CategoryMeta {
            product_group: row.get(4)?,
            colour_group: row.get(5)?,
            section: row.get(6)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;
    use rusqlite::OptionalExtension;

    fn get_record(conn: &Connection, id: &RecordId) -> Result<Option<Record>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE record_id = ?1");
        conn.query_row(&sql, [id.as_str()], record_from_row)
            .optional()
            .with_context(|| format!("fetch record {id}"))
    }

    fn record(id: &str, name: &str, group: &str) -> Record {
        Record {
            record_id: RecordId::new(id),
            name: name.into(),
            description: format!("{name} description"),
            image_path: None,
            category: CategoryMeta {
                product_group: Some(group.into()),
                colour_group: None,
                section: None,
            },
        }
    }

    fn catalog() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    #[test]
    fn fetch_returns_known_ids_only() {
        let mut conn = catalog();
        import_records(
            &mut conn,
            &[record("p1", "Red shirt", "Tops"), record("p2", "Blue jeans", "Trousers")],
            ImportMode::Upsert,
        )
        .expect("import");

        let mut found = fetch_records(
            &mut conn,
            &[RecordId::new("p2"), RecordId::new("ghost"), RecordId::new("p1")],
        )
        .expect("fetch");
        found.sort_by(|a, b| a.record_id.cmp(&b.record_id));

        let ids: Vec<&str> = found.iter().map(|r| r.record_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(found[0].category.product_group.as_deref(), Some("Tops"));
    }

    #[test]
    fn fetch_empty_ids_is_empty() {
        let mut conn = catalog();
        assert!(fetch_records(&mut conn, &[]).expect("fetch").is_empty());
    }

    #[test]
    fn fetch_failure_leaves_connection_usable() {
        let mut conn = catalog();
        conn.execute_batch("DROP TABLE record_vectors; DROP TABLE records;")
            .expect("drop tables");

        assert!(fetch_records(&mut conn, &[RecordId::new("p1")]).is_err());
        assert!(conn.is_autocommit());
    }

    #[test]
    fn upsert_overwrites_existing_rows() {
        let mut conn = catalog();
        import_records(&mut conn, &[record("p1", "Shirt", "Tops")], ImportMode::Upsert)
            .expect("first import");
        import_records(&mut conn, &[record("p1", "Oxford shirt", "Tops")], ImportMode::Upsert)
            .expect("second import");

        let stored = get_record(&conn, &RecordId::new("p1"))
            .expect("get")
            .expect("record exists");
        assert_eq!(stored.name, "Oxford shirt");
        assert_eq!(count_records(&conn).expect("count"), 1);
    }

    #[test]
    fn replace_clears_previous_rows() {
        let mut conn = catalog();
        import_records(&mut conn, &[record("old", "Hat", "Accessories")], ImportMode::Upsert)
            .expect("first import");
        import_records(&mut conn, &[record("new", "Scarf", "Accessories")], ImportMode::Replace)
            .expect("replace import");

        assert!(get_record(&conn, &RecordId::new("old")).expect("get").is_none());
        assert_eq!(count_records(&conn).expect("count"), 1);
    }

    #[test]
    fn failed_import_writes_nothing() {
        let mut conn = catalog();
        let mut bad = record("p2", "Bad", "Tops");
        bad.record_id = RecordId::new(" ");

        let result = import_records(
            &mut conn,
            &[record("p1", "Good", "Tops"), bad],
            ImportMode::Upsert,
        );
        assert!(result.is_err());
        assert_eq!(count_records(&conn).expect("count"), 0);
    }

    #[test]
    fn list_pages_in_id_order() {
        let mut conn = catalog();
        import_records(
            &mut conn,
            &[
                record("c", "C", "g"),
                record("a", "A", "g"),
                record("b", "B", "g"),
            ],
            ImportMode::Upsert,
        )
        .expect("import");

        let first = list_records(&conn, None, 2).expect("first page");
        assert_eq!(
            first.iter().map(|r| r.record_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let rest = list_records(&conn, Some(&first[1].record_id), 2).expect("second page");
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].record_id.as_str(), "c");
    }
}
