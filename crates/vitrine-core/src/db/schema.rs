//! Catalog schema.
//!
//! - `records` holds the authoritative product rows served to clients
//! - `record_vectors` holds one embedding per record plus the hash of the
//!   content it was computed from, so re-indexing can skip unchanged rows

/// Migration v1: product records.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS records (
    record_id TEXT PRIMARY KEY CHECK (length(trim(record_id)) > 0),
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    image_path TEXT,
    product_group TEXT,
    colour_group TEXT,
    section TEXT
);

CREATE INDEX IF NOT EXISTS idx_records_product_group ON records(product_group);
CREATE INDEX IF NOT EXISTS idx_records_section ON records(section);
";

/// Migration v2: stored record embeddings.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS record_vectors (
    record_id TEXT PRIMARY KEY REFERENCES records(record_id) ON DELETE CASCADE,
    content_hash TEXT NOT NULL,
    dimension INTEGER NOT NULL CHECK (dimension > 0),
    embedding_json TEXT NOT NULL
);
";

/// Indexes that must exist after the latest migration.
pub const REQUIRED_INDEXES: &[&str] = &["idx_records_product_group", "idx_records_section"];
