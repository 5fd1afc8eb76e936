use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use vitrine_core::{ErrorCode, VitrineConfig};
use vitrine_core::config::ServerConfig;
use vitrine_core::db::ConnectionPool;
use vitrine_search::{
    EmbeddingGateway, HttpEncoder, HybridSearch, SqliteRecordStore, SqliteVectorIndex,
    TantivyLexicalIndex,
};

/// Shared, read-only state handed to every handler.
pub struct AppState {
    pub search: Arc<HybridSearch>,
    pub config: ServerConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(search: Arc<HybridSearch>, config: ServerConfig) -> Self {
        Self {
            search,
            config,
            started_at: Instant::now(),
        }
    }

    /// Build every collaborator from `config`.
    ///
    /// Any collaborator failing to initialise is an error; the service never
    /// starts partially configured.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `E1001` if the catalog cannot be opened,
    /// `E6002` for the lexical index, and `E1002` when the configured lexical
    /// fields do not exist.
    pub fn from_config(config: &VitrineConfig) -> Result<Self> {
        let storage = &config.storage;
        let pool = ConnectionPool::open(&storage.catalog_path, storage.pool_size)
            .with_context(|| format!("open catalog {}", storage.catalog_path.display()))
            .map_err(|err| ErrorCode::CatalogUnavailable.wrap(err))?;
        let pool = Arc::new(pool);

        let lexical = TantivyLexicalIndex::open(&storage.lexical_index_dir)
            .with_context(|| {
                format!("open lexical index {}", storage.lexical_index_dir.display())
            })
            .map_err(|err| ErrorCode::LexicalIndexUnavailable.wrap(err))?;
        lexical
            .resolve_fields(&config.search.lexical_fields)
            .map_err(|err| ErrorCode::ConfigInvalid.wrap(err))?;

        let encoder = HttpEncoder::new(&config.embedding);
        info!(
            endpoint = encoder.endpoint(),
            model = %config.embedding.model,
            dimension = config.embedding.dimension,
            "embedding service configured"
        );

        let search = HybridSearch::new(
            EmbeddingGateway::new(Arc::new(encoder)),
            Arc::new(SqliteVectorIndex::new(
                Arc::clone(&pool),
                config.embedding.dimension,
            )),
            Arc::new(lexical),
            Arc::new(SqliteRecordStore::new(pool)),
            config.search.clone(),
        );

        Ok(Self::new(Arc::new(search), config.server.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> VitrineConfig {
        let mut config = VitrineConfig::default();
        config.storage.catalog_path = dir.path().join("catalog.sqlite3");
        config.storage.lexical_index_dir = dir.path().join("lexical");
        config
    }

    fn startup_error(config: &VitrineConfig) -> String {
        match AppState::from_config(config) {
            Ok(_) => panic!("startup should fail"),
            Err(err) => format!("{err:#}"),
        }
    }

    #[test]
    fn starts_against_fresh_storage() {
        let dir = TempDir::new().expect("temp dir");
        let state = AppState::from_config(&config_in(&dir)).expect("state");
        assert_eq!(state.config, ServerConfig::default());
    }

    #[test]
    fn unopenable_catalog_is_e1001() {
        let dir = TempDir::new().expect("temp dir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").expect("write");
        let mut config = config_in(&dir);
        config.storage.catalog_path = blocker.join("catalog.sqlite3");

        let message = startup_error(&config);
        assert!(message.starts_with("E1001"), "{message}");
        assert!(message.contains("vt init"), "{message}");
    }

    #[test]
    fn unopenable_lexical_index_is_e6002() {
        let dir = TempDir::new().expect("temp dir");
        let blocker = dir.path().join("lexical");
        std::fs::write(&blocker, b"file").expect("write");

        let message = startup_error(&config_in(&dir));
        assert!(message.starts_with("E6002"), "{message}");
    }

    #[test]
    fn unknown_lexical_field_is_e1002() {
        let dir = TempDir::new().expect("temp dir");
        let mut config = config_in(&dir);
        config.search.lexical_fields = vec!["price".to_string()];

        let message = startup_error(&config);
        assert!(message.starts_with("E1002"), "{message}");
        assert!(message.contains("price"), "{message}");
    }
}
