use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory when no path is given.
pub const LOCAL_CONFIG_FILE: &str = "vitrine.toml";

const ENV_EMBED_URL: &str = "VITRINE_EMBED_URL";
const ENV_BIND: &str = "VITRINE_BIND";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitrineConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            timeout_secs: default_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Retrieval and fusion tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// RRF constant; higher values flatten the gap between top and low ranks.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,
    /// Candidates requested from each retriever before fusion.
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    /// Text index fields searched by the lexical retriever.
    #[serde(default = "default_lexical_fields")]
    pub lexical_fields: Vec<String>,
    /// Run lexical-only when the query embedding cannot be produced.
    #[serde(default)]
    pub lexical_fallback: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            candidate_pool: default_candidate_pool(),
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            lexical_fields: default_lexical_fields(),
            lexical_fallback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embed_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embed_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embed_endpoint(),
            model: default_embed_model(),
            dimension: default_dimension(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default = "default_lexical_index_dir")]
    pub lexical_index_dir: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            lexical_index_dir: default_lexical_index_dir(),
            pool_size: default_pool_size(),
        }
    }
}

impl VitrineConfig {
    /// Reject values that would make the service misbehave at runtime.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.search.candidate_pool == 0 {
            bail!("search.candidate_pool must be positive");
        }
        if self.search.default_top_k == 0 || self.search.max_top_k == 0 {
            bail!("search.default_top_k and search.max_top_k must be positive");
        }
        if self.search.default_top_k > self.search.max_top_k {
            bail!(
                "search.default_top_k ({}) exceeds search.max_top_k ({})",
                self.search.default_top_k,
                self.search.max_top_k
            );
        }
        if self.search.lexical_fields.is_empty() {
            bail!("search.lexical_fields must name at least one field");
        }
        if self.embedding.dimension == 0 {
            bail!("embedding.dimension must be positive");
        }
        if self.storage.pool_size == 0 {
            bail!("storage.pool_size must be positive");
        }
        if self.server.timeout_secs == 0 {
            bail!("server.timeout_secs must be positive");
        }
        Ok(())
    }
}

/// Parse a config file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_config_file(path: &Path) -> Result<VitrineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<VitrineConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Locate the config file to use, if any.
///
/// Order: explicit path, `./vitrine.toml`, `<config dir>/vitrine/config.toml`.
#[must_use]
pub fn find_config_file(explicit: Option<&Path>, working_dir: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = working_dir.join(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    let user = dirs::config_dir()?.join("vitrine/config.toml");
    user.exists().then_some(user)
}

/// Load, override from the environment, and validate the effective config.
///
/// # Errors
///
/// Returns an error if an explicit or discovered file fails to parse, or the
/// resulting config does not validate.
pub fn resolve_config(explicit: Option<&Path>, working_dir: &Path) -> Result<VitrineConfig> {
    let mut config = match find_config_file(explicit, working_dir) {
        Some(path) => load_config_file(&path)?,
        None => VitrineConfig::default(),
    };

    apply_env_overrides(
        &mut config,
        env::var(ENV_EMBED_URL).ok(),
        env::var(ENV_BIND).ok(),
    );
    config.validate()?;
    Ok(config)
}

fn apply_env_overrides(
    config: &mut VitrineConfig,
    embed_url: Option<String>,
    bind: Option<String>,
) {
    if let Some(url) = embed_url.filter(|v| !v.trim().is_empty()) {
        config.embedding.endpoint = url;
    }
    if let Some(bind) = bind.filter(|v| !v.trim().is_empty()) {
        config.server.bind = bind;
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

const fn default_rrf_k() -> usize {
    60
}

const fn default_candidate_pool() -> usize {
    50
}

const fn default_top_k() -> usize {
    10
}

const fn default_max_top_k() -> usize {
    100
}

fn default_lexical_fields() -> Vec<String> {
    vec![
        "name".to_string(),
        "product_group".to_string(),
        "section".to_string(),
    ]
}

fn default_embed_endpoint() -> String {
    "http://127.0.0.1:8001/embed".to_string()
}

fn default_embed_model() -> String {
    "clip-ViT-B-32".to_string()
}

const fn default_dimension() -> usize {
    512
}

const fn default_embed_timeout_secs() -> u64 {
    10
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("vitrine-data/catalog.sqlite3")
}

fn default_lexical_index_dir() -> PathBuf {
    PathBuf::from("vitrine-data/lexical")
}

const fn default_pool_size() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = VitrineConfig::default();
        assert_eq!(cfg.search.rrf_k, 60);
        assert_eq!(cfg.search.candidate_pool, 50);
        assert_eq!(cfg.search.default_top_k, 10);
        assert_eq!(
            cfg.search.lexical_fields,
            vec!["name", "product_group", "section"]
        );
        assert!(!cfg.search.lexical_fallback);
        assert_eq!(cfg.embedding.dimension, 512);
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vitrine.toml");
        std::fs::write(
            &path,
            r#"
[search]
rrf_k = 20
lexical_fallback = true

[storage]
pool_size = 8
"#,
        )
        .expect("write config");

        let cfg = load_config_file(&path).expect("load should succeed");
        assert_eq!(cfg.search.rrf_k, 20);
        assert!(cfg.search.lexical_fallback);
        assert_eq!(cfg.search.candidate_pool, 50);
        assert_eq!(cfg.storage.pool_size, 8);
        assert_eq!(cfg.embedding.model, "clip-ViT-B-32");
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vitrine.toml");
        std::fs::write(&path, "[search\nrrf_k = ").expect("write config");

        let err = load_config_file(&path).expect_err("parse must fail");
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn local_file_is_found_before_user_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join(LOCAL_CONFIG_FILE);
        std::fs::write(&local, "").expect("write config");

        assert_eq!(find_config_file(None, dir.path()), Some(local));
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let explicit = dir.path().join("elsewhere.toml");
        assert_eq!(
            find_config_file(Some(&explicit), dir.path()),
            Some(explicit.clone())
        );
    }

    #[test]
    fn resolve_reads_explicit_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[search]\ncandidate_pool = 80\n").expect("write config");

        let cfg = resolve_config(Some(&path), dir.path()).expect("resolve should succeed");
        assert_eq!(cfg.search.candidate_pool, 80);
    }

    #[test]
    fn env_overrides_replace_endpoint_and_bind() {
        let mut cfg = VitrineConfig::default();
        apply_env_overrides(
            &mut cfg,
            Some("http://embedder:9000/embed".to_string()),
            Some("0.0.0.0:8080".to_string()),
        );
        assert_eq!(cfg.embedding.endpoint, "http://embedder:9000/embed");
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn blank_env_overrides_are_ignored() {
        let mut cfg = VitrineConfig::default();
        apply_env_overrides(&mut cfg, Some("  ".to_string()), None);
        assert_eq!(cfg.embedding.endpoint, default_embed_endpoint());
    }

    #[test]
    fn validate_rejects_zero_pool() {
        let mut cfg = VitrineConfig::default();
        cfg.search.candidate_pool = 0;
        let err = cfg.validate().expect_err("zero pool must be rejected");
        assert!(err.to_string().contains("candidate_pool"));
    }

    #[test]
    fn validate_rejects_default_above_max() {
        let mut cfg = VitrineConfig::default();
        cfg.search.default_top_k = 500;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_lexical_fields() {
        let mut cfg = VitrineConfig::default();
        cfg.search.lexical_fields.clear();
        assert!(cfg.validate().is_err());
    }
}
