//! Hybrid query orchestration.
//!
//! `validate -> embed -> retrieve (vector + lexical, concurrently) -> fuse ->
//! truncate(top_k) -> hydrate`. Client errors are raised before any
//! retriever runs; retriever and catalog failures degrade the response
//! instead of failing it.

use crate::embed::{EmbeddingError, EmbeddingGateway, QueryVector};
use crate::fusion::{FusedCandidate, fuse};
use crate::hydrate::{Hydrator, RecordStore};
use crate::retrieve::{
    LexicalIndex, LexicalRetriever, Retrieved, Retriever, VectorIndex, VectorRetriever,
};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use vitrine_core::config::SearchConfig;
use vitrine_core::{ErrorCode, Record};

/// One search query.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub text: Option<String>,
    /// Raw image upload; decoded by the embedding gateway.
    pub image: Option<Vec<u8>>,
    /// Result count; the configured default when `None`.
    pub top_k: Option<usize>,
}

impl SearchRequest {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    fn usable_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    fn usable_image(&self) -> Option<&[u8]> {
        self.image.as_deref().filter(|bytes| !bytes.is_empty())
    }
}

/// Pipeline stage that failed soft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Embedding,
    Vector,
    Lexical,
    Catalog,
}

impl Component {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Vector => "vector",
            Self::Lexical => "lexical",
            Self::Catalog => "catalog",
        }
    }

    /// Error code describing this component's failure.
    #[must_use]
    pub const fn code(self) -> ErrorCode {
        match self {
            Self::Embedding => ErrorCode::EmbeddingFailed,
            Self::Vector => ErrorCode::VectorIndexUnavailable,
            Self::Lexical => ErrorCode::LexicalIndexUnavailable,
            Self::Catalog => ErrorCode::CatalogQueryFailed,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    /// Hydrated records, best first.
    pub results: Vec<Record>,
    /// Components that failed soft while serving this query.
    pub degraded: Vec<Component>,
    /// Fusion breakdown for the returned ids (before hydration filtering).
    #[serde(skip)]
    pub ranking: Vec<FusedCandidate>,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("provide a text query, an image, or both")]
    EmptyQuery,
    #[error("top_k must be a positive integer")]
    InvalidTopK,
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("query embedding failed: {0}")]
    Embedding(String),
}

impl SearchError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyQuery => ErrorCode::EmptyQuery,
            Self::InvalidTopK => ErrorCode::InvalidTopK,
            Self::InvalidImage(_) => ErrorCode::InvalidImage,
            Self::Embedding(_) => ErrorCode::EmbeddingFailed,
        }
    }

    /// `true` for errors caused by the request rather than the service.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Embedding(_))
    }
}

/// The query orchestrator. Cheap to share behind an `Arc`.
pub struct HybridSearch {
    gateway: EmbeddingGateway,
    vector: Arc<dyn Retriever<QueryVector>>,
    lexical: Arc<dyn Retriever<str>>,
    hydrator: Hydrator,
    config: SearchConfig,
}

impl HybridSearch {
    /// Wire the pipeline from its backends.
    pub fn new(
        gateway: EmbeddingGateway,
        vector_index: Arc<dyn VectorIndex>,
        lexical_index: Arc<dyn LexicalIndex>,
        store: Arc<dyn RecordStore>,
        config: SearchConfig,
    ) -> Self {
        let lexical = LexicalRetriever::new(lexical_index, config.lexical_fields.clone());
        Self::from_parts(
            gateway,
            Arc::new(VectorRetriever::new(vector_index)),
            Arc::new(lexical),
            Hydrator::new(store),
            config,
        )
    }

    /// Wire the pipeline from pre-built retrievers.
    pub fn from_parts(
        gateway: EmbeddingGateway,
        vector: Arc<dyn Retriever<QueryVector>>,
        lexical: Arc<dyn Retriever<str>>,
        hydrator: Hydrator,
        config: SearchConfig,
    ) -> Self {
        Self {
            gateway,
            vector,
            lexical,
            hydrator,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run one query end to end.
    ///
    /// # Errors
    ///
    /// - [`SearchError::EmptyQuery`] when neither text nor image is present
    /// - [`SearchError::InvalidTopK`] when `top_k` is zero
    /// - [`SearchError::InvalidImage`] when the image does not decode
    /// - [`SearchError::Embedding`] when no query vector can be produced and
    ///   lexical fallback is off (or there is no text to fall back on)
    #[instrument(skip_all, fields(top_k = request.top_k))]
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let text = request.usable_text();
        let image = request.usable_image();
        if text.is_none() && image.is_none() {
            return Err(SearchError::EmptyQuery);
        }
        let top_k = self.effective_top_k(request.top_k)?;

        let mut degraded = Vec::new();
        let query_vector = match self.gateway.embed(text, image) {
            Ok(vector) => Some(vector),
            Err(EmbeddingError::NoInput) => return Err(SearchError::EmptyQuery),
            Err(EmbeddingError::InvalidImage(reason)) => {
                return Err(SearchError::InvalidImage(reason));
            }
            Err(EmbeddingError::Model(reason)) => {
                if !(self.config.lexical_fallback && text.is_some()) {
                    return Err(SearchError::Embedding(reason));
                }
                warn!("query embedding failed, serving lexical-only results: {reason}");
                degraded.push(Component::Embedding);
                None
            }
        };

        let pool = self.config.candidate_pool.max(top_k);
        let (vector_hits, lexical_hits) = self.retrieve_both(query_vector.as_ref(), text, pool);
        if vector_hits.is_degraded() {
            degraded.push(Component::Vector);
        }
        if lexical_hits.is_degraded() {
            degraded.push(Component::Lexical);
        }

        let mut ranking = fuse(
            &[vector_hits.candidates, lexical_hits.candidates],
            self.config.rrf_k,
        );
        ranking.truncate(top_k);

        let hydrated = self.hydrator.hydrate(&ranking.ids());
        if hydrated.degraded.is_some() {
            degraded.push(Component::Catalog);
        }

        for component in &degraded {
            warn!(
                component = component.as_str(),
                code = %component.code(),
                "served degraded results"
            );
        }
        info!(
            results = hydrated.records.len(),
            degraded = degraded.len(),
            "search complete"
        );

        Ok(SearchResponse {
            results: hydrated.records,
            degraded,
            ranking: ranking.into_entries(),
        })
    }

    fn effective_top_k(&self, requested: Option<usize>) -> Result<usize, SearchError> {
        let top_k = requested.unwrap_or(self.config.default_top_k);
        if top_k == 0 {
            return Err(SearchError::InvalidTopK);
        }
        if top_k > self.config.max_top_k {
            debug!(requested = top_k, max = self.config.max_top_k, "clamping top_k");
            return Ok(self.config.max_top_k);
        }
        Ok(top_k)
    }

    /// Run both retrievers concurrently; the lexical side runs on the caller's
    /// thread.
    fn retrieve_both(
        &self,
        query_vector: Option<&QueryVector>,
        text: Option<&str>,
        pool: usize,
    ) -> (Retrieved, Retrieved) {
        thread::scope(|scope| {
            let vector_task =
                query_vector.map(|qv| scope.spawn(move || self.vector.retrieve(qv, pool)));

            let lexical = self.lexical.retrieve(text.unwrap_or_default(), pool);

            let vector = match vector_task {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Retrieved::degraded("vector retriever panicked")),
                None => Retrieved::skipped(),
            };
            (vector, lexical)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::Encoder;
    use crate::retrieve::RetrievalStatus;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vitrine_core::{CategoryMeta, RecordId};

    struct FixedEncoder {
        fail: bool,
    }

    impl Encoder for FixedEncoder {
        fn dimension(&self) -> usize {
            2
        }

        fn encode_text(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            if self.fail {
                anyhow::bail!("model offline");
            }
            Ok(vec![1.0, 0.0])
        }

        fn encode_image(&self, _image: &DynamicImage) -> anyhow::Result<Vec<f32>> {
            Ok(vec![0.0, 1.0])
        }
    }

    struct Scripted {
        ids: Vec<&'static str>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(ids: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                ids,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                ids: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn answer(&self) -> anyhow::Result<Vec<RecordId>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("backend down");
            }
            Ok(self.ids.iter().copied().map(RecordId::from).collect())
        }
    }

    impl VectorIndex for Scripted {
        fn nearest(&self, _query: &[f32], _limit: usize) -> anyhow::Result<Vec<RecordId>> {
            self.answer()
        }
    }

    impl LexicalIndex for Scripted {
        fn search(
            &self,
            _text: &str,
            _fields: &[String],
            _limit: usize,
        ) -> anyhow::Result<Vec<RecordId>> {
            self.answer()
        }
    }

    impl RecordStore for Scripted {
        fn fetch(&self, ids: &[RecordId]) -> anyhow::Result<Vec<Record>> {
            self.answer()?;
            Ok(ids
                .iter()
                .filter(|id| self.ids.contains(&id.as_str()))
                .map(|id| Record {
                    record_id: id.clone(),
                    name: format!("Product {id}"),
                    description: String::new(),
                    image_path: None,
                    category: CategoryMeta::default(),
                })
                .collect())
        }
    }

    struct Harness {
        vector: Arc<Scripted>,
        lexical: Arc<Scripted>,
        store: Arc<Scripted>,
        search: HybridSearch,
    }

    fn harness_with(
        vector: Arc<Scripted>,
        lexical: Arc<Scripted>,
        store: Arc<Scripted>,
        encoder_fails: bool,
        config: SearchConfig,
    ) -> Harness {
        let search = HybridSearch::new(
            EmbeddingGateway::new(Arc::new(FixedEncoder {
                fail: encoder_fails,
            })),
            vector.clone(),
            lexical.clone(),
            store.clone(),
            config,
        );
        Harness {
            vector,
            lexical,
            store,
            search,
        }
    }

    fn red_shirt_harness() -> Harness {
        harness_with(
            Scripted::new(vec!["p1", "p2", "p3"]),
            Scripted::new(vec!["p3", "p1"]),
            Scripted::new(vec!["p1", "p2", "p3"]),
            false,
            SearchConfig::default(),
        )
    }

    fn result_ids(response: &SearchResponse) -> Vec<&str> {
        response.results.iter().map(|r| r.record_id.as_str()).collect()
    }

    #[test]
    fn red_shirt_scenario() {
        let h = red_shirt_harness();
        let response = h
            .search
            .search(&SearchRequest::text("red shirt").with_top_k(2))
            .expect("search");

        assert_eq!(result_ids(&response), vec!["p1", "p3"]);
        assert!(response.degraded.is_empty());
        assert_eq!(response.ranking.len(), 2);
        assert_eq!(response.ranking[1].ranks, vec![Some(3), Some(1)]);
        assert_eq!(h.store.calls(), 1);
    }

    #[test]
    fn request_without_content_never_reaches_retrievers() {
        let h = red_shirt_harness();
        for request in [
            SearchRequest::default(),
            SearchRequest::text("   "),
            SearchRequest {
                image: Some(Vec::new()),
                ..SearchRequest::default()
            },
        ] {
            let err = h.search.search(&request).expect_err("must reject");
            assert!(matches!(err, SearchError::EmptyQuery));
            assert!(err.is_client_error());
        }
        assert_eq!(h.vector.calls(), 0);
        assert_eq!(h.lexical.calls(), 0);
        assert_eq!(h.store.calls(), 0);
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let h = red_shirt_harness();
        let err = h
            .search
            .search(&SearchRequest::text("shirt").with_top_k(0))
            .expect_err("must reject");
        assert!(matches!(err, SearchError::InvalidTopK));
        assert_eq!(h.vector.calls() + h.lexical.calls(), 0);
    }

    #[test]
    fn corrupt_image_is_rejected_before_retrieval() {
        let h = red_shirt_harness();
        let request = SearchRequest {
            image: Some(b"not an image".to_vec()),
            ..SearchRequest::default()
        };
        let err = h.search.search(&request).expect_err("must reject");
        assert!(matches!(err, SearchError::InvalidImage(_)));
        assert_eq!(err.code(), ErrorCode::InvalidImage);
        assert_eq!(h.vector.calls() + h.lexical.calls(), 0);
    }

    #[test]
    fn top_k_defaults_and_clamps() {
        let config = SearchConfig {
            default_top_k: 1,
            max_top_k: 2,
            ..SearchConfig::default()
        };
        let h = harness_with(
            Scripted::new(vec!["p1", "p2", "p3"]),
            Scripted::new(vec![]),
            Scripted::new(vec!["p1", "p2", "p3"]),
            false,
            config,
        );

        let defaulted = h.search.search(&SearchRequest::text("x")).expect("search");
        assert_eq!(result_ids(&defaulted), vec!["p1"]);

        let clamped = h
            .search
            .search(&SearchRequest::text("x").with_top_k(50))
            .expect("search");
        assert_eq!(result_ids(&clamped), vec!["p1", "p2"]);
    }

    #[test]
    fn vector_outage_degrades_to_lexical_results() {
        let h = harness_with(
            Scripted::failing(),
            Scripted::new(vec!["p3", "p1"]),
            Scripted::new(vec!["p1", "p3"]),
            false,
            SearchConfig::default(),
        );
        let response = h.search.search(&SearchRequest::text("shirt")).expect("search");
        assert_eq!(result_ids(&response), vec!["p3", "p1"]);
        assert_eq!(response.degraded, vec![Component::Vector]);
    }

    #[test]
    fn catalog_outage_returns_empty_degraded_response() {
        let h = harness_with(
            Scripted::new(vec!["p1"]),
            Scripted::new(vec!["p1"]),
            Scripted::failing(),
            false,
            SearchConfig::default(),
        );
        let response = h.search.search(&SearchRequest::text("shirt")).expect("search");
        assert!(response.results.is_empty());
        assert_eq!(response.degraded, vec![Component::Catalog]);
    }

    #[test]
    fn embedding_failure_is_fatal_by_default() {
        let h = harness_with(
            Scripted::new(vec!["p1"]),
            Scripted::new(vec!["p1"]),
            Scripted::new(vec!["p1"]),
            true,
            SearchConfig::default(),
        );
        let err = h
            .search
            .search(&SearchRequest::text("shirt"))
            .expect_err("must fail");
        assert!(matches!(err, SearchError::Embedding(_)));
        assert!(!err.is_client_error());
        assert_eq!(h.lexical.calls(), 0);
    }

    #[test]
    fn lexical_fallback_serves_text_results() {
        let config = SearchConfig {
            lexical_fallback: true,
            ..SearchConfig::default()
        };
        let h = harness_with(
            Scripted::new(vec!["p9"]),
            Scripted::new(vec!["p2", "p1"]),
            Scripted::new(vec!["p1", "p2"]),
            true,
            config,
        );
        let response = h.search.search(&SearchRequest::text("shirt")).expect("search");
        assert_eq!(result_ids(&response), vec!["p2", "p1"]);
        assert_eq!(response.degraded, vec![Component::Embedding]);
        assert_eq!(h.vector.calls(), 0);
    }

    #[test]
    fn image_only_query_skips_lexical_backend() {
        let h = red_shirt_harness();
        let request = SearchRequest {
            image: Some(crate::embed::tests::png_bytes(2)),
            top_k: Some(3),
            ..SearchRequest::default()
        };
        let response = h.search.search(&request).expect("search");
        assert_eq!(result_ids(&response), vec!["p1", "p2", "p3"]);
        assert_eq!(h.lexical.calls(), 0);
        assert_eq!(h.vector.calls(), 1);
    }

    #[test]
    fn no_matches_is_a_valid_empty_response() {
        let h = harness_with(
            Scripted::new(vec![]),
            Scripted::new(vec![]),
            Scripted::new(vec![]),
            false,
            SearchConfig::default(),
        );
        let response = h.search.search(&SearchRequest::text("zzz")).expect("search");
        assert!(response.results.is_empty());
        assert!(response.degraded.is_empty());
        assert_eq!(h.store.calls(), 0);
    }

    /// Blocks every lookup until both retrievers have arrived.
    struct Rendezvous {
        barrier: std::sync::Barrier,
    }

    impl VectorIndex for Rendezvous {
        fn nearest(&self, _query: &[f32], _limit: usize) -> anyhow::Result<Vec<RecordId>> {
            self.barrier.wait();
            Ok(vec![RecordId::from("p1")])
        }
    }

    impl LexicalIndex for Rendezvous {
        fn search(
            &self,
            _text: &str,
            _fields: &[String],
            _limit: usize,
        ) -> anyhow::Result<Vec<RecordId>> {
            self.barrier.wait();
            Ok(vec![RecordId::from("p2")])
        }
    }

    #[test]
    fn retrievers_run_concurrently() {
        let backends = Arc::new(Rendezvous {
            barrier: std::sync::Barrier::new(2),
        });
        let search = HybridSearch::new(
            EmbeddingGateway::new(Arc::new(FixedEncoder { fail: false })),
            backends.clone(),
            backends,
            Scripted::new(vec!["p1", "p2"]),
            SearchConfig::default(),
        );

        // Sequential retrieval would park on the barrier forever.
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(search.search(&SearchRequest::text("shirt")));
        });
        let response = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("retrievers deadlocked")
            .expect("search");

        assert_eq!(result_ids(&response), vec!["p1", "p2"]);
        assert!(response.degraded.is_empty());
    }

    #[test]
    fn components_map_to_their_error_codes() {
        assert_eq!(Component::Embedding.code(), ErrorCode::EmbeddingFailed);
        assert_eq!(Component::Vector.code().code(), "E6001");
        assert_eq!(Component::Lexical.code().code(), "E6002");
        assert_eq!(Component::Catalog.code().code(), "E3001");
    }

    #[test]
    fn response_serializes_without_ranking() {
        let h = red_shirt_harness();
        let response = h
            .search
            .search(&SearchRequest::text("red shirt").with_top_k(1))
            .expect("search");
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["results"][0]["record_id"], "p1");
        assert!(json["degraded"].as_array().is_some_and(Vec::is_empty));
        assert!(json.get("ranking").is_none());
    }

    #[test]
    fn skipped_status_is_not_degraded() {
        assert!(!Retrieved::skipped().is_degraded());
        assert_eq!(Retrieved::skipped().status, RetrievalStatus::Skipped);
    }
}
