//! Candidate retrieval from the vector and lexical indexes.
//!
//! Retrievers are fail-soft: a backend error is logged at `warn` and turned
//! into an empty candidate list with [`RetrievalStatus::Degraded`], so one
//! index being down never aborts a query. A lexical query with no text is
//! [`RetrievalStatus::Skipped`] and never reaches the backend.

mod lexical;
mod vector;

pub use lexical::{LexicalFields, TantivyLexicalIndex, fuzzy_distance};
pub use vector::{SqliteVectorIndex, cosine_similarity};

use crate::embed::QueryVector;
use std::sync::Arc;
use tracing::{debug, warn};
use vitrine_core::RecordId;

/// Outcome of one retriever call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalStatus {
    Ok,
    /// No usable query for this retriever; the backend was not called.
    Skipped,
    /// The backend failed; candidates are empty.
    Degraded(String),
}

/// Ordered candidates (best first) plus how they were obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    pub candidates: Vec<RecordId>,
    pub status: RetrievalStatus,
}

impl Retrieved {
    #[must_use]
    pub const fn ok(candidates: Vec<RecordId>) -> Self {
        Self {
            candidates,
            status: RetrievalStatus::Ok,
        }
    }

    #[must_use]
    pub const fn skipped() -> Self {
        Self {
            candidates: Vec::new(),
            status: RetrievalStatus::Skipped,
        }
    }

    #[must_use]
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            candidates: Vec::new(),
            status: RetrievalStatus::Degraded(reason.into()),
        }
    }

    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self.status, RetrievalStatus::Degraded(_))
    }
}

/// Produces up to `limit` candidate ids for a query.
pub trait Retriever<Q: ?Sized>: Send + Sync {
    fn retrieve(&self, query: &Q, limit: usize) -> Retrieved;
}

/// Nearest-neighbour backend over stored record vectors.
pub trait VectorIndex: Send + Sync {
    /// Up to `limit` ids by descending cosine similarity to `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn nearest(&self, query: &[f32], limit: usize) -> anyhow::Result<Vec<RecordId>>;
}

/// Fuzzy multi-field text backend.
pub trait LexicalIndex: Send + Sync {
    /// Up to `limit` ids by descending match score across `fields`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried or a field is
    /// unknown.
    fn search(
        &self,
        text: &str,
        fields: &[String],
        limit: usize,
    ) -> anyhow::Result<Vec<RecordId>>;
}

/// Dense retriever over a [`VectorIndex`].
#[derive(Clone)]
pub struct VectorRetriever {
    index: Arc<dyn VectorIndex>,
}

impl VectorRetriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }
}

impl Retriever<QueryVector> for VectorRetriever {
    fn retrieve(&self, query: &QueryVector, limit: usize) -> Retrieved {
        if limit == 0 {
            return Retrieved::ok(Vec::new());
        }

        match self.index.nearest(query.as_slice(), limit) {
            Ok(mut ids) => {
                ids.truncate(limit);
                debug!(hits = ids.len(), "vector retrieval");
                Retrieved::ok(ids)
            }
            Err(err) => {
                warn!("vector index unavailable, continuing without dense candidates: {err:#}");
                Retrieved::degraded(format!("{err:#}"))
            }
        }
    }
}

/// Lexical retriever over a [`LexicalIndex`] and a fixed set of fields.
#[derive(Clone)]
pub struct LexicalRetriever {
    index: Arc<dyn LexicalIndex>,
    fields: Vec<String>,
}

impl LexicalRetriever {
    pub fn new(index: Arc<dyn LexicalIndex>, fields: Vec<String>) -> Self {
        Self { index, fields }
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl Retriever<str> for LexicalRetriever {
    fn retrieve(&self, text: &str, limit: usize) -> Retrieved {
        let text = text.trim();
        if text.is_empty() {
            return Retrieved::skipped();
        }
        if limit == 0 {
            return Retrieved::ok(Vec::new());
        }

        match self.index.search(text, &self.fields, limit) {
            Ok(mut ids) => {
                ids.truncate(limit);
                debug!(hits = ids.len(), "lexical retrieval");
                Retrieved::ok(ids)
            }
            Err(err) => {
                warn!("lexical index unavailable, continuing without text candidates: {err:#}");
                Retrieved::degraded(format!("{err:#}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        ids: Vec<&'static str>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Fixed {
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

        fn answer(&self) -> anyhow::Result<Vec<RecordId>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(self.ids.iter().copied().map(RecordId::from).collect())
        }
    }

    impl VectorIndex for Fixed {
        fn nearest(&self, _query: &[f32], _limit: usize) -> anyhow::Result<Vec<RecordId>> {
            self.answer()
        }
    }

    impl LexicalIndex for Fixed {
        fn search(
            &self,
            _text: &str,
            _fields: &[String],
            _limit: usize,
        ) -> anyhow::Result<Vec<RecordId>> {
            self.answer()
        }
    }

    fn fields() -> Vec<String> {
        vec!["name".to_string()]
    }

    #[test]
    fn vector_retriever_passes_through_and_truncates() {
        let retriever = VectorRetriever::new(Fixed::new(vec!["a", "b", "c"]));
        let out = retriever.retrieve(&QueryVector::new(vec![1.0]), 2);
        assert_eq!(out.status, RetrievalStatus::Ok);
        assert_eq!(out.candidates, vec![RecordId::from("a"), RecordId::from("b")]);
    }

    #[test]
    fn vector_failure_degrades_to_empty() {
        let retriever = VectorRetriever::new(Fixed::failing());
        let out = retriever.retrieve(&QueryVector::new(vec![1.0]), 10);
        assert!(out.candidates.is_empty());
        assert!(out.is_degraded());
        assert!(matches!(out.status, RetrievalStatus::Degraded(ref r) if r.contains("refused")));
    }

    #[test]
    fn lexical_failure_degrades_to_empty() {
        let retriever = LexicalRetriever::new(Fixed::failing(), fields());
        let out = retriever.retrieve("shirt", 10);
        assert!(out.candidates.is_empty());
        assert!(out.is_degraded());
    }

    #[test]
    fn blank_text_skips_backend() {
        let index = Fixed::new(vec!["a"]);
        let retriever = LexicalRetriever::new(index.clone(), fields());
        assert_eq!(retriever.retrieve("   ", 10), Retrieved::skipped());
        assert_eq!(retriever.retrieve("", 10), Retrieved::skipped());
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn lexical_returns_backend_order() {
        let retriever = LexicalRetriever::new(Fixed::new(vec!["p3", "p1"]), fields());
        let out = retriever.retrieve("red shirt", 50);
        assert_eq!(out, Retrieved::ok(vec![RecordId::from("p3"), RecordId::from("p1")]));
    }
}
