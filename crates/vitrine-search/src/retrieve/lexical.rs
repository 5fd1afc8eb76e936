//! Fuzzy multi-field text search over a tantivy index.

use super::LexicalIndex;
use anyhow::{Context, Result, anyhow, bail};
use std::collections::HashSet;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer, TokenStream};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument, Term, doc};
use tracing::debug;
use vitrine_core::{Record, RecordId};

const TOKENIZER: &str = "product_text";

/// Field names in the lexical index.
pub mod fields {
    pub const RECORD_ID: &str = "record_id";
    pub const NAME: &str = "name";
    pub const PRODUCT_GROUP: &str = "product_group";
    pub const COLOUR_GROUP: &str = "colour_group";
    pub const SECTION: &str = "section";
    pub const DESCRIPTION: &str = "description";

    /// Fields a query may target.
    pub const SEARCHABLE: &[&str] = &[NAME, PRODUCT_GROUP, COLOUR_GROUP, SECTION, DESCRIPTION];
}

/// Resolved field handles.
#[derive(Debug, Clone, Copy)]
pub struct LexicalFields {
    pub record_id: Field,
    pub name: Field,
    pub product_group: Field,
    pub colour_group: Field,
    pub section: Field,
    pub description: Field,
}

/// Edit distance for a query term under the "AUTO" rule.
///
/// 1-2 characters must match exactly, 3-5 allow one edit, longer terms two.
#[must_use]
pub fn fuzzy_distance(term: &str) -> u8 {
    match term.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

fn build_schema() -> (Schema, LexicalFields) {
    let mut builder = Schema::builder();

    let text = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );

    let record_id = builder.add_text_field(fields::RECORD_ID, STRING | STORED);
    let name = builder.add_text_field(fields::NAME, text.clone());
    let product_group = builder.add_text_field(fields::PRODUCT_GROUP, text.clone());
    let colour_group = builder.add_text_field(fields::COLOUR_GROUP, text.clone());
    let section = builder.add_text_field(fields::SECTION, text.clone());
    let description = builder.add_text_field(fields::DESCRIPTION, text);

    (
        builder.build(),
        LexicalFields {
            record_id,
            name,
            product_group,
            colour_group,
            section,
            description,
        },
    )
}

fn analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .build()
}

/// Lexical index of product text fields.
pub struct TantivyLexicalIndex {
    index: Index,
    reader: IndexReader,
    fields: LexicalFields,
}

impl TantivyLexicalIndex {
    /// Open or create the index in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the index
    /// cannot be opened.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create lexical index directory {}", dir.display()))?;
        let (schema, fields) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .with_context(|| format!("open lexical index directory {}", dir.display()))?;
        let index = if Index::exists(&mmap_dir)? {
            Index::open(mmap_dir).context("open lexical index")?
        } else {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())
                .context("create lexical index")?
        };

        Self::from_index(index, fields)
    }

    /// In-memory index, for tests and one-off tooling.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader cannot be created.
    pub fn open_in_ram() -> Result<Self> {
        let (schema, fields) = build_schema();
        Self::from_index(Index::create_in_ram(schema), fields)
    }

    fn from_index(index: Index, fields: LexicalFields) -> Result<Self> {
        index.tokenizers().register(TOKENIZER, analyzer());
        let reader = index.reader().context("open lexical index reader")?;
        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    #[must_use]
    pub const fn fields(&self) -> LexicalFields {
        self.fields
    }

    /// Map configured field names to index fields.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first field the index does not have.
    pub fn resolve_fields(&self, names: &[String]) -> Result<Vec<Field>> {
        if names.is_empty() {
            bail!("no lexical fields configured");
        }
        names
            .iter()
            .map(|name| {
                let f = &self.fields;
                match name.as_str() {
                    fields::NAME => Ok(f.name),
                    fields::PRODUCT_GROUP => Ok(f.product_group),
                    fields::COLOUR_GROUP => Ok(f.colour_group),
                    fields::SECTION => Ok(f.section),
                    fields::DESCRIPTION => Ok(f.description),
                    other => Err(anyhow!(
                        "unknown lexical field `{other}` (expected one of {})",
                        fields::SEARCHABLE.join(", ")
                    )),
                }
            })
            .collect()
    }

    /// Create a writer with the given memory budget in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is locked by another writer.
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        self.index
            .writer(memory_budget)
            .context("acquire lexical index writer")
    }

    /// Replace the document for `record` via `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be queued.
    pub fn upsert_record(&self, writer: &IndexWriter, record: &Record) -> Result<()> {
        let f = &self.fields;
        writer.delete_term(Term::from_field_text(f.record_id, record.record_id.as_str()));

        let category = &record.category;
        writer.add_document(doc!(
            f.record_id => record.record_id.as_str(),
            f.name => record.name.as_str(),
            f.product_group => category.product_group.as_deref().unwrap_or_default(),
            f.colour_group => category.colour_group.as_deref().unwrap_or_default(),
            f.section => category.section.as_deref().unwrap_or_default(),
            f.description => record.description.as_str(),
        ))?;
        Ok(())
    }

    /// Number of live documents visible to the reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader cannot reload.
    pub fn num_docs(&self) -> Result<u64> {
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    fn query_terms(text: &str) -> Vec<String> {
        let mut analyzer = analyzer();
        let mut stream = analyzer.token_stream(text);
        let mut terms = Vec::new();
        while stream.advance() {
            let token = stream.token().text.clone();
            if !terms.contains(&token) {
                terms.push(token);
            }
        }
        terms
    }

    fn build_query(&self, text: &str, targets: &[Field]) -> Box<dyn Query> {
        let parser = QueryParser::for_index(&self.index, targets.to_vec());
        let (bm25, errors) = parser.parse_query_lenient(text);
        if !errors.is_empty() {
            debug!(errors = errors.len(), "lenient parse dropped parts of lexical query");
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Should, bm25)];
        for term_text in Self::query_terms(text) {
            let distance = fuzzy_distance(&term_text);
            for field in targets {
                let term = Term::from_field_text(*field, &term_text);
                let query: Box<dyn Query> = if distance == 0 {
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs))
                } else {
                    Box::new(FuzzyTermQuery::new(term, distance, true))
                };
                clauses.push((Occur::Should, query));
            }
        }

        Box::new(BooleanQuery::new(clauses))
    }
}

impl LexicalIndex for TantivyLexicalIndex {
    fn search(&self, text: &str, field_names: &[String], limit: usize) -> Result<Vec<RecordId>> {
        if limit == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let targets = self.resolve_fields(field_names)?;
        let query = self.build_query(text, &targets);

        self.reader.reload().context("reload lexical index")?;
        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&*query, &TopDocs::with_limit(limit))
            .context("execute lexical query")?;

        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let Some(id) = doc.get_first(self.fields.record_id).and_then(|v| v.as_str()) else {
                continue;
            };
            if seen.insert(id.to_string()) {
                out.push(RecordId::new(id));
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for TantivyLexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivyLexicalIndex").finish_non_exhaustive()
    }
}
