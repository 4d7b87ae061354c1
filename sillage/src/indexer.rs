//! Tantivy recall index for one catalog snapshot.
//!
//! The index only narrows the snapshot to plausible slots: a trigram OR query
//! with a min-match threshold, OR'd with fuzzy word clauses for typos trigrams
//! miss. Ranking is done by `matcher` on the recalled records.

use std::collections::HashSet;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::*;
use tantivy::tokenizer::{LowerCaser, NgramTokenizer, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Term};
use thiserror::Error;

use crate::matcher::{max_edit_distance, tokenize_words, FieldText, MIN_FRAGMENT_LEN};

const TRIGRAM_TOKENIZER: &str = "trigram";
const WRITER_HEAP_BYTES: usize = 15_000_000;

/// Error type for indexer operations
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("Schema field missing: {0}")]
    MissingField(&'static str),
}

pub type IndexerResult<T> = Result<T, IndexerError>;

/// Immutable RAM index over a snapshot. Documents carry their snapshot slot.
pub struct SnapshotIndex {
    index: Index,
    reader: IndexReader,
    slot_field: Field,
    text_field: Field,
    words_field: Field,
    num_docs: usize,
}

impl std::fmt::Debug for SnapshotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotIndex").field("num_docs", &self.num_docs).finish()
    }
}

impl SnapshotIndex {
    /// Index every record's name, brand and concentration, keyed by position.
    pub fn build(texts: &[FieldText]) -> IndexerResult<Self> {
        let schema = Self::build_schema();
        let index = Index::create_in_ram(schema.clone());
        Self::register_tokenizer(&index)?;

        let field = |name: &'static str| schema.get_field(name).map_err(|_| IndexerError::MissingField(name));
        let slot_field = field("slot")?;
        let text_field = field("text")?;
        let words_field = field("words")?;

        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        for (slot, text) in texts.iter().enumerate() {
            let searchable = searchable_text(text);
            let mut doc = TantivyDocument::default();
            doc.add_u64(slot_field, slot as u64);
            doc.add_text(text_field, &searchable);
            doc.add_text(words_field, &searchable);
            writer.add_document(doc)?;
        }
        writer.commit()?;

        let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
        reader.reload()?;

        Ok(Self {
            index,
            reader,
            slot_field,
            text_field,
            words_field,
            num_docs: texts.len(),
        })
    }

    fn build_schema() -> Schema {
        let mut builder = Schema::builder();
        builder.add_u64_field("slot", STORED | INDEXED);

        let text_field_indexing = TextFieldIndexing::default()
            .set_tokenizer(TRIGRAM_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqs);
        builder.add_text_field("text", TextOptions::default().set_indexing_options(text_field_indexing));

        // Word-tokenized field for FuzzyTermQuery recall
        let word_field_indexing = TextFieldIndexing::default()
            .set_tokenizer("default")
            .set_index_option(IndexRecordOption::Basic);
        builder.add_text_field("words", TextOptions::default().set_indexing_options(word_field_indexing));
        builder.build()
    }

    fn register_tokenizer(index: &Index) -> IndexerResult<()> {
        let tokenizer = TextAnalyzer::builder(NgramTokenizer::new(3, 3, false)?)
            .filter(LowerCaser)
            .build();
        index.tokenizers().register(TRIGRAM_TOKENIZER, tokenizer);
        Ok(())
    }

    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    /// Whether a query can use the index. Shorter queries need a linear scan.
    pub fn supports(query: &str) -> bool {
        tokenize_words(&query.to_lowercase())
            .iter()
            .any(|w| w.chars().count() >= MIN_FRAGMENT_LEN)
    }

    /// Snapshot slots plausibly matching `query`, at most `limit`, in index
    /// relevance order.
    pub fn recall(&self, query: &str, limit: usize) -> IndexerResult<Vec<usize>> {
        if limit == 0 || !Self::supports(query) {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let query = self.build_recall_query(query);
        let top_docs = searcher.search(query.as_ref(), &TopDocs::with_limit(limit))?;

        let mut slots = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(slot) = doc.get_first(self.slot_field).and_then(|v| v.as_u64()) {
                slots.push(slot as usize);
            }
        }
        Ok(slots)
    }

    /// Tokenize text using the trigram tokenizer and return terms for the text field.
    fn trigram_terms(&self, text: &str) -> Vec<Term> {
        let Some(mut tokenizer) = self.index.tokenizers().get(TRIGRAM_TOKENIZER) else {
            return Vec::new();
        };
        let mut stream = tokenizer.token_stream(text);
        let mut terms = Vec::new();
        let mut seen = HashSet::new();
        while let Some(token) = stream.next() {
            let term = Term::from_field_text(self.text_field, &token.text);
            if seen.insert(term.clone()) {
                terms.push(term);
            }
        }
        terms
    }

    /// Per-word trigrams OR'd with a min-match threshold, OR'd with fuzzy word
    /// clauses for words long enough to allow edits.
    fn build_recall_query(&self, query: &str) -> Box<dyn Query> {
        let lower = query.to_lowercase();
        let words: Vec<String> = tokenize_words(&lower)
            .into_iter()
            .filter(|w| w.chars().count() >= MIN_FRAGMENT_LEN)
            .collect();

        let mut terms = Vec::new();
        let mut seen = HashSet::new();
        for word in &words {
            for term in self.trigram_terms(word) {
                if seen.insert(term.clone()) {
                    terms.push(term);
                }
            }
        }

        let num_terms = terms.len();
        let subqueries: Vec<(Occur, Box<dyn Query>)> = terms
            .into_iter()
            .map(|term| (Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>))
            .collect();
        let mut trigram_query = BooleanQuery::new(subqueries);
        if num_terms >= 3 {
            let min_match = if num_terms >= 20 {
                4 * num_terms / 5
            } else if num_terms >= 7 {
                (num_terms * 2 / 3).max(5)
            } else {
                (num_terms + 1) / 2
            };
            trigram_query.set_minimum_number_should_match(min_match);
        }

        let fuzzy_clauses: Vec<(Occur, Box<dyn Query>)> = words
            .iter()
            .filter_map(|word| {
                let distance = max_edit_distance(word.chars().count());
                (distance > 0).then(|| {
                    let term = Term::from_field_text(self.words_field, word);
                    (Occur::Should, Box::new(FuzzyTermQuery::new(term, distance, true)) as Box<dyn Query>)
                })
            })
            .collect();

        if fuzzy_clauses.is_empty() {
            return Box::new(trigram_query);
        }

        let fuzzy_min = (fuzzy_clauses.len() + 1) / 2;
        let mut fuzzy_query = BooleanQuery::new(fuzzy_clauses);
        fuzzy_query.set_minimum_number_should_match(fuzzy_min);

        // Document passes if it matches EITHER trigrams OR fuzzy words
        Box::new(BooleanQuery::new(vec![
            (Occur::Should, Box::new(trigram_query) as Box<dyn Query>),
            (Occur::Should, Box::new(fuzzy_query) as Box<dyn Query>),
        ]))
    }
}

fn searchable_text(text: &FieldText) -> String {
    match &text.concentration {
        Some(c) => format!("{} {} {}", text.name.lower, text.brand.lower, c.lower),
        None => format!("{} {}", text.name.lower, text.brand.lower),
    }
}
