//! In-memory BM25 inverted index over a project's files.
//!
//! Each document has two fields, its project-relative path and its text.
//! Both are tokenized the same way and scored with BM25 (`k1 = 1.2`,
//! `b = 0.75`); a document's score is the sum over fields. Raw scores are
//! unbounded, so callers normalize them before fusing.

use std::collections::HashMap;
use std::path::PathBuf;

const K1: f64 = 1.2;
const B: f64 = 0.75;
const MIN_TOKEN_LEN: usize = 2;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is", "it", "of",
    "on", "or", "that", "the", "this", "to", "was", "what", "when", "where", "which", "with",
];

/// A file handed to the index builder.
#[derive(Debug, Clone)]
pub struct IndexDoc {
    pub path: PathBuf,
    /// Path relative to the project root, used as the path field.
    pub rel: String,
    pub text: String,
}

/// A lexical hit: document position and raw BM25 score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    pub doc: usize,
    pub score: f64,
}

#[derive(Debug, Default)]
struct Field {
    /// term -> (doc, term frequency)
    postings: HashMap<String, Vec<(usize, u32)>>,
    lengths: Vec<u32>,
    avg_len: f64,
}

impl Field {
    fn add(&mut self, doc: usize, tokens: Vec<String>) {
        self.lengths.push(tokens.len() as u32);
        let mut tf: HashMap<String, u32> = HashMap::new();
        for t in tokens {
            *tf.entry(t).or_insert(0) += 1;
        }
        for (term, n) in tf {
            self.postings.entry(term).or_default().push((doc, n));
        }
    }

    fn finish(&mut self) {
        let total: u64 = self.lengths.iter().map(|&l| l as u64).sum();
        self.avg_len = if self.lengths.is_empty() {
            0.0
        } else {
            total as f64 / self.lengths.len() as f64
        };
    }

    fn score_into(&self, term: &str, n_docs: usize, scores: &mut [f64]) {
        let Some(postings) = self.postings.get(term) else {
            return;
        };
        let df = postings.len() as f64;
        let idf = (1.0 + (n_docs as f64 - df + 0.5) / (df + 0.5)).ln();
        for &(doc, tf) in postings {
            let tf = tf as f64;
            let len = self.lengths[doc] as f64;
            let norm = if self.avg_len > 0.0 {
                1.0 - B + B * len / self.avg_len
            } else {
                1.0
            };
            scores[doc] += idf * (tf * (K1 + 1.0)) / (tf + K1 * norm);
        }
    }
}

#[derive(Debug, Default)]
pub struct LexicalIndex {
    docs: Vec<IndexDoc>,
    path_field: Field,
    body_field: Field,
}

impl LexicalIndex {
    pub fn build(docs: Vec<IndexDoc>) -> Self {
        let mut path_field = Field::default();
        let mut body_field = Field::default();
        for (i, doc) in docs.iter().enumerate() {
            path_field.add(i, tokenize(&doc.rel));
            body_field.add(i, tokenize(&doc.text));
        }
        path_field.finish();
        body_field.finish();
        Self {
            docs,
            path_field,
            body_field,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn doc(&self, i: usize) -> Option<&IndexDoc> {
        self.docs.get(i)
    }

    pub fn docs(&self) -> &[IndexDoc] {
        &self.docs
    }

    /// Matching documents by descending raw score, ties by path.
    pub fn search(&self, query: &str) -> Vec<LexicalHit> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }
        let n = self.docs.len();
        let mut scores = vec![0.0f64; n];
        for term in &terms {
            self.path_field.score_into(term, n, &mut scores);
            self.body_field.score_into(term, n, &mut scores);
        }
        let mut hits: Vec<LexicalHit> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .map(|(doc, score)| LexicalHit { doc, score })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.docs[a.doc].rel.cmp(&self.docs[b.doc].rel))
        });
        hits
    }
}

/// Lowercased alphanumeric runs, minus stopwords and one-letter tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}
