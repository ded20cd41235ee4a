//! Exact nearest-neighbour index over the product catalog
//!
//! Vectors are L2-normalized at build time, so a dot product is the cosine
//! similarity. The index is immutable after construction and safe to share
//! across tasks without locking.

use crate::embedding::EmbeddingProvider;
use crate::error::AgentError;
use crate::models::{CatalogEntry, ScoredMatch};
use crate::Result;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub mod catalog;
pub use catalog::default_catalog;

pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    // Parallel arrays: position i describes the same entry everywhere.
    ids: Vec<String>,
    texts: Vec<String>,
    metadata: Vec<Map<String, Value>>,
    /// Row-major `len() × dimension`
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Embed and normalize every entry. An empty corpus builds an index that
    /// answers every search with nothing.
    pub async fn build(
        entries: Vec<CatalogEntry>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let dimension = embedder.dimension();

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(AgentError::InvalidInput(format!(
                    "duplicate catalog id '{}'",
                    entry.id
                )));
            }
        }

        let n = entries.len();
        let mut ids = Vec::with_capacity(n);
        let mut texts = Vec::with_capacity(n);
        let mut metadata = Vec::with_capacity(n);

        for entry in entries {
            ids.push(entry.id);
            texts.push(entry.text);
            metadata.push(entry.metadata);
        }

        let mut vectors = Vec::with_capacity(n * dimension);

        if n > 0 {
            let embedded = embedder.embed_batch(&texts).await?;
            if embedded.len() != n {
                return Err(AgentError::UpstreamUnavailable(format!(
                    "embedding provider returned {} vectors for {} entries",
                    embedded.len(),
                    n
                )));
            }

            for mut vector in embedded {
                check_dimension(dimension, &vector)?;
                l2_normalize(&mut vector);
                vectors.extend_from_slice(&vector);
            }
        }

        info!(entries = n, dimension, "Vector index built");

        Ok(Self {
            embedder,
            dimension,
            ids,
            texts,
            metadata,
            vectors,
        })
    }

    /// Build from an untyped corpus; anything but a JSON array is rejected.
    pub async fn from_json(corpus: &Value, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let items = corpus.as_array().ok_or_else(|| {
            AgentError::InvalidInput("corpus must be a JSON array of entries".to_string())
        })?;

        let entries = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value::<CatalogEntry>(item.clone()).map_err(|e| {
                    AgentError::InvalidInput(format!("corpus entry {}: {}", i, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::build(entries, embedder).await
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Look up an entry by id (a fresh copy).
    pub fn get(&self, id: &str) -> Option<CatalogEntry> {
        let pos = self.ids.iter().position(|candidate| candidate == id)?;
        Some(CatalogEntry {
            id: self.ids[pos].clone(),
            text: self.texts[pos].clone(),
            metadata: self.metadata[pos].clone(),
        })
    }

    /// Top-k entries by cosine similarity to `query`, best first.
    ///
    /// `top_k` larger than the corpus is clamped; zero yields nothing and
    /// skips the embedding call. Equal scores keep corpus order.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredMatch>> {
        let k = top_k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut query_vector = self.embedder.embed(query).await?;
        check_dimension(self.dimension, &query_vector)?;
        l2_normalize(&mut query_vector);

        let ranked = select_top_k(self.scores(&query_vector), k);

        debug!(
            top_k,
            returned = ranked.len(),
            best = ranked.first().map(|(_, s)| *s),
            "Vector search complete"
        );

        Ok(ranked
            .into_iter()
            .map(|(pos, score)| ScoredMatch {
                id: self.ids[pos].clone(),
                text: self.texts[pos].clone(),
                metadata: self.metadata[pos].clone(),
                score,
            })
            .collect())
    }

    fn scores(&self, query: &[f32]) -> Vec<(usize, f32)> {
        self.vectors
            .chunks_exact(self.dimension.max(1))
            .map(|row| row.iter().zip(query).map(|(a, b)| a * b).sum::<f32>())
            .enumerate()
            .collect()
    }
}

fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(AgentError::EmbeddingDimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}

/// Scale to unit length. A zero vector is divided by one and stays zero.
pub fn l2_normalize(vector: &mut [f32]) {
    let mut norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        norm = 1.0;
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
}

/// Higher score first, then lower corpus position.
fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Full sort when every item is wanted, otherwise partial selection of the
/// best `k` followed by a sort of just those.
fn select_top_k(mut scored: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    if k == 0 {
        return Vec::new();
    }

    if k >= scored.len() {
        scored.sort_by(rank_order);
        return scored;
    }

    scored.select_nth_unstable_by(k - 1, rank_order);
    scored.truncate(k);
    scored.sort_by(rank_order);
    scored
}
