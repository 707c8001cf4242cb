//! Weighted reciprocal rank fusion of a vector and a lexical retriever.

use std::{cmp::Ordering, collections::HashMap};

use tracing::debug;

use super::{LexicalRetriever, Retriever, VectorRetriever};
use crate::{
    document::{Metadata, RetrievedDocument},
    error::{Error, Result},
};

/// Rank offset in the reciprocal rank fusion formula `w / (rank + k)`.
pub const RRF_K: f64 = 60.0;

/// `[vector, lexical]` weights used when none are given.
pub const DEFAULT_WEIGHTS: [f32; 2] = [0.5, 0.5];

/// Minimum number of candidates requested from each retriever.
pub const DEFAULT_CANDIDATE_DEPTH: usize = 20;

/// Combines a vector retriever and a lexical retriever.
///
/// Each retriever with a non-zero weight returns a ranked candidate list.
/// A candidate at 1-based rank `r` in list `i` contributes
/// `weights[i] / (r + 60)` to its fused score; candidates with the same
/// content and metadata are merged. Results are sorted by fused score, then
/// by rank in the more heavily weighted list (the vector list when weights
/// are equal), then by rank in the other list, and truncated to `top_k`.
pub struct HybridRetriever {
    vector: Box<dyn Retriever>,
    lexical: Box<dyn Retriever>,
    weights: [f32; 2],
    candidate_depth: usize,
}

struct Candidate {
    content: String,
    metadata: Metadata,
    score: f64,
    ranks: [Option<usize>; 2],
}

impl HybridRetriever {
    /// Fuse `vector` and `lexical` with `weights` (`[vector, lexical]`,
    /// default `[0.5, 0.5]`).
    pub fn new(
        vector: VectorRetriever,
        lexical: LexicalRetriever,
        weights: Option<[f32; 2]>,
    ) -> Result<Self> {
        Self::from_retrievers(
            Box::new(vector),
            Box::new(lexical),
            weights.unwrap_or(DEFAULT_WEIGHTS),
        )
    }

    /// Fuse arbitrary retrievers, the first playing the vector role.
    pub fn from_retrievers(
        vector: Box<dyn Retriever>,
        lexical: Box<dyn Retriever>,
        weights: [f32; 2],
    ) -> Result<Self> {
        validate_weights(weights)?;
        Ok(Self {
            vector,
            lexical,
            weights,
            candidate_depth: DEFAULT_CANDIDATE_DEPTH,
        })
    }

    /// Request at least `depth` candidates from each retriever.
    pub fn with_candidate_depth(mut self, depth: usize) -> Self {
        self.candidate_depth = depth;
        self
    }

    pub fn weights(&self) -> [f32; 2] {
        self.weights
    }

    pub fn vector_retriever(&self) -> &dyn Retriever {
        self.vector.as_ref()
    }

    pub fn lexical_retriever(&self) -> &dyn Retriever {
        self.lexical.as_ref()
    }

    /// Index of the list whose rank breaks score ties first.
    fn primary_list(&self) -> usize {
        if self.weights[1] > self.weights[0] { 1 } else { 0 }
    }
}

/// Weights must be finite, non-negative and not all zero.
pub fn validate_weights(weights: [f32; 2]) -> Result<()> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(Error::Config(format!(
            "hybrid weights must be finite and non-negative, got {weights:?}"
        )));
    }
    if weights.iter().all(|w| *w == 0.0) {
        return Err(Error::Config(
            "at least one hybrid weight must be positive".to_string(),
        ));
    }
    Ok(())
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("vector", &self.vector.name())
            .field("lexical", &self.lexical.name())
            .field("weights", &self.weights)
            .field("candidate_depth", &self.candidate_depth)
            .finish()
    }
}

impl Retriever for HybridRetriever {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let depth = top_k.max(self.candidate_depth);

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut by_content: HashMap<String, Vec<usize>> = HashMap::new();

        let lists = [self.vector.as_ref(), self.lexical.as_ref()];
        for (list, retriever) in lists.into_iter().enumerate() {
            let weight = f64::from(self.weights[list]);
            if weight == 0.0 {
                continue;
            }
            let results = retriever.retrieve(query, depth)?;
            debug!(
                retriever = retriever.name(),
                candidates = results.len(),
                "hybrid candidates"
            );

            for (i, doc) in results.into_iter().enumerate() {
                let rank = i + 1;
                let contribution = weight / (rank as f64 + RRF_K);
                // A chunk is its content and metadata. Each list merges
                // with a given candidate at most once.
                let same_chunk = by_content.get(&doc.content).and_then(|ids| {
                    ids.iter().copied().find(|&idx| {
                        candidates[idx].ranks[list].is_none()
                            && candidates[idx].metadata == doc.metadata
                    })
                });
                match same_chunk {
                    Some(idx) => {
                        let candidate = &mut candidates[idx];
                        candidate.ranks[list] = Some(rank);
                        candidate.score += contribution;
                    }
                    None => {
                        by_content
                            .entry(doc.content.clone())
                            .or_default()
                            .push(candidates.len());
                        let mut ranks = [None, None];
                        ranks[list] = Some(rank);
                        candidates.push(Candidate {
                            content: doc.content,
                            metadata: doc.metadata,
                            score: contribution,
                            ranks,
                        });
                    }
                }
            }
        }

        let primary = self.primary_list();
        let secondary = 1 - primary;
        let rank_of =
            |c: &Candidate, list: usize| c.ranks[list].unwrap_or(usize::MAX);
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| rank_of(a, primary).cmp(&rank_of(b, primary)))
                .then_with(|| rank_of(a, secondary).cmp(&rank_of(b, secondary)))
        });
        candidates.truncate(top_k);

        Ok(candidates
            .into_iter()
            .map(|c| RetrievedDocument {
                content: c.content,
                metadata: c.metadata,
                score: c.score as f32,
            })
            .collect())
    }
}
