use crate::index::{DocId, Posting, SearchHit, StructuralTag, TermId};
use crate::store::Store;
use crate::tokenizer::Tokenizer;
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_RESULT_LIMIT: usize = 30;

/// Posting chosen to stand for a term inside one document:
/// highest weight, earliest position on ties.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Representative {
    weight: f64,
    position: u32,
    tag: Option<StructuralTag>,
}

fn representatives(postings: Vec<Posting>) -> BTreeMap<DocId, Representative> {
    let mut reps: BTreeMap<DocId, Representative> = BTreeMap::new();
    for p in postings {
        let candidate = Representative { weight: p.weight, position: p.position, tag: p.tag };
        match reps.get_mut(&p.doc_id) {
            Some(current) => {
                let better = candidate.weight > current.weight
                    || (candidate.weight == current.weight && candidate.position < current.position);
                if better { *current = candidate; }
            }
            None => { reps.insert(p.doc_id, candidate); }
        }
    }
    reps
}

/// Read-only ranked retrieval over a [`Store`]. Holds its own store handle, so
/// one engine can serve any number of concurrent callers.
#[derive(Clone)]
pub struct QueryEngine {
    store: Store,
    tokenizer: Arc<Tokenizer>,
    limit: usize,
}

impl QueryEngine {
    pub fn new(store: Store, tokenizer: Arc<Tokenizer>) -> Self {
        Self { store, tokenizer, limit: DEFAULT_RESULT_LIMIT }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn store(&self) -> &Store { &self.store }

    /// Term ids for the query words that exist in the index, in query order,
    /// without duplicates. Unknown words are dropped.
    pub fn resolve_terms(&self, query: &str) -> Result<Vec<TermId>> {
        let mut ids = Vec::new();
        for term in self.tokenizer.tokenize(query) {
            if let Some(id) = self.store.term_id(&term)? {
                if !ids.contains(&id) { ids.push(id); }
            }
        }
        Ok(ids)
    }

    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let terms = self.resolve_terms(query)?;
        match terms.len() {
            0 => Ok(Vec::new()),
            1 => self.single_term(terms[0]),
            _ => self.multi_term(&terms),
        }
    }

    /// Documents containing `term_id`, by weight then position.
    pub fn single_term(&self, term_id: TermId) -> Result<Vec<SearchHit>> {
        let reps = representatives(self.store.postings_for_term(term_id)?);
        let mut ranked: Vec<(DocId, Representative)> = reps.into_iter().collect();
        ranked.sort_by(|(a_id, a), (b_id, b)| {
            b.weight
                .total_cmp(&a.weight)
                .then(a.position.cmp(&b.position))
                .then_with(|| a_id.cmp(b_id))
        });

        let mut hits = Vec::with_capacity(ranked.len().min(self.limit));
        for (doc_id, rep) in ranked.into_iter().take(self.limit) {
            if let Some(doc) = self.store.document(&doc_id)? {
                hits.push(SearchHit {
                    title: doc.title,
                    doc_id,
                    url: doc.url,
                    weight: Some(rep.weight),
                    position: Some(rep.position),
                    tag: rep.tag,
                });
            }
        }
        Ok(hits)
    }

    /// Pick the candidate pool from the largest group of query terms that
    /// co-occur in some document, then rank it by relevance plus proximity.
    ///
    /// Within a group size only the first combination (lexicographic order of
    /// term indices) with a shared document is used.
    pub fn multi_term(&self, terms: &[TermId]) -> Result<Vec<SearchHit>> {
        if terms.len() == 1 {
            return self.single_term(terms[0]);
        }
        let mut per_term = Vec::with_capacity(terms.len());
        for &term_id in terms {
            per_term.push(representatives(self.store.postings_for_term(term_id)?));
        }

        for size in (1..=terms.len()).rev() {
            for combo in combinations(terms.len(), size) {
                let common = common_documents(&per_term, &combo);
                if common.is_empty() { continue; }
                tracing::debug!(size, ?combo, candidates = common.len(), "winning term combination");
                let candidates = common
                    .into_iter()
                    .map(|doc_id| {
                        let reps: Vec<Representative> = combo.iter().map(|&i| per_term[i][&doc_id]).collect();
                        Candidate::new(doc_id, &reps)
                    })
                    .collect();
                return self.hits_for(rank_candidates(candidates));
            }
        }
        Ok(Vec::new())
    }

    fn hits_for(&self, ranked: Vec<Candidate>) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::with_capacity(ranked.len().min(self.limit));
        for c in ranked.into_iter().take(self.limit) {
            if let Some(doc) = self.store.document(&c.doc_id)? {
                hits.push(SearchHit {
                    title: doc.title,
                    doc_id: c.doc_id,
                    url: doc.url,
                    weight: Some(c.relevance),
                    position: Some(c.first_position),
                    tag: None,
                });
            }
        }
        Ok(hits)
    }
}

fn common_documents(per_term: &[BTreeMap<DocId, Representative>], combo: &[usize]) -> Vec<DocId> {
    let Some(smallest) = combo.iter().map(|&i| &per_term[i]).min_by_key(|m| m.len()) else {
        return Vec::new();
    };
    smallest
        .keys()
        .filter(|doc| combo.iter().all(|&i| per_term[i].contains_key(*doc)))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    doc_id: DocId,
    relevance: f64,
    dispersion: u64,
    first_position: u32,
    score: f64,
}

impl Candidate {
    fn new(doc_id: DocId, reps: &[Representative]) -> Self {
        let relevance: f64 = reps.iter().map(|r| r.weight).sum();
        let mut positions: Vec<u32> = reps.iter().map(|r| r.position).collect();
        positions.sort_unstable();
        let dispersion: u64 = positions.windows(2).map(|w| (w[1] - w[0]) as u64).sum();
        Self { doc_id, relevance, dispersion, first_position: positions[0], score: 0.0 }
    }
}

/// score = relevance / max relevance + min dispersion / dispersion
fn rank_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    let max_relevance = candidates.iter().map(|c| c.relevance).fold(0.0f64, f64::max);
    let min_dispersion = candidates.iter().map(|c| c.dispersion).min().unwrap_or(0);
    for c in candidates.iter_mut() {
        let relevance_norm = if max_relevance > 0.0 { c.relevance / max_relevance } else { 0.0 };
        let dispersion_norm = if c.dispersion == 0 { 1.0 } else { min_dispersion as f64 / c.dispersion as f64 };
        c.score = relevance_norm + dispersion_norm;
    }
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));
    candidates
}

/// k-element index combinations of 0..n in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k == 0 || k > n {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.clone());
        let mut i = k;
        loop {
            if i == 0 { return out; }
            i -= 1;
            if idx[i] != i + n - k { break; }
        }
        idx[i] += 1;
        for j in i + 1..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(weight: f64, position: u32) -> Representative {
        Representative { weight, position, tag: None }
    }

    #[test]
    fn combinations_are_lexicographic() {
        assert_eq!(combinations(3, 3), vec![vec![0, 1, 2]]);
        assert_eq!(combinations(3, 2), vec![vec![0, 1], vec![0, 2], vec![1, 2]]);
        assert_eq!(combinations(3, 1), vec![vec![0], vec![1], vec![2]]);
        assert_eq!(combinations(4, 2).len(), 6);
        assert!(combinations(2, 3).is_empty());
    }

    #[test]
    fn representative_prefers_weight_then_position() {
        let postings = vec![
            Posting { term_id: 1, doc_id: "a".into(), position: 3, tag: None, weight: 0.2 },
            Posting { term_id: 1, doc_id: "a".into(), position: 1, tag: Some(StructuralTag::H1), weight: 0.2 },
            Posting { term_id: 1, doc_id: "b".into(), position: 9, tag: None, weight: 0.1 },
        ];
        let reps = representatives(postings);
        assert_eq!(reps["a"].position, 1);
        assert_eq!(reps["a"].tag, Some(StructuralTag::H1));
        assert_eq!(reps["b"].position, 9);
    }

    #[test]
    fn dispersion_is_sum_of_sorted_gaps() {
        let c = Candidate::new("d".into(), &[rep(0.1, 9), rep(0.2, 2), rep(0.3, 5)]);
        assert_eq!(c.dispersion, 7);
        assert_eq!(c.first_position, 2);
        assert!((c.relevance - 0.6).abs() < 1e-12);
    }

    #[test]
    fn single_candidate_scores_two() {
        let ranked = rank_candidates(vec![Candidate::new("only".into(), &[rep(0.4, 0), rep(0.1, 4)])]);
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn zero_weights_do_not_divide_by_zero() {
        let ranked = rank_candidates(vec![
            Candidate::new("a".into(), &[rep(0.0, 0), rep(0.0, 4)]),
            Candidate::new("b".into(), &[rep(0.0, 0), rep(0.0, 2)]),
        ]);
        assert_eq!(ranked[0].doc_id, "b");
        assert!(ranked.iter().all(|c| c.score.is_finite()));
    }

    #[test]
    fn equal_scores_fall_back_to_document_id() {
        let ranked = rank_candidates(vec![
            Candidate::new("c".into(), &[rep(0.3, 0), rep(0.3, 2)]),
            Candidate::new("a".into(), &[rep(0.3, 5), rep(0.3, 7)]),
            Candidate::new("b".into(), &[rep(0.3, 1), rep(0.3, 3)]),
        ]);
        let order: Vec<&str> = ranked.iter().map(|c| c.doc_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn closer_terms_break_relevance_ties() {
        let ranked = rank_candidates(vec![
            Candidate::new("far".into(), &[rep(0.5, 0), rep(0.5, 10)]),
            Candidate::new("near".into(), &[rep(0.5, 0), rep(0.5, 1)]),
        ]);
        assert_eq!(ranked[0].doc_id, "near");
        assert!((ranked[1].score - 1.1).abs() < 1e-12);
    }
}
