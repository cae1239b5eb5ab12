use crate::index::{DocId, PostingRecord, TermId, TermStats};
use crate::store::{decode_posting_key, decode_term_id, txn_error, RankingMarker, Store, MARKER_VERSION, RANKING_KEY};
use anyhow::Result;
use serde::Serialize;
use sled::transaction::ConflictableTransactionResult;
use sled::{Batch, Transactional};
use std::collections::HashMap;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, Serialize)]
pub struct RankSummary {
    pub documents: u64,
    pub terms: usize,
    pub postings: usize,
    pub ranked_at: String,
}

/// log10(N / k); zero when the term is in no document.
pub fn idf(total_documents: u64, doc_count: u32) -> f64 {
    if total_documents == 0 || doc_count == 0 {
        return 0.0;
    }
    (total_documents as f64 / doc_count as f64).log10()
}

/// Recompute IDF for every term and the weight of every posting from the
/// current table contents, then commit both in one transaction.
///
/// Assumes no concurrent writer. Safe to run any number of times.
pub fn compute_tf_idf(store: &Store) -> Result<RankSummary> {
    let n = store.document_count() as u64;

    let mut idf_by_term: HashMap<TermId, f64> = HashMap::new();
    let mut stats_batch = Batch::default();
    for item in store.term_doc_count.iter() {
        let (key, raw) = item?;
        let term_id = decode_term_id(&key)?;
        let mut stats: TermStats = bincode::deserialize(&raw)?;
        stats.idf = idf(n, stats.doc_count);
        idf_by_term.insert(term_id, stats.idf);
        stats_batch.insert(key, bincode::serialize(&stats)?);
    }

    // postings arrive grouped by (term, document), so one cached tf covers a run
    let mut postings_batch = Batch::default();
    let mut postings = 0usize;
    let mut current: Option<(TermId, DocId, f64)> = None;
    for item in store.postings.iter() {
        let (key, raw) = item?;
        let (term_id, doc_id, _) = decode_posting_key(&key)?;
        let cached = matches!(&current, Some((t, d, _)) if *t == term_id && *d == doc_id);
        if !cached {
            let tf = store.term_frequency(&doc_id, term_id)?.unwrap_or(0.0);
            current = Some((term_id, doc_id, tf));
        }
        let tf = current.as_ref().map(|(_, _, tf)| *tf).unwrap_or(0.0);
        let mut record: PostingRecord = bincode::deserialize(&raw)?;
        record.weight = tf * idf_by_term.get(&term_id).copied().unwrap_or(0.0);
        postings_batch.insert(key, bincode::serialize(&record)?);
        postings += 1;
    }

    let ranked_at = time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "".into());
    let marker = RankingMarker { ranked_documents: n, ranked_at: ranked_at.clone(), version: MARKER_VERSION };
    let marker_bytes = serde_json::to_vec(&marker)?;

    (&store.term_doc_count, &store.postings, &store.meta)
        .transaction(|(term_doc_count, posting_tree, meta)| -> ConflictableTransactionResult<(), anyhow::Error> {
            term_doc_count.apply_batch(&stats_batch)?;
            posting_tree.apply_batch(&postings_batch)?;
            meta.insert(RANKING_KEY, marker_bytes.as_slice())?;
            Ok(())
        })
        .map_err(txn_error)?;

    let summary = RankSummary { documents: n, terms: idf_by_term.len(), postings, ranked_at };
    tracing::info!(documents = summary.documents, terms = summary.terms, postings = summary.postings, "tf-idf pass complete");
    Ok(summary)
}
