use crate::extract::ExtractedPage;
use crate::index::{DocumentRecord, PostingRecord, StructuralTag, TermId, TermStats};
use crate::store::{doc_tf_key, posting_key, txn_error, Store};
use crate::tokenizer::Tokenizer;
use anyhow::{bail, Result};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use sled::Transactional;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    Indexed { word_count: u32, distinct_terms: usize, new_terms: usize },
    /// The document id was already present; nothing was written.
    AlreadyIndexed,
}

/// Turns one extracted page into postings, terms and frequency counters.
pub struct IndexWriter {
    store: Store,
    tokenizer: Arc<Tokenizer>,
}

impl IndexWriter {
    pub fn new(store: Store, tokenizer: Arc<Tokenizer>) -> Self {
        Self { store, tokenizer }
    }

    pub fn store(&self) -> &Store { &self.store }

    /// Structural words first in category order, body words last. The index in
    /// the returned vector is the word's position.
    pub fn tagged_words(&self, page: &ExtractedPage) -> Vec<(String, Option<StructuralTag>)> {
        let mut words = Vec::new();
        for (tag, text) in &page.sections {
            words.extend(self.tokenizer.tokenize(text).into_iter().map(|w| (w, Some(*tag))));
        }
        words.extend(self.tokenizer.tokenize(&page.body).into_iter().map(|w| (w, None)));
        words
    }

    /// Write one document in a single transaction. The document row is inserted
    /// last inside that transaction, so a failed write never makes the id look
    /// indexed.
    pub fn index_document(&self, doc_id: &str, url: &str, page: &ExtractedPage) -> Result<IndexOutcome> {
        if self.store.contains_document(doc_id)? {
            return Ok(IndexOutcome::AlreadyIndexed);
        }
        let words = self.tagged_words(page);
        if words.len() > u32::MAX as usize {
            bail!("document {doc_id} has too many words ({})", words.len());
        }
        let word_count = words.len() as u32;

        // distinct terms in order of first appearance
        let mut counts: HashMap<&str, u32> = HashMap::new();
        let mut distinct: Vec<&str> = Vec::new();
        for (word, _) in &words {
            let c = counts.entry(word.as_str()).or_insert(0);
            if *c == 0 { distinct.push(word.as_str()); }
            *c += 1;
        }

        let mut ids: HashMap<&str, TermId> = HashMap::with_capacity(distinct.len());
        let mut fresh: Vec<(&str, TermId)> = Vec::new();
        for &term in &distinct {
            let id = match self.store.term_id(term)? {
                Some(id) => id,
                None => {
                    let id = self.store.allocate_term_id()?;
                    fresh.push((term, id));
                    id
                }
            };
            ids.insert(term, id);
        }

        let mut posting_rows = Vec::with_capacity(words.len());
        for (position, (word, tag)) in words.iter().enumerate() {
            let record = PostingRecord { tag: *tag, weight: 0.0 };
            posting_rows.push((posting_key(ids[word.as_str()], doc_id, position as u32), bincode::serialize(&record)?));
        }
        let tf_rows: Vec<(Vec<u8>, [u8; 8])> = distinct
            .iter()
            .map(|term| {
                let tf = counts[term] as f64 / word_count as f64;
                (doc_tf_key(doc_id, ids[term]), tf.to_be_bytes())
            })
            .collect();
        let doc_value = bincode::serialize(&DocumentRecord { title: page.title.clone(), url: url.to_string(), word_count })?;

        let written = (
            &self.store.documents,
            &self.store.terms,
            &self.store.postings,
            &self.store.doc_tf,
            &self.store.term_doc_count,
        )
            .transaction(|(documents, terms, postings, doc_tf, term_doc_count)| -> ConflictableTransactionResult<bool, anyhow::Error> {
                if documents.get(doc_id.as_bytes())?.is_some() {
                    return Ok(false);
                }
                for (surface, id) in &fresh {
                    terms.insert(surface.as_bytes(), &id.to_be_bytes()[..])?;
                }
                for (key, value) in &posting_rows {
                    postings.insert(key.as_slice(), value.as_slice())?;
                }
                for (key, tf) in &tf_rows {
                    doc_tf.insert(key.as_slice(), &tf[..])?;
                }
                for term in &distinct {
                    let key = ids[term].to_be_bytes();
                    let stats = match term_doc_count.get(&key[..])? {
                        Some(raw) => {
                            let mut stats: TermStats = bincode::deserialize(&raw).map_err(abort)?;
                            stats.doc_count += 1;
                            stats
                        }
                        None => TermStats { doc_count: 1, idf: 0.0 },
                    };
                    term_doc_count.insert(&key[..], bincode::serialize(&stats).map_err(abort)?)?;
                }
                documents.insert(doc_id.as_bytes(), doc_value.as_slice())?;
                Ok(true)
            })
            .map_err(txn_error)?;

        if !written {
            return Ok(IndexOutcome::AlreadyIndexed);
        }
        tracing::debug!(doc_id, word_count, new_terms = fresh.len(), "indexed document");
        Ok(IndexOutcome::Indexed { word_count, distinct_terms: distinct.len(), new_terms: fresh.len() })
    }
}

fn abort(e: bincode::Error) -> ConflictableTransactionError<anyhow::Error> {
    ConflictableTransactionError::Abort(anyhow::Error::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> IndexWriter {
        IndexWriter::new(Store::temporary().unwrap(), Arc::new(Tokenizer::new()))
    }

    #[test]
    fn positions_are_contiguous_and_structural_first() {
        let w = writer();
        let page = ExtractedPage::new("Garden")
            .with_section(StructuralTag::Title, "garden tools")
            .with_section(StructuralTag::Bold, "shovel")
            .with_body("rake shovel garden");
        let outcome = w.index_document("d1", "http://x/d1", &page).unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed { word_count: 6, distinct_terms: 4, new_terms: 4 });

        let postings = w.store().postings_for_document("d1").unwrap();
        let positions: Vec<u32> = postings.iter().map(|p| p.position).collect();
        assert_eq!(positions, (0..6).collect::<Vec<u32>>());
        let last_tagged = postings.iter().filter(|p| p.tag.is_some()).map(|p| p.position).max().unwrap();
        let first_body = postings.iter().filter(|p| p.tag.is_none()).map(|p| p.position).min().unwrap();
        assert!(last_tagged < first_body);
        assert!(postings.iter().all(|p| p.weight == 0.0));
    }

    #[test]
    fn raw_frequency_and_document_counts() {
        let w = writer();
        w.index_document("a", "u", &ExtractedPage::plain("", "apple apple pear banana")).unwrap();
        w.index_document("b", "u", &ExtractedPage::plain("", "apple kiwi")).unwrap();
        let store = w.store();
        let term = |s: &str| Tokenizer::new().tokenize(s).remove(0);
        let apple = store.term_id(&term("apple")).unwrap().expect("apple indexed");
        assert!((store.term_frequency("a", apple).unwrap().unwrap() - 0.5).abs() < 1e-12);
        assert!((store.term_frequency("b", apple).unwrap().unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(store.term_stats(apple).unwrap().unwrap().doc_count, 2);
        let kiwi = store.term_id(&term("kiwi")).unwrap().unwrap();
        assert_eq!(store.term_stats(kiwi).unwrap().unwrap().doc_count, 1);
        assert_eq!(store.document("a").unwrap().unwrap().word_count, 4);
    }

    #[test]
    fn reindexing_is_a_noop() {
        let w = writer();
        let page = ExtractedPage::plain("Cats", "cats purr");
        w.index_document("c", "u", &page).unwrap();
        let before = w.store().row_count(crate::store::Table::Postings);
        assert_eq!(w.index_document("c", "u", &page).unwrap(), IndexOutcome::AlreadyIndexed);
        assert_eq!(w.store().row_count(crate::store::Table::Postings), before);
    }

    #[test]
    fn nested_structural_word_is_posted_once() {
        let w = writer();
        let page = crate::extract::extract_html("<h1>Alpha <b>zebra</b></h1><p>body</p>").unwrap();
        let outcome = w.index_document("n", "u", &page).unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed { word_count: 3, distinct_terms: 3, new_terms: 3 });

        let store = w.store();
        let zebra = store.term_id(&Tokenizer::new().tokenize("zebra").remove(0)).unwrap().unwrap();
        let postings = store.postings_for_term(zebra).unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!((postings[0].position, postings[0].tag), (1, Some(StructuralTag::H1)));
        assert!((store.term_frequency("n", zebra).unwrap().unwrap() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_page_is_still_recorded() {
        let w = writer();
        let outcome = w.index_document("empty", "u", &ExtractedPage::default()).unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed { word_count: 0, distinct_terms: 0, new_terms: 0 });
        assert!(w.store().contains_document("empty").unwrap());
    }
}
