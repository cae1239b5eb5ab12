use crate::index::{DocId, DocumentRecord, Posting, PostingRecord, TermId, TermStats};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionError;
use sled::{Db, Tree};
use std::path::Path;

/// The fixed set of trees backing an index. Nothing outside this enum names a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// document id -> DocumentRecord
    Documents,
    /// surface form -> term id
    Terms,
    /// (term id, document id, position) -> PostingRecord
    Postings,
    /// (document id, term id) -> raw frequency
    DocTf,
    /// term id -> TermStats
    TermDocCount,
    Meta,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Documents,
        Table::Terms,
        Table::Postings,
        Table::DocTf,
        Table::TermDocCount,
        Table::Meta,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Documents => "documents",
            Table::Terms => "terms",
            Table::Postings => "postings",
            Table::DocTf => "doc_tf",
            Table::TermDocCount => "term_doc_count",
            Table::Meta => "meta",
        }
    }
}

pub(crate) const RANKING_KEY: &[u8] = b"ranking";
pub const MARKER_VERSION: u32 = 1;

/// Written by every TF-IDF pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingMarker {
    pub ranked_documents: u64,
    pub ranked_at: String,
    pub version: u32,
}

/// Handle on the index database. Cloning is cheap and every clone may be used
/// from its own thread; reads never take locks.
#[derive(Clone)]
pub struct Store {
    db: Db,
    pub(crate) documents: Tree,
    pub(crate) terms: Tree,
    pub(crate) postings: Tree,
    pub(crate) doc_tf: Tree,
    pub(crate) term_doc_count: Tree,
    pub(crate) meta: Tree,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).with_context(|| format!("opening index store at {}", path.display()))?;
        Self::from_db(db)
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open().context("opening temporary index store")?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let open = |t: Table| db.open_tree(t.name()).with_context(|| format!("opening tree {}", t.name()));
        Ok(Self {
            documents: open(Table::Documents)?,
            terms: open(Table::Terms)?,
            postings: open(Table::Postings)?,
            doc_tf: open(Table::DocTf)?,
            term_doc_count: open(Table::TermDocCount)?,
            meta: open(Table::Meta)?,
            db,
        })
    }

    pub fn tree(&self, table: Table) -> &Tree {
        match table {
            Table::Documents => &self.documents,
            Table::Terms => &self.terms,
            Table::Postings => &self.postings,
            Table::DocTf => &self.doc_tf,
            Table::TermDocCount => &self.term_doc_count,
            Table::Meta => &self.meta,
        }
    }

    pub fn row_count(&self, table: Table) -> usize { self.tree(table).len() }

    pub fn document_count(&self) -> usize { self.documents.len() }

    pub fn contains_document(&self, doc_id: &str) -> Result<bool> {
        Ok(self.documents.contains_key(doc_id.as_bytes())?)
    }

    pub fn document(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        match self.documents.get(doc_id.as_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn term_id(&self, surface: &str) -> Result<Option<TermId>> {
        match self.terms.get(surface.as_bytes())? {
            Some(raw) => Ok(Some(decode_term_id(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn term_stats(&self, term_id: TermId) -> Result<Option<TermStats>> {
        match self.term_doc_count.get(term_id.to_be_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Raw frequency of a term in a document (occurrences / word count).
    pub fn term_frequency(&self, doc_id: &str, term_id: TermId) -> Result<Option<f64>> {
        match self.doc_tf.get(doc_tf_key(doc_id, term_id))? {
            Some(raw) => Ok(Some(decode_f64(&raw)?)),
            None => Ok(None),
        }
    }

    /// All postings of a term ordered by (document id, position).
    pub fn postings_for_term(&self, term_id: TermId) -> Result<Vec<Posting>> {
        let mut out = Vec::new();
        for item in self.postings.scan_prefix(term_id.to_be_bytes()) {
            let (key, value) = item?;
            out.push(decode_posting(&key, &value)?);
        }
        Ok(out)
    }

    /// Postings of one term inside one document, ordered by position.
    pub fn postings_for_term_in_document(&self, term_id: TermId, doc_id: &str) -> Result<Vec<Posting>> {
        let mut prefix = term_id.to_be_bytes().to_vec();
        prefix.extend_from_slice(&doc_segment(doc_id));
        let mut out = Vec::new();
        for item in self.postings.scan_prefix(prefix) {
            let (key, value) = item?;
            out.push(decode_posting(&key, &value)?);
        }
        Ok(out)
    }

    /// Postings of one document in position order. Walks the whole postings tree.
    pub fn postings_for_document(&self, doc_id: &str) -> Result<Vec<Posting>> {
        let mut out = Vec::new();
        for item in self.postings.iter() {
            let (key, value) = item?;
            let (_, key_doc, _) = decode_posting_key(&key)?;
            if key_doc == doc_id {
                out.push(decode_posting(&key, &value)?);
            }
        }
        out.sort_by_key(|p| p.position);
        Ok(out)
    }

    pub(crate) fn allocate_term_id(&self) -> Result<TermId> {
        Ok(self.db.generate_id()?)
    }

    pub fn ranking_marker(&self) -> Result<Option<RankingMarker>> {
        match self.meta.get(RANKING_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// True when documents were added (or none ranked yet) since the last TF-IDF pass.
    pub fn needs_ranking(&self) -> Result<bool> {
        let docs = self.document_count() as u64;
        Ok(match self.ranking_marker()? {
            Some(marker) => marker.ranked_documents != docs,
            None => docs > 0,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("flushing index store")?;
        Ok(())
    }
}

/// Length-prefixed so one id can never be a prefix of another inside a composite key.
pub(crate) fn doc_segment(doc_id: &str) -> Vec<u8> {
    let bytes = doc_id.as_bytes();
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
    out
}

pub(crate) fn posting_key(term_id: TermId, doc_id: &str, position: u32) -> Vec<u8> {
    let mut key = term_id.to_be_bytes().to_vec();
    key.extend_from_slice(&doc_segment(doc_id));
    key.extend_from_slice(&position.to_be_bytes());
    key
}

pub(crate) fn decode_posting_key(key: &[u8]) -> Result<(TermId, DocId, u32)> {
    if key.len() < 16 {
        bail!("posting key too short: {} bytes", key.len());
    }
    let term_id = decode_term_id(&key[..8])?;
    let doc_len = u32::from_be_bytes(key[8..12].try_into()?) as usize;
    if key.len() != 16 + doc_len {
        bail!("posting key length mismatch");
    }
    let doc_id = std::str::from_utf8(&key[12..12 + doc_len])?.to_string();
    let position = u32::from_be_bytes(key[12 + doc_len..].try_into()?);
    Ok((term_id, doc_id, position))
}

fn decode_posting(key: &[u8], value: &[u8]) -> Result<Posting> {
    let (term_id, doc_id, position) = decode_posting_key(key)?;
    let record: PostingRecord = bincode::deserialize(value)?;
    Ok(Posting { term_id, doc_id, position, tag: record.tag, weight: record.weight })
}

pub(crate) fn doc_tf_key(doc_id: &str, term_id: TermId) -> Vec<u8> {
    let mut key = doc_segment(doc_id);
    key.extend_from_slice(&term_id.to_be_bytes());
    key
}

pub(crate) fn decode_term_id(raw: &[u8]) -> Result<TermId> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| anyhow!("term id must be 8 bytes, got {}", raw.len()))?;
    Ok(TermId::from_be_bytes(bytes))
}

pub(crate) fn decode_f64(raw: &[u8]) -> Result<f64> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| anyhow!("float must be 8 bytes, got {}", raw.len()))?;
    Ok(f64::from_be_bytes(bytes))
}

pub(crate) fn txn_error(err: TransactionError<anyhow::Error>) -> anyhow::Error {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => anyhow::Error::new(e).context("index store transaction failed"),
    }
}
