use crate::extract::extract_html;
use crate::index::DocId;
use crate::store::Store;
use crate::tfidf::{compute_tf_idf, RankSummary};
use crate::tokenizer::Tokenizer;
use crate::writer::{IndexOutcome, IndexWriter};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One manifest line: the document id doubles as its path under the pages root.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub doc_id: DocId,
    pub url: String,
}

/// Read a manifest, a JSON object mapping document id to source url.
/// Entries come back in file order.
pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<ManifestEntry>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("opening manifest {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    parse_manifest(json)
}

pub fn parse_manifest(json: serde_json::Value) -> Result<Vec<ManifestEntry>> {
    let serde_json::Value::Object(map) = json else {
        bail!("manifest must be a JSON object of document id -> url");
    };
    let mut entries = Vec::with_capacity(map.len());
    for (doc_id, url) in map {
        match url {
            serde_json::Value::String(url) => entries.push(ManifestEntry { doc_id, url }),
            other => bail!("manifest entry {doc_id} has non-string url {other}"),
        }
    }
    Ok(entries)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub interrupted: bool,
    pub rank: Option<RankSummary>,
}

/// Drives a batch: skip known ids, extract and index the rest, then run the
/// TF-IDF pass over everything in the store.
pub struct DocumentLoader {
    writer: IndexWriter,
    pages_root: PathBuf,
    interrupt: Arc<AtomicBool>,
}

impl DocumentLoader {
    pub fn new<P: AsRef<Path>>(store: Store, tokenizer: Arc<Tokenizer>, pages_root: P) -> Self {
        Self {
            writer: IndexWriter::new(store, tokenizer),
            pages_root: pages_root.as_ref().to_path_buf(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned stop flag, e.g. one set from a signal handler.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn interrupt_handle(&self) -> Arc<AtomicBool> { self.interrupt.clone() }

    pub fn run(&self, entries: &[ManifestEntry]) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        for (ind, entry) in entries.iter().enumerate() {
            if self.interrupt.load(Ordering::SeqCst) {
                tracing::warn!(remaining = entries.len() - ind, "interrupted, stopping ingestion");
                report.interrupted = true;
                break;
            }
            match self.ingest(entry) {
                Ok(IndexOutcome::Indexed { word_count, .. }) => {
                    report.indexed += 1;
                    tracing::info!(ind, doc_id = %entry.doc_id, word_count, "document indexed");
                }
                Ok(IndexOutcome::AlreadyIndexed) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(doc_id = %entry.doc_id, error = %format!("{e:#}"), "skipping document");
                }
            }
        }
        tracing::info!(indexed = report.indexed, skipped = report.skipped, failed = report.failed, "ingestion finished");

        report.rank = Some(compute_tf_idf(self.writer.store())?);
        self.writer.store().flush()?;
        Ok(report)
    }

    fn ingest(&self, entry: &ManifestEntry) -> Result<IndexOutcome> {
        if self.writer.store().contains_document(&entry.doc_id)? {
            return Ok(IndexOutcome::AlreadyIndexed);
        }
        let path = self.pages_root.join(&entry.doc_id);
        let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let page = extract_html(&String::from_utf8_lossy(&bytes))?;
        self.writer.index_document(&entry.doc_id, &entry.url, &page)
    }
}
