pub mod extract;
pub mod index;
pub mod loader;
pub mod search;
pub mod store;
pub mod tfidf;
pub mod tokenizer;
pub mod writer;

pub use index::{DocId, DocumentRecord, Posting, PostingRecord, SearchHit, StructuralTag, TermId, TermStats};
pub use loader::{load_manifest, DocumentLoader, LoadReport, ManifestEntry};
pub use search::{QueryEngine, DEFAULT_RESULT_LIMIT};
pub use store::Store;
pub use tfidf::{compute_tf_idf, RankSummary};
pub use tokenizer::Tokenizer;
pub use writer::{IndexOutcome, IndexWriter};
