use serde::{Deserialize, Serialize};

/// Stable external document code, e.g. `0/12` from the manifest.
pub type DocId = String;
pub type TermId = u64;

/// Structural categories drained from a page before the residual body text.
/// The declaration order is the extraction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuralTag {
    Title,
    H1,
    H2,
    H3,
    #[serde(rename = "b")]
    Bold,
}

impl StructuralTag {
    pub const ORDERED: [StructuralTag; 5] = [
        StructuralTag::Title,
        StructuralTag::H1,
        StructuralTag::H2,
        StructuralTag::H3,
        StructuralTag::Bold,
    ];

    /// HTML element name the category is extracted from.
    pub fn selector(self) -> &'static str {
        match self {
            StructuralTag::Title => "title",
            StructuralTag::H1 => "h1",
            StructuralTag::H2 => "h2",
            StructuralTag::H3 => "h3",
            StructuralTag::Bold => "b",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub title: String,
    pub url: String,
    pub word_count: u32,
}

/// One occurrence of a term in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub term_id: TermId,
    pub doc_id: DocId,
    pub position: u32,
    pub tag: Option<StructuralTag>,
    pub weight: f64,
}

/// Value half of a posting; term id, document id and position live in the key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostingRecord {
    pub tag: Option<StructuralTag>,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TermStats {
    pub doc_count: u32,
    pub idf: f64,
}

/// One ranked result. Single-term queries fill every optional field;
/// multi-term queries carry the summed relevance and the earliest matched position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub doc_id: DocId,
    pub url: String,
    pub weight: Option<f64>,
    pub position: Option<u32>,
    pub tag: Option<StructuralTag>,
}
