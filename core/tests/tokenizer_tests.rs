use docindex::tokenizer::Tokenizer;

#[test]
fn it_normalizes_and_stems() {
    let words = Tokenizer::new().tokenize("Running Runners RUN! The café's menu.");
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    // Unicode normalization: café keeps its accent under NFKC but is lowercased
    assert!(words.iter().any(|w| w.starts_with("caf")));
}

#[test]
fn it_filters_stopwords() {
    let words = Tokenizer::new().tokenize("The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words.len(), 5);
}

#[test]
fn query_and_document_agree() {
    let tokenizer = Tokenizer::new();
    assert_eq!(tokenizer.tokenize("CATS"), tokenizer.tokenize("cats"));
    assert_eq!(tokenizer.tokenize("ﬁsh"), tokenizer.tokenize("fish"));
}
