use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;
use std::collections::HashSet;

lazy_static! {
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Text to canonical terms: NFKC normalization, lowercase, alphabetic words only,
/// stopword removal and English stemming.
///
/// Build one per process and share it behind an `Arc`; ingestion and query
/// resolution must agree on the exact same term forms.
pub struct Tokenizer {
    word: Regex,
    stemmer: Stemmer,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            word: Regex::new(r"[\p{L}\p{N}_']+").expect("valid regex"),
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        let mut terms = Vec::new();
        for mat in self.word.find_iter(&normalized) {
            let token = mat.as_str().trim_matches('\'');
            // a digit or underscore anywhere disqualifies the whole token
            if token.is_empty() || !token.chars().all(|c| c.is_alphabetic() || c == '\'') { continue; }
            if is_stopword(token) { continue; }
            let stem = self.stemmer.stem(token);
            // possessives survive the regex; the stemmer strips them, anything left is dropped
            if stem.is_empty() || !stem.chars().all(char::is_alphabetic) { continue; }
            terms.push(stem.into_owned());
        }
        terms
    }
}

impl Default for Tokenizer {
    fn default() -> Self { Self::new() }
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }
