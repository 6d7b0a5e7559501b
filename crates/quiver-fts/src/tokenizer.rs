//! Text analysis shared by indexing and querying.
//!
//! The analyzer chain is Tantivy's `SimpleTokenizer` → `RemoveLongFilter` →
//! `LowerCaser` → `StopWordFilter` (English list from the `stop-words`
//! crate) → `Stemmer(English)`. Documents and queries go through the same
//! chain, so "searching" in a query matches "search" in a document.

use std::sync::LazyLock;

use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter,
    TextAnalyzer, TokenStream,
};

/// Name the analyzer is registered under in every index.
pub const ANALYZER_NAME: &str = "quiver_en";

/// Tokens of this many bytes or more are dropped.
const MAX_TOKEN_BYTES: usize = 40;

static STOP_WORDS: LazyLock<Vec<String>> = LazyLock::new(|| {
    stop_words::get(stop_words::LANGUAGE::English)
        .iter()
        .map(|word| word.to_string())
        .collect()
});

static ANALYZER: LazyLock<TextAnalyzer> = LazyLock::new(|| {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_BYTES))
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(STOP_WORDS.iter().cloned()))
        .filter(Stemmer::new(Language::English))
        .build()
});

/// The analyzer used for document text and queries.
pub fn analyzer() -> TextAnalyzer {
    ANALYZER.clone()
}

/// Whether `token` (already lowercased) is dropped by the analyzer.
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.iter().any(|word| word == token)
}

/// Split `text` into index terms.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut analyzer = analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while let Some(token) = stream.next() {
        tokens.push(token.text.clone());
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_words_are_stop_words() {
        for word in ["the", "what", "does", "he", "have", "about", "and", "of"] {
            assert!(is_stop_word(word), "{word} should be a stop word");
        }
        assert!(!is_stop_word("tantivy"));
    }

    #[test]
    fn test_tokenize_removes_stop_words_and_stems() {
        assert_eq!(tokenize("What does he have about searching"), vec!["search"]);
    }

    #[test]
    fn test_tokenize_inflections_share_a_stem() {
        assert_eq!(tokenize("searching"), tokenize("search"));
        assert_eq!(tokenize("Searches"), tokenize("search"));
        assert_eq!(tokenize("rankings"), tokenize("ranking"));
    }

    #[test]
    fn test_tokenize_punctuation_and_case() {
        let tokens = tokenize("BM25-Scoring, okapi!");
        assert_eq!(tokens.first().map(String::as_str), Some("bm25"));
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(|t| t.chars().all(|c| c.is_alphanumeric())));
        assert!(tokens.iter().all(|t| *t == t.to_lowercase()));
    }

    #[test]
    fn test_tokenize_empty_and_only_stop_words() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("the of and").is_empty());
    }

    #[test]
    fn test_tokenize_drops_overlong_tokens() {
        let long = "x".repeat(MAX_TOKEN_BYTES + 1);
        assert_eq!(tokenize(&format!("{long} okapi")), tokenize("okapi"));
    }
}
