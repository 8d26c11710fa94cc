use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use stop_words::{get, LANGUAGE};
use unicode_segmentation::UnicodeSegmentation;

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").unwrap());
static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+").unwrap());
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\+?\d{1,2}[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b").unwrap());
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,4}[/.-]\d{1,2}[/.-]\d{1,4}\b").unwrap());
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d{1,2}:\d{2}(:\d{2})?\s*(am|pm)?\b").unwrap()
});
static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(\.\d+)?%").unwrap());
static EMOJI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        "[\u{1F600}-\u{1F64F}\u{1F300}-\u{1F5FF}\u{1F680}-\u{1F6FF}\u{1F1E0}-\u{1F1FF}\u{2702}-\u{27B0}\u{24C2}-\u{1F251}]+",
    )
    .unwrap()
});

/// Strip URLs, HTML remnants, emails, phone numbers, dates, times,
/// percentages and emoji, in that order, before segmentation.
fn scrub(text: &str) -> String {
    let text = URL_RE.replace_all(text, " ");
    let text = HTML_TAG_RE.replace_all(&text, " ");
    let text = EMAIL_RE.replace_all(&text, " ");
    let text = PHONE_RE.replace_all(&text, " ");
    let text = DATE_RE.replace_all(&text, " ");
    let text = TIME_RE.replace_all(&text, " ");
    let text = PERCENT_RE.replace_all(&text, " ");
    EMOJI_RE.replace_all(&text, " ").into_owned()
}

/// Normalizes raw page text into the ordered token list the posting tables
/// are built from. There is no POS tagger in this stack, so every token is
/// stemmed uniformly rather than lemmatizing only nouns/proper-nouns.
pub struct Tokenizer {
    stopwords: std::collections::HashSet<String>,
    stemmer: Stemmer,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            stopwords: get(LANGUAGE::English).into_iter().collect(),
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let scrubbed = scrub(text);
        scrubbed
            .unicode_words()
            .map(|w| w.to_lowercase())
            .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
            .filter(|w| !self.stopwords.contains(w))
            .map(|w| self.stemmer.stem(&w).into_owned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_urls_and_emails_before_segmenting() {
        let tok = Tokenizer::new();
        let tokens = tok.tokenize("Visit https://example.test or mail me@example.test about Tübingen");
        assert!(!tokens.iter().any(|t| t.contains("http") || t.contains('@')));
        assert!(tokens.iter().any(|t| t.starts_with("tubing") || t.contains("übing") || t == "tübingen"));
    }

    #[test]
    fn drops_stopwords_and_punctuation() {
        let tok = Tokenizer::new();
        let tokens = tok.tokenize("the quick, brown fox!");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(tokens.iter().all(|t| t.chars().all(|c| c.is_alphanumeric())));
    }

    #[test]
    fn is_deterministic() {
        let tok = Tokenizer::new();
        let a = tok.tokenize("coffee shops near the university");
        let b = tok.tokenize("coffee shops near the university");
        assert_eq!(a, b);
    }
}
