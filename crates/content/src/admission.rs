use url::Url;
use whatlang::{detect, Lang};

use tuer_core::{CrawlError, ParsedDocument};

/// Ordered admission tests a discovered URL must pass before its content is
/// indexed. Tests that only need the URL itself run before the fetch; tests
/// that need the parsed body run after.
pub struct AdmissionFilter {
    pub domain_blocklist: Vec<String>,
    pub allowed_languages: Vec<String>,
    pub required_keywords: Vec<String>,
}

impl AdmissionFilter {
    pub fn new(
        domain_blocklist: Vec<String>,
        allowed_languages: Vec<String>,
        required_keywords: Vec<String>,
    ) -> Self {
        Self {
            domain_blocklist: domain_blocklist.iter().map(|s| s.to_lowercase()).collect(),
            allowed_languages: allowed_languages.iter().map(|s| s.to_lowercase()).collect(),
            required_keywords: required_keywords.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// Tests 1 and 2: scheme and domain blocklist. Substring match on the
    /// full URL, not a host comparison — `foogithub.com` is blocked by a
    /// `github.com` entry. This preserves the source crawler's behavior.
    pub fn pre_fetch_check(&self, url: &Url) -> Result<(), CrawlError> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CrawlError::Admission(format!("scheme {} not allowed", url.scheme())));
        }
        let full = url.as_str().to_lowercase();
        if self.domain_blocklist.iter().any(|d| full.contains(d)) {
            return Err(CrawlError::Admission("domain blocklisted".to_string()));
        }
        Ok(())
    }

    /// Tests 6 and 7: language gate, then keyword gate.
    pub fn post_fetch_check(&self, url: &Url, parsed: &ParsedDocument) -> Result<(), CrawlError> {
        if !self.language_allowed(url, parsed) {
            return Err(CrawlError::Admission("language not supported".to_string()));
        }

        let haystack = format!(
            "{} {} {}",
            parsed.title.as_deref().unwrap_or(""),
            parsed.description.as_deref().unwrap_or(""),
            parsed.main_text
        )
        .to_lowercase();
        if !self
            .required_keywords
            .iter()
            .any(|kw| haystack.contains(kw))
        {
            return Err(CrawlError::Admission("no required keyword present".to_string()));
        }
        Ok(())
    }

    fn language_allowed(&self, url: &Url, parsed: &ParsedDocument) -> bool {
        if let Some(lang) = &parsed.html_lang {
            if self.allowed_languages.contains(&lang.to_lowercase()) {
                return true;
            }
        }
        if let Some(lang) = &parsed.xml_lang {
            if self.allowed_languages.contains(&lang.to_lowercase()) {
                return true;
            }
        }
        let path_lower = url.path().to_lowercase();
        if self
            .allowed_languages
            .iter()
            .any(|code| path_lower.split('/').any(|seg| seg == code))
        {
            return true;
        }
        if let Some(code) = detect(&parsed.main_text).map(|info| iso_639_1(info.lang())) {
            if self.allowed_languages.iter().any(|allowed| allowed.starts_with(&code)) {
                return true;
            }
        }
        false
    }
}

/// Map whatlang's ISO 639-3 language enum down to the ISO 639-1 codes the
/// allowed-language configuration is written in.
fn iso_639_1(lang: Lang) -> String {
    match lang {
        Lang::Eng => "en",
        Lang::Deu => "de",
        Lang::Fra => "fr",
        Lang::Spa => "es",
        Lang::Ita => "it",
        Lang::Por => "pt",
        Lang::Cmn => "zh",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Rus => "ru",
        other => return format!("{other:?}").to_lowercase(),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuer_core::ParsedDocument;

    fn doc(html_lang: Option<&str>, main_text: &str) -> ParsedDocument {
        ParsedDocument {
            html_lang: html_lang.map(String::from),
            main_text: main_text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn blocklist_is_substring_match() {
        let filter = AdmissionFilter::new(vec!["github.com".into()], vec!["en".into()], vec!["a".into()]);
        assert!(filter
            .pre_fetch_check(&Url::parse("http://foogithub.com/x").unwrap())
            .is_err());
        assert!(filter
            .pre_fetch_check(&Url::parse("http://example.test/x").unwrap())
            .is_ok());
    }

    #[test]
    fn html_lang_attribute_admits() {
        let filter = AdmissionFilter::new(vec![], vec!["en".into()], vec!["tubingen".into()]);
        let d = doc(Some("en"), "welcome to tubingen");
        assert!(filter
            .post_fetch_check(&Url::parse("http://ex.test/").unwrap(), &d)
            .is_ok());
    }

    #[test]
    fn missing_keyword_is_rejected() {
        let filter = AdmissionFilter::new(vec![], vec!["en".into()], vec!["tubingen".into()]);
        let d = doc(Some("en"), "nothing relevant here");
        assert!(filter
            .post_fetch_check(&Url::parse("http://ex.test/").unwrap(), &d)
            .is_err());
    }
}
