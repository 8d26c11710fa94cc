use scraper::{Html, Selector};
use url::Url;

use tuer_core::{ExtractedLink, ParsedDocument};

/// Binary-media extensions discovered links must not point at, used when the
/// caller has no configured blocklist of its own (e.g. in tests).
pub const DEFAULT_EXTENSION_BLOCKLIST: &[&str] = &[
    "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "csv", "zip", "tar", "gz", "rar", "7z",
    "mp3", "wav", "mp4", "avi", "mkv", "mov", "jpg", "jpeg", "png", "gif", "svg", "webp", "bmp",
    "ico",
];

/// Parse an HTML document into the narrow view the rest of the pipeline
/// works with. Returns `None` if the body has no `<html>` element at all —
/// the closest a lenient parser gets to "not HTML". `extension_blocklist`
/// entries are matched case-insensitively against a discovered link's path
/// suffix.
pub fn parse_html(
    html_str: &str,
    base_url: &Url,
    extension_blocklist: &[String],
) -> Option<ParsedDocument> {
    let document = Html::parse_document(html_str);

    if selector("html")
        .and_then(|s| document.select(&s).next())
        .is_none()
    {
        return None;
    }

    let title = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string());

    let description = extract_meta_content(&document, "description");

    let html_lang = selector("html")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("lang").map(|s| s.to_string()));
    let xml_lang = selector("html")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("xml:lang").map(|s| s.to_string()));

    let main_text = extract_main_text(&document);
    let alt_texts = extract_alt_texts(&document);
    let outbound_links = extract_links(&document, base_url, extension_blocklist);

    Some(ParsedDocument {
        title,
        description,
        html_lang,
        xml_lang,
        main_text,
        alt_texts,
        outbound_links,
    })
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn element_text(document: &Html, sel: &str) -> Option<String> {
    selector(sel).and_then(|s| document.select(&s).next()).map(|el| {
        el.text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    })
}

/// Prefer `<main>`, then `<article>`, then `<section>`, then `<body>`, then
/// the whole document, matching the content preference order used by the
/// tokenizer's source text assembly.
fn extract_main_text(document: &Html) -> String {
    for sel in ["main", "article", "section", "body"] {
        if let Some(text) = element_text(document, sel) {
            if !text.is_empty() {
                return text;
            }
        }
    }
    document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_alt_texts(document: &Html) -> Vec<String> {
    selector("img[alt]")
        .map(|s| {
            document
                .select(&s)
                .filter_map(|el| el.value().attr("alt"))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn extract_meta_content(document: &Html, name: &str) -> Option<String> {
    let sel_str = format!("meta[name='{name}'], meta[name='{}']", name.to_uppercase());
    selector(&sel_str)
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("content").map(|s| s.to_string()))
}

fn extract_links(
    document: &Html,
    base_url: &Url,
    extension_blocklist: &[String],
) -> Vec<ExtractedLink> {
    let Some(sel) = selector("a[href]") else {
        return vec![];
    };

    document
        .select(&sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if href.starts_with('#')
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
                || href.starts_with("javascript:")
                || href.starts_with("data:")
            {
                return None;
            }

            let mut resolved = base_url.join(href).ok()?;
            resolved.set_fragment(None);

            if resolved.scheme() != "http" && resolved.scheme() != "https" {
                return None;
            }

            let path_lower = resolved.path().to_lowercase();
            if let Some(ext) = path_lower.rsplit('.').next() {
                if extension_blocklist.iter().any(|b| b.to_lowercase() == ext) {
                    return None;
                }
            }

            let anchor_text = {
                let t = el.text().collect::<String>().trim().to_string();
                if t.is_empty() {
                    None
                } else {
                    Some(t)
                }
            };

            Some(ExtractedLink {
                url: resolved.to_string(),
                anchor_text,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_blocklist() -> Vec<String> {
        DEFAULT_EXTENSION_BLOCKLIST.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn skips_fragment_and_media_links() {
        let html = r#"<html lang="en"><body>
            <a href="#top">top</a>
            <a href="/guide.pdf">guide</a>
            <a href="/page">page</a>
        </body></html>"#;
        let base = Url::parse("http://ex.test/").unwrap();
        let doc = parse_html(html, &base, &default_blocklist()).unwrap();
        assert_eq!(doc.outbound_links.len(), 1);
        assert_eq!(doc.outbound_links[0].url, "http://ex.test/page");
    }

    #[test]
    fn no_html_element_returns_none() {
        assert!(parse_html(
            "not html at all",
            &Url::parse("http://ex.test/").unwrap(),
            &default_blocklist(),
        )
        .is_none());
    }

    #[test]
    fn prefers_main_over_body() {
        let html = r#"<html><body><p>body text</p><main><p>main text</p></main></body></html>"#;
        let doc = parse_html(html, &Url::parse("http://ex.test/").unwrap(), &default_blocklist()).unwrap();
        assert_eq!(doc.main_text, "main text");
    }
}
