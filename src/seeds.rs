//! Built-in fallback seed list, used only when neither the config file nor
//! the CLI supplies any seeds and no frontier snapshot exists to resume
//! from. The curated topic here is Tübingen (city, university, and student
//! life) — a small enough vertical to admit in full within a modest crawl
//! budget and the keyword used throughout the spec's worked examples.
pub const DEFAULT_SEEDS: &[&str] = &[
    "https://www.tuebingen.de/en/",
    "https://uni-tuebingen.de/en/",
    "https://www.germany.travel/en/cities-culture/tuebingen.html",
    "https://en.wikipedia.org/wiki/T%C3%BCbingen",
];
