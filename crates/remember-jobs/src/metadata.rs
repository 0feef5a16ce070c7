//! HTML metadata extraction.
//!
//! Extraction is best-effort: missing or malformed tags produce absent fields,
//! never errors. Candidate sources are tried in order and the first non-empty
//! value wins.

use std::cmp::Reverse;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

use remember_core::ExtractedMetadata;

/// Errors from the extraction step.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extractor panicked or its task was cancelled.
    #[error("metadata extractor crashed: {0}")]
    Crashed(String),
}

/// Produces a metadata record from a page URL and its raw HTML.
///
/// Implementations are synchronous and CPU-bound; the pipeline runs them on
/// the blocking thread pool.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, page_url: &Url, html: &str) -> Result<ExtractedMetadata, ExtractionError>;
}

const TITLE_META: &[&str] = &["og:title", "twitter:title"];
const TITLE_JSON_LD: &[&str] = &["headline"];
const TITLE_ITEMPROP: &[&str] = &["headline", "name"];

const DESCRIPTION_META: &[&str] = &["og:description", "twitter:description", "description"];
const DESCRIPTION_JSON_LD: &[&str] = &["description"];
const DESCRIPTION_ITEMPROP: &[&str] = &["description"];

const IMAGE_META: &[&str] = &[
    "og:image",
    "og:image:url",
    "og:image:secure_url",
    "twitter:image",
    "twitter:image:src",
];
const IMAGE_JSON_LD: &[&str] = &["image", "thumbnailUrl"];
const IMAGE_ITEMPROP: &[&str] = &["image", "thumbnailUrl"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e:?}"))
}

static META: Lazy<Selector> = Lazy::new(|| selector("meta[content]"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static BASE: Lazy<Selector> = Lazy::new(|| selector("base[href]"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("link[rel][href]"));
static JSON_LD: Lazy<Selector> =
    Lazy::new(|| selector(r#"script[type="application/ld+json"]"#));

/// Default extractor: Open Graph, Twitter card, JSON-LD, microdata and plain
/// HTML fallbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlMetadataExtractor;

impl HtmlMetadataExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataExtractor for HtmlMetadataExtractor {
    fn extract(&self, page_url: &Url, html: &str) -> Result<ExtractedMetadata, ExtractionError> {
        let document = Html::parse_document(html);
        let base = base_url(&document, page_url);
        let json_ld = json_ld_nodes(&document);

        let title = first_clean(meta_values(&document, TITLE_META))
            .or_else(|| first_clean(json_ld_values(&json_ld, TITLE_JSON_LD)))
            .or_else(|| first_clean(itemprop_values(&document, TITLE_ITEMPROP)))
            .or_else(|| first_text(&document, &TITLE))
            .or_else(|| first_text(&document, &H1));

        let description = first_clean(meta_values(&document, DESCRIPTION_META))
            .or_else(|| first_clean(json_ld_values(&json_ld, DESCRIPTION_JSON_LD)))
            .or_else(|| first_clean(itemprop_values(&document, DESCRIPTION_ITEMPROP)));

        let image_url = meta_values(&document, IMAGE_META)
            .chain(json_ld_values(&json_ld, IMAGE_JSON_LD))
            .chain(itemprop_values(&document, IMAGE_ITEMPROP))
            .chain(
                links(&document, |rel| rel == "image_src")
                    .filter_map(|el| el.value().attr("href")),
            )
            .find_map(|href| resolve(&base, href));

        let favicon = largest_icon(&document, &base, |rel| rel == "icon").or_else(|| {
            largest_icon(&document, &base, |rel| {
                rel == "apple-touch-icon" || rel == "apple-touch-icon-precomposed"
            })
        });

        Ok(ExtractedMetadata {
            title,
            description,
            image_url,
            favicon,
        })
    }
}

/// `<base href>` resolved against the page URL, or the page URL itself.
fn base_url(document: &Html, page_url: &Url) -> Url {
    document
        .select(&BASE)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

/// `content` of `<meta>` elements whose `property` or `name` matches a key,
/// grouped by key in the order given.
fn meta_values<'a>(
    document: &'a Html,
    keys: &'a [&'a str],
) -> impl Iterator<Item = &'a str> + 'a {
    meta_values_by(document, &["property", "name"], keys)
}

/// `content` of `<meta itemprop>` elements, grouped by key in the order given.
fn itemprop_values<'a>(
    document: &'a Html,
    keys: &'a [&'a str],
) -> impl Iterator<Item = &'a str> + 'a {
    meta_values_by(document, &["itemprop"], keys)
}

fn meta_values_by<'a>(
    document: &'a Html,
    attrs: &'static [&'static str],
    keys: &'a [&'a str],
) -> impl Iterator<Item = &'a str> + 'a {
    keys.iter().flat_map(move |key| {
        document
            .select(&META)
            .filter(move |el| {
                attrs
                    .iter()
                    .filter_map(|attr| el.value().attr(attr))
                    .any(|value| value.trim().eq_ignore_ascii_case(key))
            })
            .filter_map(|el| el.value().attr("content"))
    })
}

/// Parsed `application/ld+json` blocks, with arrays and `@graph` flattened.
/// Blocks that fail to parse are skipped.
fn json_ld_nodes(document: &Html) -> Vec<JsonValue> {
    let mut nodes = Vec::new();
    for script in document.select(&JSON_LD) {
        let text: String = script.text().collect();
        if let Ok(value) = serde_json::from_str::<JsonValue>(text.trim()) {
            flatten_json_ld(value, &mut nodes);
        }
    }
    nodes
}

fn flatten_json_ld(value: JsonValue, out: &mut Vec<JsonValue>) {
    match value {
        JsonValue::Array(items) => {
            for item in items {
                flatten_json_ld(item, out);
            }
        }
        JsonValue::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_json_ld(graph, out);
            }
            out.push(JsonValue::Object(map));
        }
        _ => {}
    }
}

fn json_ld_values<'a>(
    nodes: &'a [JsonValue],
    keys: &'a [&'a str],
) -> impl Iterator<Item = &'a str> + 'a {
    keys.iter().flat_map(move |key| {
        nodes
            .iter()
            .filter_map(move |node| node.get(*key))
            .filter_map(json_ld_string)
    })
}

/// A string property, the `url` of an object value (`ImageObject`), or the
/// first usable entry of an array.
fn json_ld_string(value: &JsonValue) -> Option<&str> {
    match value {
        JsonValue::String(s) => Some(s.as_str()),
        JsonValue::Object(_) => value.get("url").and_then(json_ld_string),
        JsonValue::Array(items) => items.iter().find_map(json_ld_string),
        _ => None,
    }
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| clean(&el.text().collect::<String>()))
}

/// `<link>` elements with a `rel` token accepted by `want`.
fn links<'a>(
    document: &'a Html,
    want: impl Fn(&str) -> bool + 'a,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    document.select(&LINK).filter(move |el| {
        el.value().attr("rel").is_some_and(|rel| {
            rel.split_ascii_whitespace()
                .any(|token| want(token.to_ascii_lowercase().as_str()))
        })
    })
}

/// Resolvable icon with the largest declared `sizes`. Document order breaks ties.
fn largest_icon<'a>(
    document: &'a Html,
    base: &Url,
    want: impl Fn(&str) -> bool + 'a,
) -> Option<String> {
    links(document, want)
        .filter_map(|el| {
            let href = resolve(base, el.value().attr("href")?)?;
            Some((icon_area(el.value().attr("sizes")), href))
        })
        .enumerate()
        .max_by_key(|(index, (area, _))| (*area, Reverse(*index)))
        .map(|(_, (_, href))| href)
}

/// Largest `WxH` area listed in a `sizes` attribute; `any` outranks fixed sizes.
fn icon_area(sizes: Option<&str>) -> u64 {
    sizes
        .into_iter()
        .flat_map(str::split_ascii_whitespace)
        .filter_map(|size| {
            if size.eq_ignore_ascii_case("any") {
                return Some(u64::MAX);
            }
            let (w, h) = size.split_once(|c: char| c == 'x' || c == 'X')?;
            Some(w.parse::<u64>().ok()?.saturating_mul(h.parse::<u64>().ok()?))
        })
        .max()
        .unwrap_or(0)
}

/// Resolve a raw URL value to an absolute http(s) URL. Only surrounding
/// whitespace is trimmed; the URL parser handles the rest.
fn resolve(base: &Url, raw: &str) -> Option<String> {
    let reference = raw.trim();
    if reference.is_empty() {
        return None;
    }
    let url = base.join(reference).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn first_clean<'a>(mut values: impl Iterator<Item = &'a str>) -> Option<String> {
    values.find_map(clean)
}

/// Collapse runs of whitespace; empty results are absent.
fn clean(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}
