//! Crawl request decoding.
//!
//! Job payloads arrive as untyped JSON. [`validate`] is the only way to obtain
//! a [`CrawlLinkRequest`], so every request the pipeline sees is well-formed.

use std::fmt;

use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

/// Payload key holding the page URL.
pub const URL_FIELD: &str = "url";

/// Payload key holding the bookmark id.
pub const LINK_ID_FIELD: &str = "linkId";

/// A validated request to crawl one bookmark's URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlLinkRequest {
    url: Url,
    link_id: String,
}

impl CrawlLinkRequest {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn link_id(&self) -> &str {
        &self.link_id
    }
}

/// One rejected payload field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Payload key, or `"(root)"` when the payload itself is unusable.
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Payload did not decode to a crawl request. Lists every failing field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed crawl request: {}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// True if `field` is among the rejected fields.
    pub fn has_issue(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Decode a raw job payload into a [`CrawlLinkRequest`].
///
/// Requires an object with a string `url` that parses as an absolute URL and a
/// non-blank string `linkId`. Other keys are ignored.
pub fn validate(raw: &JsonValue) -> Result<CrawlLinkRequest, ValidationError> {
    let Some(object) = raw.as_object() else {
        return Err(ValidationError {
            issues: vec![FieldIssue {
                field: "(root)",
                reason: format!("expected object, got {}", json_kind(raw)),
            }],
        });
    };

    let mut issues = Vec::new();

    let url = match object.get(URL_FIELD) {
        None | Some(JsonValue::Null) => {
            issues.push(missing(URL_FIELD));
            None
        }
        Some(JsonValue::String(s)) => match Url::parse(s.trim()) {
            Ok(url) => Some(url),
            Err(e) => {
                issues.push(FieldIssue {
                    field: URL_FIELD,
                    reason: format!("invalid url: {e}"),
                });
                None
            }
        },
        Some(other) => {
            issues.push(not_a_string(URL_FIELD, other));
            None
        }
    };

    let link_id = match object.get(LINK_ID_FIELD) {
        None | Some(JsonValue::Null) => {
            issues.push(missing(LINK_ID_FIELD));
            None
        }
        Some(JsonValue::String(s)) if s.trim().is_empty() => {
            issues.push(FieldIssue {
                field: LINK_ID_FIELD,
                reason: "must not be empty".to_string(),
            });
            None
        }
        Some(JsonValue::String(s)) => Some(s.clone()),
        Some(other) => {
            issues.push(not_a_string(LINK_ID_FIELD, other));
            None
        }
    };

    match (url, link_id) {
        (Some(url), Some(link_id)) => Ok(CrawlLinkRequest { url, link_id }),
        _ => Err(ValidationError { issues }),
    }
}

fn missing(field: &'static str) -> FieldIssue {
    FieldIssue {
        field,
        reason: "missing".to_string(),
    }
}

fn not_a_string(field: &'static str, value: &JsonValue) -> FieldIssue {
    FieldIssue {
        field,
        reason: format!("expected string, got {}", json_kind(value)),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
