//! Core data models for remember.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// LINK DETAILS
// =============================================================================

/// Metadata scraped from a page. Every field is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub favicon: Option<String>,
}

impl ExtractedMetadata {
    /// True when extraction found nothing at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.image_url.is_none()
            && self.favicon.is_none()
    }
}

/// Persisted details record of a bookmarked link (one per bookmark).
///
/// Each crawl replaces all four fields; a field the latest crawl could not
/// determine is stored as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDetails {
    pub link_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub favicon: Option<String>,
}

impl LinkDetails {
    /// Build the record that a crawl of `link_id` writes.
    pub fn from_metadata(link_id: impl Into<String>, metadata: ExtractedMetadata) -> Self {
        Self {
            link_id: link_id.into(),
            title: metadata.title,
            description: metadata.description,
            image_url: metadata.image_url,
            favicon: metadata.favicon,
        }
    }
}

// =============================================================================
// JOBS
// =============================================================================

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("unknown job status: {other}"))),
        }
    }
}

/// Type of job to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Scrape title, description, image and favicon for a bookmarked link
    LinkCrawling,
}

impl JobType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LinkCrawling => "link_crawling",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "link_crawling" => Ok(Self::LinkCrawling),
            other => Err(Error::InvalidInput(format!("unknown job type: {other}"))),
        }
    }
}

/// A queued background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub progress_percent: i32,
    pub progress_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_round_trips_through_str() {
        assert_eq!(JobType::LinkCrawling.as_str(), "link_crawling");
        assert_eq!(
            "link_crawling".parse::<JobType>().unwrap(),
            JobType::LinkCrawling
        );
        assert!("embedding".parse::<JobType>().is_err());
    }

    #[test]
    fn test_job_type_serde_matches_db_name() {
        let json = serde_json::to_string(&JobType::LinkCrawling).unwrap();
        assert_eq!(json, "\"link_crawling\"");
    }

    #[test]
    fn test_job_status_parse() {
        assert_eq!("running".parse::<JobStatus>().unwrap(), JobStatus::Running);
        assert_eq!(JobStatus::Failed.to_string(), "failed");
        match "cancelled".parse::<JobStatus>() {
            Err(Error::InvalidInput(msg)) => assert!(msg.contains("cancelled")),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_link_details_from_metadata_copies_every_field() {
        let metadata = ExtractedMetadata {
            title: Some("Example".into()),
            description: None,
            image_url: Some("https://example.com/og.png".into()),
            favicon: None,
        };
        let details = LinkDetails::from_metadata("bm_1", metadata);
        assert_eq!(details.link_id, "bm_1");
        assert_eq!(details.title.as_deref(), Some("Example"));
        assert!(details.description.is_none());
        assert_eq!(
            details.image_url.as_deref(),
            Some("https://example.com/og.png")
        );
        assert!(details.favicon.is_none());
    }

    #[test]
    fn test_extracted_metadata_is_empty() {
        assert!(ExtractedMetadata::default().is_empty());
        let metadata = ExtractedMetadata {
            favicon: Some("https://example.com/favicon.ico".into()),
            ..Default::default()
        };
        assert!(!metadata.is_empty());
    }
}
