//! Link details repository implementation.

use async_trait::async_trait;
use sqlx::{FromRow, Pool, Postgres};
use tracing::debug;

use remember_core::{Error, LinkDetails, LinkDetailsRepository, Result};

#[derive(FromRow)]
struct LinkDetailsRow {
    link_id: String,
    title: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    favicon: Option<String>,
}

impl From<LinkDetailsRow> for LinkDetails {
    fn from(row: LinkDetailsRow) -> Self {
        Self {
            link_id: row.link_id,
            title: row.title,
            description: row.description,
            image_url: row.image_url,
            favicon: row.favicon,
        }
    }
}

/// PostgreSQL implementation of LinkDetailsRepository.
#[derive(Clone)]
pub struct PgLinkDetailsRepository {
    pool: Pool<Postgres>,
}

impl PgLinkDetailsRepository {
    /// Create a new PgLinkDetailsRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkDetailsRepository for PgLinkDetailsRepository {
    async fn upsert_details(&self, details: &LinkDetails) -> Result<LinkDetails> {
        // Selecting from bookmarked_links makes the insert a no-op for unknown
        // ids, so a missing bookmark yields no row instead of an orphan.
        let row: Option<LinkDetailsRow> = sqlx::query_as(
            "INSERT INTO link_details (link_id, title, description, image_url, favicon)
             SELECT b.id, $2, $3, $4, $5 FROM bookmarked_links b WHERE b.id = $1
             ON CONFLICT (link_id) DO UPDATE
               SET title       = EXCLUDED.title,
                   description = EXCLUDED.description,
                   image_url   = EXCLUDED.image_url,
                   favicon     = EXCLUDED.favicon,
                   updated_at  = now()
             RETURNING link_id, title, description, image_url, favicon",
        )
        .bind(&details.link_id)
        .bind(&details.title)
        .bind(&details.description)
        .bind(&details.image_url)
        .bind(&details.favicon)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => {
                debug!(
                    subsystem = "db",
                    component = "link_details",
                    op = "upsert",
                    link_id = %details.link_id,
                    "Link details stored"
                );
                Ok(row.into())
            }
            None => Err(Error::LinkNotFound(details.link_id.clone())),
        }
    }

    async fn get_details(&self, link_id: &str) -> Result<Option<LinkDetails>> {
        let row: Option<LinkDetailsRow> = sqlx::query_as(
            "SELECT link_id, title, description, image_url, favicon
             FROM link_details WHERE link_id = $1",
        )
        .bind(link_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Into::into))
    }
}
