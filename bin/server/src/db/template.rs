//! Postgres-backed template source.

use async_trait::async_trait;
use loomwork_core::TemplateId;
use loomwork_workflow::{StoreError, TemplateSource};
use sqlx::PgPool;

/// Reads definitions from the `workflow_template` table.
#[derive(Debug, Clone)]
pub struct PgTemplateSource {
    pool: PgPool,
}

impl PgTemplateSource {
    /// Creates a new template source.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateSource for PgTemplateSource {
    async fn get_definition(&self, template_id: TemplateId) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar("SELECT definition FROM workflow_template WHERE id = $1")
            .bind(template_id.as_raw())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database {
                details: e.to_string(),
            })
    }
}
