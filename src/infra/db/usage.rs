use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, UsageRepo},
    domain::entities::UsageEvent,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UsageRow {
    source: String,
    keyword: String,
    created_at: OffsetDateTime,
}

impl From<UsageRow> for UsageEvent {
    fn from(row: UsageRow) -> Self {
        Self {
            source: row.source,
            keyword: row.keyword,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl UsageRepo for PostgresRepositories {
    async fn append_usage_event(
        &self,
        source: &str,
        keyword: &str,
    ) -> Result<UsageEvent, RepoError> {
        let row = sqlx::query_as::<_, UsageRow>(
            r#"
            INSERT INTO usage_events (source, keyword)
            VALUES ($1, $2)
            RETURNING source, keyword, created_at
            "#,
        )
        .bind(source)
        .bind(keyword)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn delete_usage_by_keyword(
        &self,
        source: &str,
        keyword: &str,
    ) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM usage_events WHERE source = $1 AND keyword = $2")
            .bind(source)
            .bind(keyword)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_usage_by_source(&self, source: &str) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM usage_events WHERE source = $1")
            .bind(source)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn list_usage_since(
        &self,
        source: &str,
        since: OffsetDateTime,
    ) -> Result<Vec<UsageEvent>, RepoError> {
        let rows = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT source, keyword, created_at
            FROM usage_events
            WHERE source = $1 AND created_at >= $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(source)
        .bind(since)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(UsageEvent::from).collect())
    }
}
