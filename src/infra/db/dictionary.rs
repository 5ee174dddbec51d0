use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CreateEntryParams, DictionaryRepo, RepoError},
    domain::entities::KeywordEntry,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct EntryRow {
    source: String,
    keyword: String,
    description: String,
    creator: String,
    created_at: OffsetDateTime,
}

impl From<EntryRow> for KeywordEntry {
    fn from(row: EntryRow) -> Self {
        Self {
            source: row.source,
            keyword: row.keyword,
            description: row.description,
            creator: row.creator,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl DictionaryRepo for PostgresRepositories {
    async fn create_entry(&self, params: CreateEntryParams) -> Result<KeywordEntry, RepoError> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            INSERT INTO dictionaries (source, keyword, description, creator)
            VALUES ($1, $2, $3, $4)
            RETURNING source, keyword, description, creator, created_at
            "#,
        )
        .bind(&params.source)
        .bind(&params.keyword)
        .bind(&params.description)
        .bind(&params.creator)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn remove_entry(&self, source: &str, keyword: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM dictionaries WHERE source = $1 AND keyword = $2")
            .bind(source)
            .bind(keyword)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn get_entry_by_keyword(
        &self,
        source: &str,
        keyword: &str,
    ) -> Result<Option<KeywordEntry>, RepoError> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT source, keyword, description, creator, created_at
            FROM dictionaries
            WHERE source = $1 AND keyword = $2
            "#,
        )
        .bind(source)
        .bind(keyword)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(KeywordEntry::from))
    }

    async fn list_entries(&self, source: &str) -> Result<Vec<KeywordEntry>, RepoError> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT source, keyword, description, creator, created_at
            FROM dictionaries
            WHERE source = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(source)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(KeywordEntry::from).collect())
    }

    async fn delete_entries_by_source(&self, source: &str) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM dictionaries WHERE source = $1")
            .bind(source)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
