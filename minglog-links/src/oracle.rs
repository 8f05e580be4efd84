//! Content Existence Oracle: the only view the link graph has of module content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::errors::LinkResult;
use crate::registry::ModuleRegistry;

/// Basic read view of a module item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub module: String,
    pub id: String,
    pub title: String,
    pub updated_at: i64,
}

#[async_trait]
pub trait ContentOracle: Send + Sync {
    async fn exists(&self, module: &str, id: &str) -> LinkResult<bool>;

    async fn get(&self, module: &str, id: &str) -> LinkResult<Option<ContentItem>>;

    /// Items whose title equals `title`, ignoring case.
    async fn find_by_title(&self, module: &str, title: &str) -> LinkResult<Vec<ContentItem>>;

    async fn list_items(&self, module: &str) -> LinkResult<Vec<ContentItem>>;
}

/// Oracle reading the module tables of a shared SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteContentOracle {
    pool: SqlitePool,
    registry: ModuleRegistry,
}

impl SqliteContentOracle {
    pub fn new(pool: SqlitePool, registry: ModuleRegistry) -> Self {
        Self { pool, registry }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: String,
    title: String,
    updated_at: i64,
}

impl ItemRow {
    fn into_item(self, module: &str) -> ContentItem {
        ContentItem {
            module: module.to_string(),
            id: self.id,
            title: self.title,
            updated_at: self.updated_at,
        }
    }
}

#[async_trait]
impl ContentOracle for SqliteContentOracle {
    async fn exists(&self, module: &str, id: &str) -> LinkResult<bool> {
        let descriptor = self.registry.get(module)?;
        let sql = format!("SELECT 1 FROM {} WHERE id = ? LIMIT 1", descriptor.table);
        let row: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn get(&self, module: &str, id: &str) -> LinkResult<Option<ContentItem>> {
        let descriptor = self.registry.get(module)?;
        let sql = format!(
            "SELECT id, {} AS title, updated_at FROM {} WHERE id = ?",
            descriptor.title_column, descriptor.table
        );
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.into_item(module)))
    }

    async fn find_by_title(&self, module: &str, title: &str) -> LinkResult<Vec<ContentItem>> {
        let descriptor = self.registry.get(module)?;
        let sql = format!(
            "SELECT id, {title} AS title, updated_at FROM {table}
             WHERE {title} = ? COLLATE NOCASE
             ORDER BY id",
            title = descriptor.title_column,
            table = descriptor.table
        );
        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(title.trim())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.into_item(module)).collect())
    }

    async fn list_items(&self, module: &str) -> LinkResult<Vec<ContentItem>> {
        let descriptor = self.registry.get(module)?;
        let sql = format!(
            "SELECT id, {} AS title, updated_at FROM {} ORDER BY id",
            descriptor.title_column, descriptor.table
        );
        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.into_item(module)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LinkError;
    use crate::test_helpers::{create_test_database, insert_item};

    #[tokio::test]
    async fn test_exists_and_get() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "tasks", "t1", "Write report").await;
        let oracle = SqliteContentOracle::new(db.pool().clone(), ModuleRegistry::default());

        assert!(oracle.exists("tasks", "t1").await.unwrap());
        assert!(!oracle.exists("tasks", "t2").await.unwrap());

        let item = oracle.get("tasks", "t1").await.unwrap().unwrap();
        assert_eq!(item.title, "Write report");
        assert_eq!(item.module, "tasks");
    }

    #[tokio::test]
    async fn test_find_by_title_ignores_case() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "notes", "p1", "Intro").await;
        insert_item(db.pool(), "notes", "p2", "Other").await;
        let oracle = SqliteContentOracle::new(db.pool().clone(), ModuleRegistry::default());

        let found = oracle.find_by_title("notes", "intro").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "p1");
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let db = create_test_database().await.unwrap();
        let oracle = SqliteContentOracle::new(db.pool().clone(), ModuleRegistry::default());

        let result = oracle.exists("calendar", "x").await;
        assert!(matches!(result, Err(LinkError::UnknownModule(_))));
    }
}
