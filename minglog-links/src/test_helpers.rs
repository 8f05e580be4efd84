//! Test helpers for link graph databases.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::cache::AdjacencyCache;
use crate::errors::LinkResult;
use crate::events::EventBus;
use crate::oracle::SqliteContentOracle;
use crate::registry::ModuleRegistry;
use crate::storage::LinkDatabase;
use crate::store::LinkStore;

/// Create an in-memory link database for testing
pub async fn create_test_database() -> LinkResult<LinkDatabase> {
    LinkDatabase::in_memory().await
}

/// Build a store over `db` with the default registry.
pub fn test_store(db: &LinkDatabase, bidirectional: bool) -> LinkStore {
    let oracle = Arc::new(SqliteContentOracle::new(
        db.pool().clone(),
        ModuleRegistry::default(),
    ));
    LinkStore::new(
        db.pool().clone(),
        oracle,
        AdjacencyCache::new(64),
        EventBus::default(),
        bidirectional,
    )
}

/// Insert a content row for `module` using the registry's table layout.
pub async fn insert_item(pool: &SqlitePool, module: &str, id: &str, title: &str) {
    let registry = ModuleRegistry::default();
    let descriptor = registry.get(module).expect("known module");
    let now = Utc::now().timestamp();
    let sql = if descriptor.table == "blocks" {
        format!(
            "INSERT INTO blocks (id, page_id, {}, created_at, updated_at) VALUES (?, '', ?, ?, ?)",
            descriptor.title_column
        )
    } else {
        format!(
            "INSERT INTO {} (id, {}, created_at, updated_at) VALUES (?, ?, ?, ?)",
            descriptor.table, descriptor.title_column
        )
    };
    sqlx::query(&sql)
        .bind(id)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .expect("insert content item");
}

/// Delete a content row without touching its edges.
pub async fn remove_item(pool: &SqlitePool, module: &str, id: &str) {
    let registry = ModuleRegistry::default();
    let descriptor = registry.get(module).expect("known module");
    let sql = format!("DELETE FROM {} WHERE id = ?", descriptor.table);
    sqlx::query(&sql)
        .bind(id)
        .execute(pool)
        .await
        .expect("delete content item");
}
