#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use minglog_links::{
    EventBus, LinkDatabase, LinkGraphSettings, LinkStore, ModuleRegistry, SqliteContentOracle,
};

/// File-backed database in a temp dir, plus a store over it.
pub struct Fixture {
    pub temp: TempDir,
    pub db: LinkDatabase,
    pub store: LinkStore,
}

impl Fixture {
    pub fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_test_writer()
        .try_init();
}

pub async fn fixture(bidirectional: bool) -> Fixture {
    init_tracing();
    let temp = TempDir::new().expect("tempdir");
    let db = LinkDatabase::open(&temp.path().join("minglog.sqlite3"))
        .await
        .expect("open link database");
    let store = store_for(&db, bidirectional);
    Fixture { temp, db, store }
}

pub fn store_for(db: &LinkDatabase, bidirectional: bool) -> LinkStore {
    let oracle = Arc::new(SqliteContentOracle::new(
        db.pool().clone(),
        ModuleRegistry::default(),
    ));
    let settings = LinkGraphSettings {
        bidirectional,
        ..LinkGraphSettings::default()
    };
    LinkStore::from_settings(db.pool().clone(), oracle, EventBus::default(), &settings)
}

async fn insert_row(pool: &SqlitePool, table: &str, title_column: &str, id: &str, title: &str) {
    let now = Utc::now().timestamp();
    let sql = format!(
        "INSERT INTO {table} (id, {title_column}, created_at, updated_at) VALUES (?, ?, ?, ?)"
    );
    sqlx::query(&sql)
        .bind(id)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .expect("insert row");
}

pub async fn insert_page(pool: &SqlitePool, id: &str, title: &str) {
    insert_row(pool, "pages", "title", id, title).await;
}

pub async fn insert_task(pool: &SqlitePool, id: &str, title: &str) {
    insert_row(pool, "tasks", "title", id, title).await;
}

pub async fn insert_file(pool: &SqlitePool, id: &str, name: &str) {
    insert_row(pool, "files", "name", id, name).await;
}

pub async fn delete_page(pool: &SqlitePool, id: &str) {
    sqlx::query("DELETE FROM pages WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .expect("delete page");
}
