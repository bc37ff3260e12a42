//! SQLite-backed pattern store
//!
//! One table per [`PatternKind`]. Categorical attributes live in a JSON
//! column and are filtered uniformly through `json_extract`, so every kind
//! is queried by the same code path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ForgeError, Result};
use crate::types::PatternKind;

/// Success rate assigned to a freshly written pattern
pub const INITIAL_SUCCESS_RATE: u8 = 100;

/// Patterns used at least this often with at least this rate count as reliable
const RELIABLE_MIN_USES: u32 = 3;
const RELIABLE_MIN_RATE: u8 = 80;

/// A recorded input -> output example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecord {
    pub id: String,
    pub kind: PatternKind,
    /// Exact-match categorical attributes (language, style, complexity, ...)
    pub attributes: BTreeMap<String, String>,
    pub input: Value,
    pub output: Value,
    pub use_count: u32,
    /// Percentage in 0..=100
    pub success_rate: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatternRecord {
    /// New pattern with a fresh id, zero uses and a full success rate
    pub fn new(kind: PatternKind, attributes: BTreeMap<String, String>, input: Value, output: Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            attributes,
            input,
            output,
            use_count: 0,
            success_rate: INITIAL_SUCCESS_RATE,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.use_count >= RELIABLE_MIN_USES && self.success_rate >= RELIABLE_MIN_RATE
    }
}

/// Comparison applied by a [`Filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
}

/// One `(field, operator, value)` triple over the categorical attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self { field: field.into(), op: FilterOp::Eq, value: value.into() }
    }
}

/// Secondary ordering of candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKey {
    UseCountDesc,
    SuccessRateDesc,
    UpdatedDesc,
}

impl OrderKey {
    fn sql(&self) -> &'static str {
        match self {
            OrderKey::UseCountDesc => "use_count DESC, success_rate DESC, rowid ASC",
            OrderKey::SuccessRateDesc => "success_rate DESC, use_count DESC, rowid ASC",
            OrderKey::UpdatedDesc => "updated_at DESC, rowid ASC",
        }
    }
}

/// Per-kind counts for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindSummary {
    pub kind: PatternKind,
    pub total_patterns: u64,
    pub reliable_patterns: u64,
    pub total_uses: u64,
    pub mean_success_rate: f64,
}

/// Durable, keyed collection of pattern records
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Insert a record; returns its id
    async fn insert(&self, record: &PatternRecord) -> Result<String>;

    /// Records of `kind` matching every filter, ordered and limited
    async fn query_candidates(
        &self,
        kind: PatternKind,
        filters: &[Filter],
        order: OrderKey,
        limit: usize,
    ) -> Result<Vec<PatternRecord>>;

    async fn get(&self, kind: PatternKind, id: &str) -> Result<Option<PatternRecord>>;

    /// Overwrite the mutable statistics of a record. `NotFound` if absent.
    async fn update_stats(
        &self,
        kind: PatternKind,
        id: &str,
        use_count: u32,
        success_rate: u8,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Number of records of `kind`
    async fn count(&self, kind: PatternKind) -> Result<u64>;

    async fn summary(&self) -> Result<Vec<KindSummary>>;
}

/// SQLite implementation of [`PatternStore`]
pub struct SqlitePatternStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePatternStore {
    /// Open (or create) the store at the given path
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ForgeError::Persistence(format!("create {}: {}", parent.display(), e)))?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;

        debug!("Opened pattern store at {}", path.display());
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Non-durable store, for tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        for kind in PatternKind::ALL {
            let table = kind.table();
            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    attributes TEXT NOT NULL DEFAULT '{{}}',
                    input TEXT NOT NULL,
                    output TEXT NOT NULL,
                    use_count INTEGER NOT NULL DEFAULT 0,
                    success_rate INTEGER NOT NULL DEFAULT 100,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_use_count ON {table}(use_count DESC);
                CREATE INDEX IF NOT EXISTS idx_{table}_success_rate ON {table}(success_rate DESC);
                "#
            ))?;
        }
        Ok(())
    }

    /// Damaged JSON or timestamp columns fail the row instead of being replaced
    fn row_to_record(kind: PatternKind, row: &rusqlite::Row<'_>) -> rusqlite::Result<PatternRecord> {
        let use_count: i64 = row.get(4)?;
        let success_rate: i64 = row.get(5)?;

        Ok(PatternRecord {
            id: row.get(0)?,
            kind,
            attributes: json_column(row, 1)?,
            input: json_column(row, 2)?,
            output: json_column(row, 3)?,
            use_count: use_count.max(0) as u32,
            success_rate: success_rate.clamp(0, 100) as u8,
            created_at: timestamp_column(row, 6)?,
            updated_at: timestamp_column(row, 7)?,
        })
    }
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Attribute names end up inside a JSON path
fn validate_field(field: &str) -> Result<()> {
    if !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ForgeError::InvalidInput(format!("invalid filter field '{}'", field)))
    }
}

#[async_trait]
impl PatternStore for SqlitePatternStore {
    async fn insert(&self, record: &PatternRecord) -> Result<String> {
        let conn = self.conn.lock().await;

        conn.execute(
            &format!(
                "INSERT INTO {} (id, attributes, input, output, use_count, success_rate, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                record.kind.table()
            ),
            params![
                record.id,
                serde_json::to_string(&record.attributes)?,
                serde_json::to_string(&record.input)?,
                serde_json::to_string(&record.output)?,
                record.use_count,
                record.success_rate,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(record.id.clone())
    }

    async fn query_candidates(
        &self,
        kind: PatternKind,
        filters: &[Filter],
        order: OrderKey,
        limit: usize,
    ) -> Result<Vec<PatternRecord>> {
        let mut clauses = Vec::with_capacity(filters.len());
        let mut values: Vec<String> = Vec::with_capacity(filters.len() * 2);
        for filter in filters {
            validate_field(&filter.field)?;
            let n = values.len();
            match filter.op {
                FilterOp::Eq => clauses.push(format!("json_extract(attributes, ?{}) = ?{}", n + 1, n + 2)),
            }
            values.push(format!("$.{}", filter.field));
            values.push(filter.value.clone());
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT id, attributes, input, output, use_count, success_rate, created_at, updated_at
             FROM {} {} ORDER BY {} LIMIT {}",
            kind.table(),
            where_sql,
            order.sql(),
            limit
        );

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&sql)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| Self::row_to_record(kind, row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    async fn get(&self, kind: PatternKind, id: &str) -> Result<Option<PatternRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT id, attributes, input, output, use_count, success_rate, created_at, updated_at
             FROM {} WHERE id = ?1",
            kind.table()
        ))?;
        let record = stmt.query_row(params![id], |row| Self::row_to_record(kind, row)).optional()?;
        Ok(record)
    }

    async fn update_stats(
        &self,
        kind: PatternKind,
        id: &str,
        use_count: u32,
        success_rate: u8,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET use_count = ?1, success_rate = ?2, updated_at = ?3 WHERE id = ?4",
                kind.table()
            ),
            params![use_count, success_rate.min(100), updated_at.to_rfc3339(), id],
        )?;

        if changed == 0 {
            return Err(ForgeError::NotFound { kind, id: id.to_string() });
        }
        Ok(())
    }

    async fn count(&self, kind: PatternKind) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", kind.table()), [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    async fn summary(&self) -> Result<Vec<KindSummary>> {
        let conn = self.conn.lock().await;
        let mut summaries = Vec::with_capacity(PatternKind::ALL.len());

        for kind in PatternKind::ALL {
            let summary = conn.query_row(
                &format!(
                    "SELECT COUNT(*),
                            COALESCE(SUM(CASE WHEN use_count >= ?1 AND success_rate >= ?2 THEN 1 ELSE 0 END), 0),
                            COALESCE(SUM(use_count), 0),
                            COALESCE(AVG(success_rate), 0.0)
                     FROM {}",
                    kind.table()
                ),
                params![RELIABLE_MIN_USES, RELIABLE_MIN_RATE],
                |row| {
                    Ok(KindSummary {
                        kind,
                        total_patterns: row.get::<_, i64>(0)?.max(0) as u64,
                        reliable_patterns: row.get::<_, i64>(1)?.max(0) as u64,
                        total_uses: row.get::<_, i64>(2)?.max(0) as u64,
                        mean_success_rate: row.get(3)?,
                    })
                },
            )?;
            summaries.push(summary);
        }

        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_record(language: &str, style: &str, code: &str) -> PatternRecord {
        let mut attributes = BTreeMap::new();
        attributes.insert("language".to_string(), language.to_string());
        attributes.insert("style".to_string(), style.to_string());
        PatternRecord::new(
            PatternKind::Documentation,
            attributes,
            json!({ "code": code, "language": language, "style": style }),
            json!({ "text": format!("/** {} */", code) }),
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = SqlitePatternStore::in_memory().unwrap();
        let record = doc_record("java", "javadoc", "class Foo {}");
        let id = store.insert(&record).await.unwrap();

        let loaded = store.get(PatternKind::Documentation, &id).await.unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.input, record.input);
        assert_eq!(loaded.output, record.output);
        assert_eq!(loaded.use_count, 0);
        assert_eq!(loaded.success_rate, 100);

        // Kinds do not share collections
        assert!(store.get(PatternKind::CodeFix, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_filters_on_attributes() {
        let store = SqlitePatternStore::in_memory().unwrap();
        store.insert(&doc_record("java", "javadoc", "class A {}")).await.unwrap();
        store.insert(&doc_record("java", "inline", "class B {}")).await.unwrap();
        store.insert(&doc_record("kotlin", "javadoc", "class C {}")).await.unwrap();

        let found = store
            .query_candidates(
                PatternKind::Documentation,
                &[Filter::eq("language", "java"), Filter::eq("style", "javadoc")],
                OrderKey::SuccessRateDesc,
                20,
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].input["code"], "class A {}");

        let all = store
            .query_candidates(PatternKind::Documentation, &[], OrderKey::SuccessRateDesc, 20)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_query_orders_and_limits() {
        let store = SqlitePatternStore::in_memory().unwrap();
        let mut ids = Vec::new();
        for i in 0..5u32 {
            let record = doc_record("java", "javadoc", &format!("class C{} {{}}", i));
            ids.push(store.insert(&record).await.unwrap());
            store
                .update_stats(PatternKind::Documentation, &ids[i as usize], i, 100 - (i as u8) * 10, Utc::now())
                .await
                .unwrap();
        }

        let by_use = store
            .query_candidates(PatternKind::Documentation, &[], OrderKey::UseCountDesc, 2)
            .await
            .unwrap();
        assert_eq!(by_use.len(), 2);
        assert_eq!(by_use[0].use_count, 4);
        assert_eq!(by_use[1].use_count, 3);

        let by_rate = store
            .query_candidates(PatternKind::Documentation, &[], OrderKey::SuccessRateDesc, 1)
            .await
            .unwrap();
        assert_eq!(by_rate[0].success_rate, 100);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = SqlitePatternStore::in_memory().unwrap();
        let err = store
            .update_stats(PatternKind::IdeaGeneration, "missing", 1, 100, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejects_unsafe_filter_field() {
        let store = SqlitePatternStore::in_memory().unwrap();
        let err = store
            .query_candidates(PatternKind::Documentation, &[Filter::eq("a') OR 1=1 --", "x")], OrderKey::UpdatedDesc, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.db");

        let id = {
            let store = SqlitePatternStore::new(&path).await.unwrap();
            let id = store.insert(&doc_record("java", "javadoc", "class Foo {}")).await.unwrap();
            store.update_stats(PatternKind::Documentation, &id, 7, 86, Utc::now()).await.unwrap();
            id
        };

        let reopened = SqlitePatternStore::new(&path).await.unwrap();
        let record = reopened.get(PatternKind::Documentation, &id).await.unwrap().unwrap();
        assert_eq!(record.use_count, 7);
        assert_eq!(record.success_rate, 86);
    }

    #[tokio::test]
    async fn test_count_is_per_kind() {
        let store = SqlitePatternStore::in_memory().unwrap();
        assert_eq!(store.count(PatternKind::Documentation).await.unwrap(), 0);

        store.insert(&doc_record("java", "javadoc", "class A {}")).await.unwrap();
        store.insert(&doc_record("java", "javadoc", "class B {}")).await.unwrap();
        assert_eq!(store.count(PatternKind::Documentation).await.unwrap(), 2);
        assert_eq!(store.count(PatternKind::CodeFix).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_damaged_row_is_reported() {
        let store = SqlitePatternStore::in_memory().unwrap();
        let id = store.insert(&doc_record("java", "javadoc", "class A {}")).await.unwrap();
        store
            .conn
            .lock()
            .await
            .execute("UPDATE doc_patterns SET output = '{not json' WHERE id = ?1", params![id])
            .unwrap();

        let err = store.get(PatternKind::Documentation, &id).await.unwrap_err();
        assert!(matches!(err, ForgeError::Persistence(_)));

        let err = store
            .query_candidates(PatternKind::Documentation, &[], OrderKey::UpdatedDesc, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_bad_timestamp_is_reported() {
        let store = SqlitePatternStore::in_memory().unwrap();
        let id = store.insert(&doc_record("java", "javadoc", "class A {}")).await.unwrap();
        store
            .conn
            .lock()
            .await
            .execute("UPDATE doc_patterns SET updated_at = 'yesterday' WHERE id = ?1", params![id])
            .unwrap();

        assert!(store.get(PatternKind::Documentation, &id).await.is_err());
    }

    #[tokio::test]
    async fn test_summary_counts_reliable_patterns() {
        let store = SqlitePatternStore::in_memory().unwrap();
        let a = store.insert(&doc_record("java", "javadoc", "class A {}")).await.unwrap();
        store.insert(&doc_record("java", "javadoc", "class B {}")).await.unwrap();
        store.update_stats(PatternKind::Documentation, &a, 5, 90, Utc::now()).await.unwrap();

        let summary = store.summary().await.unwrap();
        let docs = summary.iter().find(|s| s.kind == PatternKind::Documentation).unwrap();
        assert_eq!(docs.total_patterns, 2);
        assert_eq!(docs.reliable_patterns, 1);
        assert_eq!(docs.total_uses, 5);
        assert_eq!(docs.mean_success_rate, 95.0);

        let ideas = summary.iter().find(|s| s.kind == PatternKind::IdeaGeneration).unwrap();
        assert_eq!(ideas.total_patterns, 0);
    }
}
