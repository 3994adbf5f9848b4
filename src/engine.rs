//! The operations a boundary layer calls: add, remove, list and query.

use serde_json::Value;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::metrics;
use crate::query::{
    ExecutionConfig, ExecutionError, QueryExecutor, QueryValidator, Row, ValidationError,
};
use crate::storage::{DatasetKind, DatasetStore, Header, Record, StorageError};

/// Errors surfaced to callers of [`Engine`]
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("The result is too big. Only queries with a maximum of {0} results are supported")]
    ResultTooLarge(usize),
    #[error("Storage error: {0}")]
    Storage(StorageError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Error category name used at the process boundary
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "InsightError",
            EngineError::NotFound(_) => "NotFoundError",
            EngineError::ResultTooLarge(_) => "ResultTooLargeError",
            EngineError::Storage(_) | EngineError::Internal(_) => "InternalError",
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidId(_)
            | StorageError::DuplicateId(_)
            | StorageError::EmptyDataset(_)
            | StorageError::KindMismatch(_) => EngineError::Validation(e.to_string()),
            StorageError::NotFound(_) => EngineError::NotFound(e.to_string()),
            other => EngineError::Storage(other),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

impl From<ExecutionError> for EngineError {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::ResultTooLarge { limit, .. } => EngineError::ResultTooLarge(limit),
            ExecutionError::Aggregation(message) => EngineError::Internal(message),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding dataset files and the header index
    pub data_dir: PathBuf,
    pub execution: ExecutionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            execution: ExecutionConfig::default(),
        }
    }
}

pub struct Engine {
    store: DatasetStore,
    executor: QueryExecutor,
}

impl Engine {
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        let store = DatasetStore::open(&config.data_dir).await?;
        metrics::update_dataset_count(store.list().await.len());
        Ok(Self {
            store,
            executor: QueryExecutor::new(config.execution),
        })
    }

    /// Stores a new dataset and returns the ids of every stored dataset
    pub async fn add_dataset(
        &self,
        id: &str,
        kind: DatasetKind,
        records: Vec<Record>,
    ) -> EngineResult<Vec<String>> {
        let rows = records.len();
        let ids = self.store.add(id, kind, records).await?;
        metrics::record_dataset_added(kind, rows);
        metrics::update_dataset_count(ids.len());
        Ok(ids)
    }

    /// Removes a dataset and returns its id
    pub async fn remove_dataset(&self, id: &str) -> EngineResult<String> {
        let header = self.store.remove(id).await?;
        metrics::record_dataset_removed(header.kind);
        metrics::update_dataset_count(self.store.list().await.len());
        Ok(header.id)
    }

    pub async fn list_datasets(&self) -> Vec<Header> {
        self.store.list().await
    }

    /// Validates and runs a query document
    pub async fn perform_query(&self, query: &Value) -> EngineResult<Vec<Row>> {
        let started = Instant::now();
        match self.run_query(query).await {
            Ok(rows) => {
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                metrics::record_query(elapsed, rows.len());
                info!("Query returned {} row(s) in {:.2}ms", rows.len(), elapsed);
                Ok(rows)
            }
            Err(e) => {
                metrics::record_query_failure(e.category());
                debug!("Query rejected: {}", e);
                Err(e)
            }
        }
    }

    async fn run_query(&self, query: &Value) -> EngineResult<Vec<Row>> {
        let headers = self.store.list().await;
        let query = QueryValidator::new().with_headers(&headers).validate(query)?;

        let dataset = match self.store.get(&query.dataset_id).await {
            Ok(dataset) => dataset,
            // Removed between validation and load
            Err(StorageError::NotFound(id)) => {
                return Err(ValidationError::UnknownDataset(id).into())
            }
            Err(e) => return Err(e.into()),
        };

        let executor = self.executor.clone();
        let rows = tokio::task::spawn_blocking(move || executor.execute(&query, &dataset.records))
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))??;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{room, section};
    use serde_json::json;
    use tempfile::tempdir;

    async fn open_engine(dir: &std::path::Path) -> Engine {
        Engine::open(EngineConfig {
            data_dir: dir.to_path_buf(),
            ..EngineConfig::default()
        })
        .await
        .unwrap()
    }

    fn courses() -> Vec<Record> {
        vec![
            section("cpsc", "310", "holmes", 2015.0, 95.0),
            section("math", "100", "noether", 2016.0, 60.0),
            section("cpsc", "110", "kiczales", 2014.0, 85.0),
        ]
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let dir = tempdir().unwrap();
        let engine = open_engine(dir.path()).await;

        let ids = engine
            .add_dataset("x", DatasetKind::Sections, courses())
            .await
            .unwrap();
        assert_eq!(ids, vec!["x".to_string()]);

        let listed = serde_json::to_value(engine.list_datasets().await).unwrap();
        assert_eq!(listed[0]["id"], json!("x"));
        assert_eq!(listed[0]["kind"], json!("sections"));
        assert_eq!(listed[0]["numRows"], json!(3));

        assert_eq!(engine.remove_dataset("x").await.unwrap(), "x");
        assert!(engine.list_datasets().await.is_empty());
    }

    #[tokio::test]
    async fn test_error_categories() {
        let dir = tempdir().unwrap();
        let engine = open_engine(dir.path()).await;
        engine
            .add_dataset("sections", DatasetKind::Sections, courses())
            .await
            .unwrap();

        let duplicate = engine
            .add_dataset("sections", DatasetKind::Sections, courses())
            .await
            .unwrap_err();
        assert_eq!(duplicate.category(), "InsightError");

        let bad_id = engine.remove_dataset("a_b").await.unwrap_err();
        assert_eq!(bad_id.category(), "InsightError");

        let missing = engine.remove_dataset("rooms").await.unwrap_err();
        assert_eq!(missing.category(), "NotFoundError");

        let empty = engine
            .add_dataset("empty", DatasetKind::Rooms, vec![])
            .await
            .unwrap_err();
        assert_eq!(empty.category(), "InsightError");
    }

    #[tokio::test]
    async fn test_perform_query() {
        let dir = tempdir().unwrap();
        let engine = open_engine(dir.path()).await;
        engine
            .add_dataset("sections", DatasetKind::Sections, courses())
            .await
            .unwrap();

        let rows = engine
            .perform_query(&json!({
                "WHERE": {"GT": {"sections_avg": 90}},
                "OPTIONS": {"COLUMNS": ["sections_dept"]}
            }))
            .await
            .unwrap();
        assert_eq!(
            rows.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![json!({"sections_dept": "cpsc"})]
        );
    }

    #[tokio::test]
    async fn test_query_rejections() {
        let dir = tempdir().unwrap();
        let engine = open_engine(dir.path()).await;
        engine
            .add_dataset("sections", DatasetKind::Sections, courses())
            .await
            .unwrap();
        engine
            .add_dataset("rooms", DatasetKind::Rooms, vec![room("DMP", "110", 120.0, "Tables")])
            .await
            .unwrap();

        let err = engine
            .perform_query(&json!({
                "WHERE": {"GT": {"rooms_seats": 90}},
                "OPTIONS": {"COLUMNS": ["sections_dept"]}
            }))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "InsightError");

        let err = engine
            .perform_query(&json!({
                "WHERE": {"GT": {"sections_avg": 90}},
                "OPTIONS": {"COLUMNS": ["sections_dept", "n"]},
                "TRANSFORMATIONS": {
                    "GROUP": ["sections_dept"],
                    "APPLY": [{"n": {"COUNT": "other_uuid"}}]
                }
            }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot query more than one dataset");

        let err = engine
            .perform_query(&json!({"WHERE": {}, "OPTIONS": {"COLUMNS": ["courses_dept"]}}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Referenced dataset \"courses\" not added yet");
    }

    #[tokio::test]
    async fn test_result_too_large() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(EngineConfig {
            data_dir: dir.path().to_path_buf(),
            execution: ExecutionConfig { max_result_rows: 2 },
        })
        .await
        .unwrap();
        engine
            .add_dataset("sections", DatasetKind::Sections, courses())
            .await
            .unwrap();

        let err = engine
            .perform_query(&json!({"WHERE": {}, "OPTIONS": {"COLUMNS": ["sections_uuid"]}}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ResultTooLarge(2)));
        assert_eq!(err.category(), "ResultTooLargeError");
    }

    #[tokio::test]
    async fn test_datasets_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let engine = open_engine(dir.path()).await;
            engine
                .add_dataset("sections", DatasetKind::Sections, courses())
                .await
                .unwrap();
        }

        let engine = open_engine(dir.path()).await;
        let rows = engine
            .perform_query(&json!({
                "WHERE": {"IS": {"sections_dept": "math"}},
                "OPTIONS": {"COLUMNS": ["sections_instructor", "sections_year"]}
            }))
            .await
            .unwrap();
        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({"sections_instructor": "noether", "sections_year": 2016})
        );
    }
}
