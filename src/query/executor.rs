use tracing::debug;

use super::ast::Query;
use super::projection::{project_records, project_rows, sort_rows};
use super::transform::apply_transformations;
use super::Row;
use crate::storage::record::Record;

/// Error type for execution operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error(
        "The result is too big. Only queries with a maximum of {limit} results are supported \
         ({rows} rows)"
    )]
    ResultTooLarge { rows: usize, limit: usize },
    #[error("Aggregation failed: {0}")]
    Aggregation(String),
}

/// Result type for execution operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Configuration for query execution
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Largest result a query may return
    pub max_result_rows: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_result_rows: 5000,
        }
    }
}

/// Runs validated queries over the records of one dataset
#[derive(Debug, Clone, Default)]
pub struct QueryExecutor {
    config: ExecutionConfig,
}

impl QueryExecutor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    /// Filters, groups, checks the size limit, then projects and sorts.
    pub fn execute(&self, query: &Query, records: &[Record]) -> ExecutionResult<Vec<Row>> {
        let selected = query.filter.select(records);
        debug!(
            dataset = %query.dataset_id,
            scanned = records.len(),
            selected = selected.len(),
            "filter applied"
        );

        let mut rows = match &query.transformations {
            Some(transformations) => {
                let grouped = apply_transformations(&selected, transformations)?;
                self.check_size(grouped.len())?;
                project_rows(grouped, &query.columns)
            }
            None => {
                self.check_size(selected.len())?;
                project_records(&selected, &query.columns)?
            }
        };

        if let Some(order) = &query.order {
            sort_rows(&mut rows, order);
        }

        Ok(rows)
    }

    fn check_size(&self, rows: usize) -> ExecutionResult<()> {
        if rows > self.config.max_result_rows {
            return Err(ExecutionError::ResultTooLarge {
                rows,
                limit: self.config.max_result_rows,
            });
        }
        Ok(())
    }
}
