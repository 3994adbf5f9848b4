//! Query module for campusdb
//! Handles query validation and execution over a single dataset.

pub mod ast;
pub mod executor;
pub mod filter;
pub mod projection;
pub mod transform;
pub mod validator;

pub use ast::Query;
pub use executor::{ExecutionConfig, ExecutionError, QueryExecutor};
pub use validator::{QueryValidator, ValidationError};

/// One output row, keyed by COLUMNS entries in COLUMNS order
pub type Row = serde_json::Map<String, serde_json::Value>;
