use thiserror::Error;

use crate::storage::record::{DatasetKind, Record};

/// Errors that can occur during parsing
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Invalid input format: {0}")]
    InvalidFormat(String),
    #[error("Record {index}: missing required field: {field}")]
    MissingField { index: usize, field: String },
    #[error("Record {index}: invalid field type: {field} must be {expected}")]
    InvalidFieldType {
        index: usize,
        field: String,
        expected: &'static str,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Batch processing error: {0}")]
    BatchError(String),
}

/// Result type for parser operations
pub type ParserResult<T> = Result<T, ParserError>;

/// Turns raw dataset content into typed records of one kind
pub trait RecordParser {
    /// Parses a single input into records of the given kind
    fn parse(&self, input: &[u8], kind: DatasetKind) -> ParserResult<Vec<Record>>;

    /// Parses several inputs, failing with every per-input error if any input fails
    fn parse_batch(&self, inputs: &[&[u8]], kind: DatasetKind) -> ParserResult<Vec<Record>> {
        let mut results = Vec::new();
        let mut errors = Vec::new();

        for (i, input) in inputs.iter().enumerate() {
            match self.parse(input, kind) {
                Ok(records) => results.extend(records),
                Err(e) => errors.push((i, e)),
            }
        }

        if !errors.is_empty() {
            let error_msg = errors
                .into_iter()
                .map(|(i, e)| format!("Input {}: {}", i, e))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ParserError::BatchError(error_msg));
        }

        Ok(results)
    }

    /// Returns the supported input formats
    fn supported_formats(&self) -> Vec<&'static str>;
}
