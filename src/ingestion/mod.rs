//! Ingestion module for campusdb
//! Turns JSON or CSV dataset files into typed records.

pub mod formats;
pub mod parser;

pub use formats::{parser_for_path, CsvRecordParser, JsonRecordParser};
pub use parser::{ParserError, ParserResult, RecordParser};
