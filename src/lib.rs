//! campusdb - a small document-query engine for campus datasets
//!
//! This crate stores course-section and room datasets on disk and answers
//! JSON queries against one dataset at a time, with boolean filtering,
//! grouping with aggregates, projection and ordering.

pub mod engine;
pub mod ingestion;
pub mod metrics;
pub mod query;
pub mod storage;

#[cfg(test)]
mod test_support;
