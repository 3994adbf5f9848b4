use serde_json::{Map, Value};
use std::path::Path;

use super::parser::{ParserError, ParserResult, RecordParser};
use crate::storage::record::{DatasetKind, Record, Room, Section};

/// Parser for JSON input: an array of flat record objects, or one object
#[derive(Debug, Default)]
pub struct JsonRecordParser;

impl JsonRecordParser {
    pub fn new() -> Self {
        Self
    }
}

impl RecordParser for JsonRecordParser {
    fn parse(&self, input: &[u8], kind: DatasetKind) -> ParserResult<Vec<Record>> {
        let value: Value = serde_json::from_slice(input)
            .map_err(|e| ParserError::InvalidFormat(e.to_string()))?;

        match value {
            Value::Object(fields) => Ok(vec![build_record(0, &fields, kind)?]),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::Object(fields) => build_record(index, fields, kind),
                    _ => Err(ParserError::InvalidFormat(format!(
                        "Record {} is not a JSON object",
                        index
                    ))),
                })
                .collect(),
            _ => Err(ParserError::InvalidFormat(
                "Input must be a JSON object or array".to_string(),
            )),
        }
    }

    fn supported_formats(&self) -> Vec<&'static str> {
        vec!["application/json", "json"]
    }
}

/// Parser for CSV input with a header row naming the record fields
#[derive(Debug, Default)]
pub struct CsvRecordParser;

impl CsvRecordParser {
    pub fn new() -> Self {
        Self
    }
}

impl RecordParser for CsvRecordParser {
    fn parse(&self, input: &[u8], kind: DatasetKind) -> ParserResult<Vec<Record>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(input);
        let headers = reader.headers()?.clone();

        let mut records = Vec::new();
        for (index, row) in reader.records().enumerate() {
            let row = row?;
            let fields: Map<String, Value> = headers
                .iter()
                .zip(row.iter())
                .map(|(name, cell)| (name.to_string(), Value::String(cell.to_string())))
                .collect();
            records.push(build_record(index, &fields, kind)?);
        }
        Ok(records)
    }

    fn supported_formats(&self) -> Vec<&'static str> {
        vec!["text/csv", "csv"]
    }
}

/// Picks a parser from a file extension
pub fn parser_for_path(path: &Path) -> Option<Box<dyn RecordParser + Send + Sync>> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "json" => Some(Box::new(JsonRecordParser::new())),
        "csv" => Some(Box::new(CsvRecordParser::new())),
        _ => None,
    }
}

struct Fields<'a> {
    index: usize,
    fields: &'a Map<String, Value>,
}

impl Fields<'_> {
    fn get(&self, name: &str) -> ParserResult<&Value> {
        self.fields.get(name).ok_or_else(|| ParserError::MissingField {
            index: self.index,
            field: name.to_string(),
        })
    }

    /// Strings as-is; numbers are rendered as text (course ids are often numeric)
    fn text(&self, name: &str) -> ParserResult<String> {
        match self.get(name)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(self.wrong_type(name, "a string")),
        }
    }

    /// Numbers as-is; strings must parse as a number
    fn number(&self, name: &str) -> ParserResult<f64> {
        match self.get(name)? {
            Value::Number(n) => n.as_f64().ok_or_else(|| self.wrong_type(name, "a number")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| self.wrong_type(name, "a number")),
            _ => Err(self.wrong_type(name, "a number")),
        }
    }

    fn wrong_type(&self, name: &str, expected: &'static str) -> ParserError {
        ParserError::InvalidFieldType {
            index: self.index,
            field: name.to_string(),
            expected,
        }
    }
}

fn build_record(
    index: usize,
    fields: &Map<String, Value>,
    kind: DatasetKind,
) -> ParserResult<Record> {
    let f = Fields { index, fields };
    Ok(match kind {
        DatasetKind::Sections => Record::Section(Section {
            uuid: f.text("uuid")?,
            id: f.text("id")?,
            title: f.text("title")?,
            instructor: f.text("instructor")?,
            dept: f.text("dept")?,
            year: f.number("year")?,
            avg: f.number("avg")?,
            pass: f.number("pass")?,
            fail: f.number("fail")?,
            audit: f.number("audit")?,
        }),
        DatasetKind::Rooms => Record::Room(Room {
            fullname: f.text("fullname")?,
            shortname: f.text("shortname")?,
            number: f.text("number")?,
            name: f.text("name")?,
            address: f.text("address")?,
            lat: f.number("lat")?,
            lon: f.number("lon")?,
            seats: f.number("seats")?,
            room_type: f.text("type")?,
            furniture: f.text("furniture")?,
            href: f.text("href")?,
        }),
    })
}
