//! COLUMNS projection and ORDER sorting

use serde_json::Value;
use std::cmp::Ordering;

use super::ast::{Column, Direction, Order};
use super::executor::{ExecutionError, ExecutionResult};
use super::Row;
use crate::storage::record::Record;

/// Builds output rows from raw records. Every column must be a field reference.
pub fn project_records(records: &[&Record], columns: &[Column]) -> ExecutionResult<Vec<Row>> {
    records
        .iter()
        .map(|record| {
            let mut row = Row::with_capacity(columns.len());
            for column in columns {
                let field_ref = match column {
                    Column::Field(field_ref) => field_ref,
                    Column::Alias(alias) => {
                        return Err(ExecutionError::Aggregation(format!(
                            "column {} needs TRANSFORMATIONS",
                            alias
                        )))
                    }
                };
                let value = record.get(field_ref.field).ok_or_else(|| {
                    ExecutionError::Aggregation(format!("record has no field {}", field_ref.key))
                })?;
                row.insert(field_ref.key.clone(), value.to_json());
            }
            Ok(row)
        })
        .collect()
}

/// Restricts grouped rows to the COLUMNS keys, in COLUMNS order
pub fn project_rows(rows: Vec<Row>, columns: &[Column]) -> Vec<Row> {
    rows.into_iter()
        .map(|mut grouped| {
            let mut row = Row::with_capacity(columns.len());
            for column in columns {
                if let Some(value) = grouped.remove(column.key()) {
                    row.insert(column.key().to_string(), value);
                }
            }
            row
        })
        .collect()
}

/// Stable sort on the ORDER keys. DOWN flips every key.
pub fn sort_rows(rows: &mut [Row], order: &Order) {
    rows.sort_by(|a, b| {
        let ordering = order
            .keys
            .iter()
            .map(|key| compare_values(a.get(key), b.get(key)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal);
        match order.direction {
            Direction::Up => ordering,
            Direction::Down => ordering.reverse(),
        }
    });
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Number(_)) => 0,
        Some(Value::String(_)) => 1,
        _ => 2,
    }
}

/// Numbers sort before strings. Strings compare by code point.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.chars().cmp(y.chars()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::FieldRef;
    use crate::storage::record::{Field, SectionField};
    use crate::test_support::section;
    use serde_json::json;

    fn column(key: &str, field: SectionField) -> Column {
        Column::Field(FieldRef {
            key: key.to_string(),
            dataset_id: "sections".to_string(),
            field: Field::Section(field),
        })
    }

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect()
    }

    fn order(direction: Direction, keys: &[&str]) -> Order {
        Order {
            direction,
            keys: keys.iter().map(|key| key.to_string()).collect(),
        }
    }

    #[test]
    fn test_project_records() {
        let records = vec![section("cpsc", "310", "holmes", 2015.0, 82.5)];
        let refs: Vec<&Record> = records.iter().collect();
        let columns = vec![
            column("sections_avg", SectionField::Avg),
            column("sections_dept", SectionField::Dept),
            column("sections_year", SectionField::Year),
        ];

        let projected = project_records(&refs, &columns).unwrap();
        assert_eq!(
            serde_json::to_string(&projected[0]).unwrap(),
            r#"{"sections_avg":82.5,"sections_dept":"cpsc","sections_year":2015}"#
        );
    }

    #[test]
    fn test_project_rows_drops_unselected_keys() {
        let grouped = rows(vec![json!({"sections_dept": "cpsc", "sections_id": "310", "n": 4})]);
        let columns = vec![
            Column::Alias("n".to_string()),
            column("sections_dept", SectionField::Dept),
        ];

        let projected = project_rows(grouped, &columns);
        assert_eq!(
            serde_json::to_string(&projected[0]).unwrap(),
            r#"{"n":4,"sections_dept":"cpsc"}"#
        );
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let mut data = rows(vec![
            json!({"dept": "math", "avg": 80, "tag": 1}),
            json!({"dept": "cpsc", "avg": 90, "tag": 2}),
            json!({"dept": "math", "avg": 70, "tag": 3}),
            json!({"dept": "cpsc", "avg": 90, "tag": 4}),
        ]);
        sort_rows(&mut data, &order(Direction::Up, &["dept", "avg"]));
        let tags: Vec<_> = data.iter().map(|row| row["tag"].clone()).collect();
        assert_eq!(tags, vec![json!(2), json!(4), json!(3), json!(1)]);

        sort_rows(&mut data, &order(Direction::Down, &["avg"]));
        let tags: Vec<_> = data.iter().map(|row| row["tag"].clone()).collect();
        assert_eq!(tags, vec![json!(2), json!(4), json!(1), json!(3)]);
    }

    #[test]
    fn test_down_reverses_up_without_ties() {
        let original = rows(vec![
            json!({"k": "b"}),
            json!({"k": "a"}),
            json!({"k": "B"}),
            json!({"k": "ä"}),
        ]);
        let mut up = original.clone();
        sort_rows(&mut up, &order(Direction::Up, &["k"]));
        let mut down = original;
        sort_rows(&mut down, &order(Direction::Down, &["k"]));

        down.reverse();
        assert_eq!(up, down);
        // Code point order puts uppercase first
        assert_eq!(up[0]["k"], json!("B"));
        assert_eq!(up[3]["k"], json!("ä"));
    }

    #[test]
    fn test_numbers_sort_before_strings() {
        let mut data = rows(vec![json!({"k": "10"}), json!({"k": 9.5}), json!({"k": -3})]);
        sort_rows(&mut data, &order(Direction::Up, &["k"]));
        assert_eq!(
            data.iter().map(|row| row["k"].clone()).collect::<Vec<_>>(),
            vec![json!(-3), json!(9.5), json!("10")]
        );
    }
}
