//! GROUP and APPLY evaluation

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use super::ast::{ApplyRule, ApplyToken, Transformations};
use super::executor::{ExecutionError, ExecutionResult};
use super::Row;
use crate::storage::record::{number_to_json, Field, FieldValue, Record};

/// Hashable form of a field value. Numbers are keyed by their bit pattern
/// with negative zero folded into zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KeyPart<'a> {
    Number(u64),
    Text(&'a str),
}

impl<'a> From<FieldValue<'a>> for KeyPart<'a> {
    fn from(value: FieldValue<'a>) -> Self {
        match value {
            FieldValue::Number(n) if n == 0.0 => KeyPart::Number(0f64.to_bits()),
            FieldValue::Number(n) => KeyPart::Number(n.to_bits()),
            FieldValue::Text(s) => KeyPart::Text(s),
        }
    }
}

struct Group<'a> {
    members: Vec<&'a Record>,
}

/// Partitions `records` by the GROUP keys and evaluates every APPLY rule per
/// group. Groups come out in order of first appearance.
pub fn apply_transformations(
    records: &[&Record],
    transformations: &Transformations,
) -> ExecutionResult<Vec<Row>> {
    let mut positions: HashMap<Vec<KeyPart<'_>>, usize> = HashMap::new();
    let mut groups: Vec<Group<'_>> = Vec::new();

    for &record in records {
        let key = transformations
            .group
            .iter()
            .map(|group| field_value(record, group.field).map(KeyPart::from))
            .collect::<ExecutionResult<Vec<_>>>()?;

        match positions.get(&key) {
            Some(&position) => groups[position].members.push(record),
            None => {
                positions.insert(key, groups.len());
                groups.push(Group {
                    members: vec![record],
                });
            }
        }
    }

    groups
        .iter()
        .map(|group| {
            let mut row = Row::new();
            let first = group.members[0];
            for group_key in &transformations.group {
                let value = field_value(first, group_key.field)?;
                row.insert(group_key.key.clone(), value.to_json());
            }
            for rule in &transformations.apply {
                row.insert(rule.alias.clone(), aggregate(rule, &group.members)?);
            }
            Ok(row)
        })
        .collect()
}

fn field_value(record: &Record, field: Field) -> ExecutionResult<FieldValue<'_>> {
    record.get(field).ok_or_else(|| {
        ExecutionError::Aggregation(format!(
            "{:?} record has no field {:?}",
            record.kind(),
            field
        ))
    })
}

fn numbers(rule: &ApplyRule, members: &[&Record]) -> ExecutionResult<Vec<f64>> {
    members
        .iter()
        .map(|record| {
            field_value(record, rule.field)?.as_number().ok_or_else(|| {
                ExecutionError::Aggregation(format!("{} needs a numeric field", rule.alias))
            })
        })
        .collect()
}

fn aggregate(rule: &ApplyRule, members: &[&Record]) -> ExecutionResult<Value> {
    match rule.token {
        ApplyToken::Count => {
            let distinct = members
                .iter()
                .map(|record| field_value(record, rule.field).map(KeyPart::from))
                .collect::<ExecutionResult<HashSet<_>>>()?;
            Ok(Value::from(distinct.len()))
        }
        ApplyToken::Max => {
            let max = numbers(rule, members)?
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max);
            Ok(number_to_json(max))
        }
        ApplyToken::Min => {
            let min = numbers(rule, members)?
                .into_iter()
                .fold(f64::INFINITY, f64::min);
            Ok(number_to_json(min))
        }
        ApplyToken::Sum => {
            let total = exact_sum(rule, &numbers(rule, members)?)?;
            rounded(rule, total)
        }
        ApplyToken::Avg => {
            let values = numbers(rule, members)?;
            let total = exact_sum(rule, &values)?;
            let mean = total
                .checked_div(Decimal::from(values.len()))
                .ok_or_else(|| overflow(rule))?;
            rounded(rule, mean)
        }
    }
}

/// Sums in decimal so the result does not depend on input order
fn exact_sum(rule: &ApplyRule, values: &[f64]) -> ExecutionResult<Decimal> {
    values.iter().try_fold(Decimal::ZERO, |total, &value| {
        let value = Decimal::from_str(&value.to_string())
            .ok()
            .or_else(|| Decimal::from_f64(value))
            .ok_or_else(|| overflow(rule))?;
        total.checked_add(value).ok_or_else(|| overflow(rule))
    })
}

fn rounded(rule: &ApplyRule, value: Decimal) -> ExecutionResult<Value> {
    value
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_string()
        .parse::<f64>()
        .map(number_to_json)
        .map_err(|_| overflow(rule))
}

fn overflow(rule: &ApplyRule) -> ExecutionError {
    ExecutionError::Aggregation(format!("{} overflowed", rule.alias))
}
