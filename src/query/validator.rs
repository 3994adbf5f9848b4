use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use super::ast::{
    ApplyRule, ApplyToken, Column, Comparison, Direction, FieldRef, Filter, Order, Pattern, Query,
    Transformations,
};
use crate::storage::index::Header;
use crate::storage::record::{DatasetKind, Field, FieldType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid query string")]
    InvalidQuery,
    #[error("Missing {0}")]
    MissingClause(&'static str),
    #[error("Excess keys in query")]
    ExcessKeys,
    #[error("{0}")]
    Malformed(String),
    #[error("Invalid key {key} in {context}")]
    InvalidKey { key: String, context: String },
    #[error("Invalid key type in {0}")]
    InvalidKeyType(String),
    #[error("Asterisks (*) can only be the first or last characters of input strings")]
    InvalidWildcard,
    #[error("Duplicate APPLY key {0}")]
    DuplicateApplyKey(String),
    #[error("Keys in COLUMNS must be in GROUP or APPLY when TRANSFORMATIONS is present")]
    UngroupedColumn(String),
    #[error("Cannot query more than one dataset")]
    MultipleDatasets,
    #[error("Referenced dataset \"{0}\" not added yet")]
    UnknownDataset(String),
    #[error("Used {used} query fields on {stored} dataset.")]
    KindMismatch {
        used: DatasetKind,
        stored: DatasetKind,
    },
}

type ValidationResult<T> = Result<T, ValidationError>;

fn malformed(message: impl Into<String>) -> ValidationError {
    ValidationError::Malformed(message.into())
}

fn invalid_key(key: &str, context: &str) -> ValidationError {
    ValidationError::InvalidKey {
        key: key.to_string(),
        context: context.to_string(),
    }
}

/// State gathered while walking one query: the dataset id and record kind
/// that its field references resolve to.
#[derive(Debug, Default)]
struct ValidationContext {
    dataset_id: Option<String>,
    kind: Option<DatasetKind>,
    multiple_datasets: bool,
}

impl ValidationContext {
    fn record(
        &mut self,
        key: &str,
        context: &str,
        dataset_id: &str,
        kind: DatasetKind,
    ) -> ValidationResult<()> {
        match self.kind {
            None => self.kind = Some(kind),
            Some(expected) if expected != kind => return Err(invalid_key(key, context)),
            Some(_) => {}
        }
        match &self.dataset_id {
            None => self.dataset_id = Some(dataset_id.to_string()),
            Some(expected) if expected != dataset_id => self.multiple_datasets = true,
            Some(_) => {}
        }
        Ok(())
    }

    fn finish(self) -> ValidationResult<(String, DatasetKind)> {
        if self.multiple_datasets {
            return Err(ValidationError::MultipleDatasets);
        }
        match (self.dataset_id, self.kind) {
            (Some(id), Some(kind)) => Ok((id, kind)),
            _ => Err(ValidationError::InvalidQuery),
        }
    }
}

/// Checks raw query documents against the shape rules and the set of stored datasets
#[derive(Debug, Clone, Default)]
pub struct QueryValidator {
    datasets: HashMap<String, DatasetKind>,
}

impl QueryValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, id: impl Into<String>, kind: DatasetKind) -> Self {
        self.datasets.insert(id.into(), kind);
        self
    }

    pub fn with_headers(mut self, headers: &[Header]) -> Self {
        for header in headers {
            self.datasets.insert(header.id.clone(), header.kind);
        }
        self
    }

    pub fn validate(&self, query: &Value) -> ValidationResult<Query> {
        let root = query.as_object().ok_or(ValidationError::InvalidQuery)?;
        let where_clause = root.get("WHERE").ok_or(ValidationError::MissingClause("WHERE"))?;
        let options = root.get("OPTIONS").ok_or(ValidationError::MissingClause("OPTIONS"))?;
        if root
            .keys()
            .any(|key| !matches!(key.as_str(), "WHERE" | "OPTIONS" | "TRANSFORMATIONS"))
        {
            return Err(ValidationError::ExcessKeys);
        }

        let mut ctx = ValidationContext::default();

        let filter = self.validate_where(where_clause, &mut ctx)?;
        let (columns, order) = self.validate_options(options, &mut ctx)?;
        let transformations = match root.get("TRANSFORMATIONS") {
            Some(value) => Some(self.validate_transformations(value, &mut ctx)?),
            None => None,
        };
        check_columns(&columns, transformations.as_ref())?;

        let (dataset_id, kind) = ctx.finish()?;
        let stored = *self
            .datasets
            .get(&dataset_id)
            .ok_or_else(|| ValidationError::UnknownDataset(dataset_id.clone()))?;
        if stored != kind {
            return Err(ValidationError::KindMismatch { used: kind, stored });
        }

        Ok(Query {
            dataset_id,
            kind,
            filter,
            columns,
            order,
            transformations,
        })
    }

    fn validate_where(
        &self,
        value: &Value,
        ctx: &mut ValidationContext,
    ) -> ValidationResult<Filter> {
        let clause = value.as_object().ok_or_else(|| malformed("WHERE must be object"))?;
        match clause.len() {
            0 => Ok(Filter::All),
            1 => self.validate_filter(value, ctx),
            n => Err(malformed(format!("WHERE should only have 1 key, has {}", n))),
        }
    }

    fn validate_filter(
        &self,
        value: &Value,
        ctx: &mut ValidationContext,
    ) -> ValidationResult<Filter> {
        // A node with no key at all names no filter
        match value.as_object() {
            Some(node) if !node.is_empty() => {}
            _ => return Err(malformed("Invalid filter key: undefined")),
        }
        let (key, body) = single_entry("Filter", value)?;

        match key.as_str() {
            "AND" | "OR" => {
                let children = body
                    .as_array()
                    .filter(|children| !children.is_empty())
                    .ok_or_else(|| malformed(format!("{} must be a non-empty array", key)))?
                    .iter()
                    .map(|child| self.validate_filter(child, ctx))
                    .collect::<ValidationResult<Vec<_>>>()?;
                Ok(if key == "AND" {
                    Filter::And(children)
                } else {
                    Filter::Or(children)
                })
            }
            "LT" | "GT" | "EQ" => {
                let (qkey, literal) = single_entry(key, body)?;
                let bound = literal.as_f64().ok_or_else(|| {
                    malformed(format!("Invalid value type in {}, should be number", key))
                })?;
                let field = validate_key(key, qkey, Some(FieldType::Numeric), ctx)?.field;
                Ok(Filter::Compare(match key.as_str() {
                    "LT" => Comparison::Lt(field, bound),
                    "GT" => Comparison::Gt(field, bound),
                    _ => Comparison::Eq(field, bound),
                }))
            }
            "IS" => {
                let (qkey, literal) = single_entry(key, body)?;
                let field = validate_key(key, qkey, Some(FieldType::Text), ctx)?.field;
                let literal = literal
                    .as_str()
                    .ok_or_else(|| malformed("Invalid value type in IS, should be string"))?;
                let pattern = Pattern::parse(literal).ok_or(ValidationError::InvalidWildcard)?;
                Ok(Filter::Compare(Comparison::Is(field, pattern)))
            }
            "NOT" => {
                single_entry(key, body)?;
                let child = self.validate_filter(body, ctx)?;
                Ok(Filter::Not(Box::new(child)))
            }
            other => Err(malformed(format!("Invalid filter key: {}", other))),
        }
    }

    fn validate_options(
        &self,
        value: &Value,
        ctx: &mut ValidationContext,
    ) -> ValidationResult<(Vec<Column>, Option<Order>)> {
        let options = value.as_object().ok_or_else(|| malformed("OPTIONS must be object"))?;
        let raw_columns = options
            .get("COLUMNS")
            .ok_or_else(|| malformed("OPTIONS missing COLUMNS"))?
            .as_array()
            .filter(|columns| !columns.is_empty())
            .ok_or_else(|| malformed("COLUMNS must be a non-empty array"))?;

        let mut columns = Vec::with_capacity(raw_columns.len());
        for raw in raw_columns {
            let key = raw.as_str().ok_or(ValidationError::InvalidQuery)?;
            if key.contains('_') {
                columns.push(Column::Field(validate_key("COLUMNS", key, None, ctx)?));
            } else {
                columns.push(Column::Alias(key.to_string()));
            }
        }

        if options.keys().any(|key| key != "COLUMNS" && key != "ORDER") {
            return Err(malformed("Invalid keys in OPTIONS"));
        }

        let order = match options.get("ORDER") {
            Some(order) => Some(validate_order(order, &columns, ctx)?),
            None => None,
        };

        Ok((columns, order))
    }

    fn validate_transformations(
        &self,
        value: &Value,
        ctx: &mut ValidationContext,
    ) -> ValidationResult<Transformations> {
        let transformations = value.as_object().ok_or(ValidationError::InvalidQuery)?;
        let group = transformations
            .get("GROUP")
            .ok_or_else(|| malformed("TRANSFORMATIONS missing GROUP"))?;
        let apply = transformations
            .get("APPLY")
            .ok_or_else(|| malformed("TRANSFORMATIONS missing APPLY"))?;
        if transformations.len() > 2 {
            return Err(malformed("Extra keys in TRANSFORMATIONS"));
        }

        let group = group
            .as_array()
            .filter(|group| !group.is_empty())
            .ok_or_else(|| malformed("GROUP must be a non-empty array"))?
            .iter()
            .map(|key| match key.as_str() {
                Some(key) => validate_key("GROUP", key, None, ctx),
                None => Err(invalid_key(&key.to_string(), "GROUP")),
            })
            .collect::<ValidationResult<Vec<_>>>()?;

        let rules = apply
            .as_array()
            .ok_or_else(|| malformed("APPLY must be an array"))?;
        let mut apply = Vec::with_capacity(rules.len());
        for rule in rules {
            let rule = validate_apply_rule(rule, &apply, ctx)?;
            apply.push(rule);
        }

        Ok(Transformations { group, apply })
    }
}

/// Unwraps an object that must hold exactly one entry
fn single_entry<'v>(name: &str, value: &'v Value) -> ValidationResult<(&'v String, &'v Value)> {
    let object: &Map<String, Value> = value
        .as_object()
        .ok_or_else(|| malformed(format!("{} must be object", name)))?;
    if object.len() != 1 {
        return Err(malformed(format!(
            "{} should only have 1 key, has {}",
            name,
            object.len()
        )));
    }
    object
        .iter()
        .next()
        .ok_or_else(|| malformed(format!("{} must be object", name)))
}

/// Resolves a `<datasetId>_<field>` reference and records it in the context
fn validate_key(
    context: &str,
    key: &str,
    required: Option<FieldType>,
    ctx: &mut ValidationContext,
) -> ValidationResult<FieldRef> {
    let (dataset_id, name) = key
        .split_once('_')
        .filter(|(id, name)| !id.is_empty() && !name.is_empty() && !name.contains('_'))
        .ok_or_else(|| invalid_key(key, context))?;
    let field = Field::parse(name).ok_or_else(|| invalid_key(key, context))?;

    ctx.record(key, context, dataset_id, field.kind())?;

    if let Some(required) = required {
        if field.field_type() != required {
            return Err(ValidationError::InvalidKeyType(context.to_string()));
        }
    }

    Ok(FieldRef {
        key: key.to_string(),
        dataset_id: dataset_id.to_string(),
        field,
    })
}

fn validate_order(
    value: &Value,
    columns: &[Column],
    ctx: &mut ValidationContext,
) -> ValidationResult<Order> {
    let in_columns = |key: &str| columns.iter().any(|column| column.key() == key);

    match value {
        Value::String(key) => {
            if key.contains('_') {
                validate_key("ORDER", key, None, ctx)?;
            }
            if !in_columns(key) {
                return Err(malformed("ORDER key must be in COLUMNS"));
            }
            Ok(Order {
                direction: Direction::Up,
                keys: vec![key.clone()],
            })
        }
        Value::Object(order) => {
            let direction = match order.get("dir") {
                None => return Err(malformed("ORDER missing 'dir' key")),
                Some(Value::String(dir)) if dir == "UP" => Direction::Up,
                Some(Value::String(dir)) if dir == "DOWN" => Direction::Down,
                Some(_) => return Err(malformed("Invalid ORDER direction")),
            };
            let keys = order
                .get("keys")
                .ok_or_else(|| malformed("ORDER missing 'keys' key"))?
                .as_array()
                .filter(|keys| !keys.is_empty())
                .ok_or_else(|| malformed("ORDER keys must be a non-empty array"))?;
            if order.len() > 2 {
                return Err(malformed("Invalid keys in ORDER"));
            }

            let keys = keys
                .iter()
                .map(|key| match key.as_str() {
                    Some(key) if in_columns(key) => Ok(key.to_string()),
                    _ => Err(malformed("All ORDER keys must be in COLUMNS")),
                })
                .collect::<ValidationResult<Vec<_>>>()?;

            Ok(Order { direction, keys })
        }
        _ => Err(malformed("Invalid ORDER type")),
    }
}

fn validate_apply_rule(
    rule: &Value,
    existing: &[ApplyRule],
    ctx: &mut ValidationContext,
) -> ValidationResult<ApplyRule> {
    let rule = rule.as_object().ok_or(ValidationError::InvalidQuery)?;
    if rule.len() != 1 {
        return Err(malformed(format!(
            "Apply rule should only have 1 key, has {}",
            rule.len()
        )));
    }
    let (alias, body) = rule.iter().next().ok_or(ValidationError::InvalidQuery)?;
    if existing.iter().any(|rule| &rule.alias == alias) {
        return Err(ValidationError::DuplicateApplyKey(alias.clone()));
    }

    let body = body.as_object().ok_or(ValidationError::InvalidQuery)?;
    if body.len() != 1 {
        return Err(malformed(format!(
            "Apply body should only have 1 key, has {}",
            body.len()
        )));
    }
    let (token_name, target) = body.iter().next().ok_or(ValidationError::InvalidQuery)?;

    if alias.is_empty() || alias.contains('_') {
        return Err(malformed("Cannot have underscore in applyKey"));
    }
    let token =
        ApplyToken::parse(token_name).ok_or_else(|| malformed("Invalid transformation operator"))?;

    let target = target
        .as_str()
        .ok_or_else(|| invalid_key(&target.to_string(), token_name))?;
    let required = token.requires_numeric().then_some(FieldType::Numeric);
    let field = validate_key(token_name, target, required, ctx)?.field;

    Ok(ApplyRule {
        alias: alias.clone(),
        token,
        field,
    })
}

/// Under TRANSFORMATIONS every column must be a GROUP key or an APPLY alias;
/// without it, every column must be a field reference.
fn check_columns(
    columns: &[Column],
    transformations: Option<&Transformations>,
) -> ValidationResult<()> {
    for column in columns {
        match (column, transformations) {
            (Column::Alias(alias), None) => return Err(invalid_key(alias, "COLUMNS")),
            (Column::Field(_), None) => {}
            (Column::Field(field_ref), Some(t)) => {
                if !t.group.iter().any(|group| group.key == field_ref.key) {
                    return Err(ValidationError::UngroupedColumn(field_ref.key.clone()));
                }
            }
            (Column::Alias(alias), Some(t)) => {
                if !t.apply.iter().any(|rule| &rule.alias == alias) {
                    return Err(ValidationError::UngroupedColumn(alias.clone()));
                }
            }
        }
    }
    Ok(())
}
