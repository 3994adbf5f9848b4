use crate::storage::record::{DatasetKind, Field};

/// A field reference as written in a query, e.g. `sections_avg`
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    /// The wire key, kept verbatim for output rows
    pub key: String,
    pub dataset_id: String,
    pub field: Field,
}

/// IS patterns. Interior asterisks are rejected during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl Pattern {
    /// Builds a pattern from an IS literal. Returns `None` if an asterisk
    /// appears anywhere other than the first or last character.
    pub fn parse(input: &str) -> Option<Pattern> {
        if input == "*" {
            return Some(Pattern::Contains(String::new()));
        }

        let leading = input.starts_with('*');
        let trailing = input.len() > 1 && input.ends_with('*');
        let start = usize::from(leading);
        let end = input.len() - usize::from(trailing);
        let inner = &input[start..end];
        if inner.contains('*') {
            return None;
        }

        let inner = inner.to_string();
        Some(match (leading, trailing) {
            (true, true) => Pattern::Contains(inner),
            (true, false) => Pattern::Suffix(inner),
            (false, true) => Pattern::Prefix(inner),
            (false, false) => Pattern::Exact(inner),
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Exact(s) => value == s,
            Pattern::Prefix(s) => value.starts_with(s.as_str()),
            Pattern::Suffix(s) => value.ends_with(s.as_str()),
            Pattern::Contains(s) => value.contains(s.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Lt(Field, f64),
    Gt(Field, f64),
    Eq(Field, f64),
    Is(Field, Pattern),
}

/// A validated WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// The empty WHERE object
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Compare(Comparison),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyToken {
    Max,
    Min,
    Avg,
    Sum,
    Count,
}

impl ApplyToken {
    pub fn parse(token: &str) -> Option<ApplyToken> {
        match token {
            "MAX" => Some(ApplyToken::Max),
            "MIN" => Some(ApplyToken::Min),
            "AVG" => Some(ApplyToken::Avg),
            "SUM" => Some(ApplyToken::Sum),
            "COUNT" => Some(ApplyToken::Count),
            _ => None,
        }
    }

    /// COUNT works on any field; every other token needs a numeric one
    pub fn requires_numeric(&self) -> bool {
        !matches!(self, ApplyToken::Count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRule {
    pub alias: String,
    pub token: ApplyToken,
    pub field: Field,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformations {
    pub group: Vec<FieldRef>,
    pub apply: Vec<ApplyRule>,
}

/// An output column: a dataset field or, under TRANSFORMATIONS, an APPLY alias
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Field(FieldRef),
    Alias(String),
}

impl Column {
    /// The key this column has in output rows
    pub fn key(&self) -> &str {
        match self {
            Column::Field(field_ref) => &field_ref.key,
            Column::Alias(alias) => alias,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub direction: Direction,
    /// Column keys, most significant first
    pub keys: Vec<String>,
}

/// A query that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub dataset_id: String,
    pub kind: DatasetKind,
    pub filter: Filter,
    pub columns: Vec<Column>,
    pub order: Option<Order>,
    pub transformations: Option<Transformations>,
}
