//! WHERE clause evaluation

use crate::query::ast::{Comparison, Filter};
use crate::storage::record::{Field, Record};

impl Filter {
    /// Evaluates the filter against a single record
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::All => true,
            Filter::And(children) => children.iter().all(|child| child.matches(record)),
            Filter::Or(children) => children.iter().any(|child| child.matches(record)),
            Filter::Not(child) => !child.matches(record),
            Filter::Compare(comparison) => comparison.matches(record),
        }
    }

    /// Returns the records the filter selects, in dataset order
    pub fn select<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        records.iter().filter(|record| self.matches(record)).collect()
    }
}

impl Comparison {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Comparison::Lt(field, bound) => numeric(record, *field).is_some_and(|v| v < *bound),
            Comparison::Gt(field, bound) => numeric(record, *field).is_some_and(|v| v > *bound),
            Comparison::Eq(field, bound) => numeric(record, *field).is_some_and(|v| v == *bound),
            Comparison::Is(field, pattern) => record
                .get(*field)
                .and_then(|value| value.as_text().map(|text| pattern.matches(text)))
                .unwrap_or(false),
        }
    }
}

fn numeric(record: &Record, field: Field) -> Option<f64> {
    record.get(field).and_then(|value| value.as_number())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::Pattern;
    use crate::storage::record::{RoomField, SectionField};
    use crate::test_support::{room, section};

    const AVG: Field = Field::Section(SectionField::Avg);
    const DEPT: Field = Field::Section(SectionField::Dept);

    fn records() -> Vec<Record> {
        vec![
            section("cpsc", "310", "holmes", 2015.0, 95.0),
            section("math", "100", "noether", 2016.0, 60.0),
            section("cpsc", "110", "kiczales", 2014.0, 85.0),
            section("phys", "101", "curie", 2015.0, 90.0),
        ]
    }

    fn is(field: Field, pattern: &str) -> Filter {
        Filter::Compare(Comparison::Is(field, Pattern::parse(pattern).unwrap()))
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let records = records();
        assert_eq!(Filter::All.select(&records).len(), records.len());
    }

    #[test]
    fn test_numeric_comparisons() {
        let records = records();
        assert_eq!(Filter::Compare(Comparison::Gt(AVG, 90.0)).select(&records).len(), 1);
        assert_eq!(Filter::Compare(Comparison::Lt(AVG, 90.0)).select(&records).len(), 2);
        assert_eq!(Filter::Compare(Comparison::Eq(AVG, 90.0)).select(&records).len(), 1);
    }

    #[test]
    fn test_logic() {
        let records = records();
        let cpsc = is(DEPT, "cpsc");
        let high = Filter::Compare(Comparison::Gt(AVG, 86.0));

        let both = Filter::And(vec![cpsc.clone(), high.clone()]);
        let selected = both.select(&records);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0], &records[0]);

        let either = Filter::Or(vec![cpsc.clone(), high.clone()]);
        assert_eq!(either.select(&records).len(), 3);

        let not_cpsc = Filter::Not(Box::new(cpsc.clone()));
        assert_eq!(not_cpsc.select(&records).len(), 2);
    }

    #[test]
    fn test_double_negation_is_identity() {
        let records = records();
        let filters = vec![
            is(DEPT, "*s*"),
            Filter::Compare(Comparison::Lt(AVG, 88.0)),
            Filter::Or(vec![is(DEPT, "math"), Filter::Compare(Comparison::Eq(AVG, 95.0))]),
            Filter::All,
        ];
        for filter in filters {
            let doubled = Filter::Not(Box::new(Filter::Not(Box::new(filter.clone()))));
            for record in &records {
                assert_eq!(doubled.matches(record), filter.matches(record));
            }
        }
    }

    #[test]
    fn test_wildcards() {
        let records = records();
        assert_eq!(is(DEPT, "*p*").select(&records).len(), 3);
        assert_eq!(is(DEPT, "cp*").select(&records).len(), 2);
        assert_eq!(is(DEPT, "*th").select(&records).len(), 1);
        assert_eq!(is(DEPT, "cps").select(&records).len(), 0);
    }

    #[test]
    fn test_field_of_other_kind_never_matches() {
        let rooms = vec![room("DMP", "110", 120.0, "Tables")];
        let seats = Field::Room(RoomField::Seats);
        assert!(Filter::Compare(Comparison::Gt(seats, 100.0)).matches(&rooms[0]));
        assert!(!Filter::Compare(Comparison::Gt(AVG, 0.0)).matches(&rooms[0]));
        assert!(!is(DEPT, "*").matches(&rooms[0]));
    }
}
