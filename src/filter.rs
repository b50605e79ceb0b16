use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ReportError;
use crate::records::{lenient_f64, parse_date_only, parse_datetime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Enum(&'static [&'static str]),
    Number,
    Date,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Enum(_) => "enum",
            FieldKind::Number => "numberRange",
            FieldKind::Date => "dateRange",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Field accessors the filter engine reads through. A `None` means the value is
/// missing or malformed on this record.
pub trait Filterable {
    fn text_field(&self, field: &str) -> Option<String>;
    fn number_field(&self, field: &str) -> Option<f64>;
    fn date_field(&self, field: &str) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Predicate {
    /// Needle is stored lower-cased.
    Contains { value: String },
    Equals { value: String },
    Range { min: Option<f64>, max: Option<f64> },
    DateRange {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

impl Predicate {
    pub fn contains(needle: &str) -> Self {
        Predicate::Contains {
            value: needle.to_lowercase(),
        }
    }

    pub fn equals(value: &str) -> Self {
        Predicate::Equals {
            value: value.to_string(),
        }
    }

    fn matches<R: Filterable>(&self, field: &str, record: &R) -> bool {
        match self {
            Predicate::Contains { value } => record
                .text_field(field)
                .unwrap_or_default()
                .to_lowercase()
                .contains(value.as_str()),
            Predicate::Equals { value } => record
                .text_field(field)
                .map(|v| v.eq_ignore_ascii_case(value))
                .unwrap_or(false),
            Predicate::Range { min, max } => {
                let Some(v) = record.number_field(field).filter(|v| v.is_finite()) else {
                    return false;
                };
                min.map(|m| v >= m).unwrap_or(true) && max.map(|m| v <= m).unwrap_or(true)
            }
            Predicate::DateRange { start, end } => {
                let Some(d) = record.date_field(field) else {
                    return false;
                };
                start.map(|s| d >= s).unwrap_or(true) && end.map(|e| d <= e).unwrap_or(true)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clause {
    pub field: String,
    #[serde(flatten)]
    pub predicate: Predicate,
}

/// Conjunction of per-field predicates. Empty means "match everything".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterSpec {
    clauses: Vec<Clause>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, predicate: Predicate) -> Self {
        self.clauses.push(Clause {
            field: field.to_string(),
            predicate,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches<R: Filterable>(&self, record: &R) -> bool {
        self.clauses
            .iter()
            .all(|c| c.predicate.matches(&c.field, record))
    }
}

/// Returns the records that satisfy every clause, in source order.
pub fn filter<R: Filterable + Clone>(records: &[R], spec: &FilterSpec) -> Vec<R> {
    if spec.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| spec.matches(*r))
        .cloned()
        .collect()
}

/// Builds a `FilterSpec` from the dashboard's filter form values.
///
/// `null`, missing and empty-string values are "no constraint". Unknown fields
/// and values of the wrong shape are rejected here so that `filter` itself
/// never has to fail.
pub fn parse_filter_spec(
    raw: Option<&Value>,
    schema: &[FieldDef],
) -> Result<FilterSpec, ReportError> {
    let Some(raw) = raw else {
        return Ok(FilterSpec::new());
    };
    if raw.is_null() {
        return Ok(FilterSpec::new());
    }
    let Some(obj) = raw.as_object() else {
        return Err(ReportError::bad_params("filters must be an object"));
    };

    let mut spec = FilterSpec::new();
    for (key, value) in obj {
        let Some(def) = schema.iter().find(|d| d.name == key) else {
            let allowed: Vec<&str> = schema.iter().map(|d| d.name).collect();
            return Err(
                ReportError::bad_params(format!("unknown filter field: {}", key))
                    .with_details(json!({ "allowed": allowed })),
            );
        };
        if value.is_null() {
            continue;
        }
        if let Some(predicate) = parse_predicate(def, value)? {
            spec = spec.with(def.name, predicate);
        }
    }
    Ok(spec)
}

fn parse_predicate(def: &FieldDef, value: &Value) -> Result<Option<Predicate>, ReportError> {
    match def.kind {
        FieldKind::Text => {
            let Some(s) = value.as_str() else {
                return Err(ReportError::bad_params(format!(
                    "filters.{} must be a string",
                    def.name
                )));
            };
            let t = s.trim();
            Ok((!t.is_empty()).then(|| Predicate::contains(t)))
        }
        FieldKind::Enum(allowed) => {
            let Some(s) = value.as_str() else {
                return Err(ReportError::bad_params(format!(
                    "filters.{} must be a string",
                    def.name
                )));
            };
            let t = s.trim().to_ascii_lowercase();
            if t.is_empty() || t == "all" {
                return Ok(None);
            }
            if !allowed.contains(&t.as_str()) {
                return Err(ReportError::bad_params(format!(
                    "filters.{} must be one of: {}",
                    def.name,
                    allowed.join(", ")
                )));
            }
            Ok(Some(Predicate::equals(&t)))
        }
        FieldKind::Number => {
            let Some(obj) = value.as_object() else {
                return Err(ReportError::bad_params(format!(
                    "filters.{} must be an object with min/max",
                    def.name
                )));
            };
            let min = range_bound(obj.get("min"), def.name, "min")?;
            let max = range_bound(obj.get("max"), def.name, "max")?;
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    return Err(ReportError::bad_params(format!(
                        "filters.{}.min must be <= filters.{}.max",
                        def.name, def.name
                    )));
                }
            }
            if min.is_none() && max.is_none() {
                return Ok(None);
            }
            Ok(Some(Predicate::Range { min, max }))
        }
        FieldKind::Date => {
            let Some(obj) = value.as_object() else {
                return Err(ReportError::bad_params(format!(
                    "filters.{} must be an object with start/end",
                    def.name
                )));
            };
            let start = date_bound(obj.get("start"), def.name, "start", false)?;
            let end = date_bound(obj.get("end"), def.name, "end", true)?;
            if let (Some(s), Some(e)) = (start, end) {
                if s > e {
                    return Err(ReportError::bad_params(format!(
                        "filters.{}.start must be <= filters.{}.end",
                        def.name, def.name
                    )));
                }
            }
            if start.is_none() && end.is_none() {
                return Ok(None);
            }
            Ok(Some(Predicate::DateRange { start, end }))
        }
    }
}

fn is_blank(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

fn range_bound(v: Option<&Value>, field: &str, side: &str) -> Result<Option<f64>, ReportError> {
    if is_blank(v) {
        return Ok(None);
    }
    v.and_then(lenient_f64).map(Some).ok_or_else(|| {
        ReportError::bad_params(format!("filters.{}.{} must be a number", field, side))
    })
}

// A date-only upper bound covers the whole day.
fn date_bound(
    v: Option<&Value>,
    field: &str,
    side: &str,
    end_of_day: bool,
) -> Result<Option<DateTime<Utc>>, ReportError> {
    if is_blank(v) {
        return Ok(None);
    }
    let bad = || ReportError::bad_params(format!("filters.{}.{} must be an ISO date", field, side));
    let s = v.and_then(|x| x.as_str()).ok_or_else(bad)?;
    if end_of_day {
        if let Some(day) = parse_date_only(s) {
            let next = day.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)).ok_or_else(bad)?;
            return Ok(Some(next.and_utc() - Duration::milliseconds(1)));
        }
    }
    parse_datetime(s).map(Some).ok_or_else(bad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        name: Option<String>,
        status: &'static str,
        score: Option<f64>,
        at: Option<DateTime<Utc>>,
    }

    impl Filterable for Row {
        fn text_field(&self, field: &str) -> Option<String> {
            match field {
                "name" => self.name.clone(),
                "status" => Some(self.status.to_string()),
                _ => None,
            }
        }
        fn number_field(&self, field: &str) -> Option<f64> {
            (field == "score").then_some(self.score).flatten()
        }
        fn date_field(&self, field: &str) -> Option<DateTime<Utc>> {
            (field == "at").then_some(self.at).flatten()
        }
    }

    const SCHEMA: &[FieldDef] = &[
        FieldDef { name: "name", kind: FieldKind::Text },
        FieldDef { name: "status", kind: FieldKind::Enum(&["active", "inactive"]) },
        FieldDef { name: "score", kind: FieldKind::Number },
        FieldDef { name: "at", kind: FieldKind::Date },
    ];

    fn row(name: Option<&str>, status: &'static str, score: Option<f64>, at: &str) -> Row {
        Row {
            name: name.map(|s| s.to_string()),
            status,
            score,
            at: parse_datetime(at),
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            row(Some("Anna Lee"), "active", Some(90.0), "2024-01-01T09:00:00Z"),
            row(Some("Bob Smith"), "inactive", Some(40.0), "2024-01-02T18:30:00Z"),
            row(None, "active", None, "not a date"),
            row(Some("Hannah Ng"), "active", Some(75.0), "2024-01-31T23:00:00Z"),
        ]
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let spec = FilterSpec::new().with("name", Predicate::contains("ANN"));
        let out = filter(&rows(), &spec);
        let names: Vec<_> = out.iter().map(|r| r.name.clone().unwrap_or_default()).collect();
        assert_eq!(names, vec!["Anna Lee", "Hannah Ng"]);
    }

    #[test]
    fn missing_reference_never_matches_a_needle_but_never_errors() {
        let spec = FilterSpec::new().with("name", Predicate::contains("a"));
        let out = filter(&rows(), &spec);
        assert!(out.iter().all(|r| r.name.is_some()));
    }

    #[test]
    fn empty_spec_is_identity() {
        let src = rows();
        assert_eq!(filter(&src, &FilterSpec::new()), src);

        let all = parse_filter_spec(Some(&json!({ "status": "all", "name": "" })), SCHEMA)
            .expect("parse");
        assert!(all.is_empty());
        assert_eq!(filter(&src, &all), src);
    }

    #[test]
    fn filtering_is_idempotent() {
        let raw = json!({
            "name": "a",
            "status": "active",
            "score": { "min": 50 },
            "at": { "start": "2024-01-01", "end": "2024-01-31" }
        });
        let spec = parse_filter_spec(Some(&raw), SCHEMA).expect("parse");
        let once = filter(&rows(), &spec);
        let twice = filter(&once, &spec);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn numeric_range_is_inclusive_and_skips_missing() {
        let spec = FilterSpec::new().with(
            "score",
            Predicate::Range {
                min: Some(40.0),
                max: Some(75.0),
            },
        );
        let out = filter(&rows(), &spec);
        let scores: Vec<_> = out.iter().filter_map(|r| r.score).collect();
        assert_eq!(scores, vec![40.0, 75.0]);
    }

    #[test]
    fn date_only_end_covers_the_whole_day() {
        let raw = json!({ "at": { "end": "2024-01-02" } });
        let spec = parse_filter_spec(Some(&raw), SCHEMA).expect("parse");
        let out = filter(&rows(), &spec);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn blank_values_are_no_constraint() {
        let raw = json!({
            "name": "  ",
            "status": "",
            "score": { "min": "", "max": null },
            "at": { "start": null }
        });
        let spec = parse_filter_spec(Some(&raw), SCHEMA).expect("parse");
        assert!(spec.is_empty());
        let all = json!({ "status": "ALL" });
        assert!(parse_filter_spec(Some(&all), SCHEMA).expect("parse").is_empty());
    }

    #[test]
    fn bad_shapes_are_rejected_at_parse_time() {
        for raw in [
            json!([1, 2]),
            json!({ "nope": "x" }),
            json!({ "status": "archived" }),
            json!({ "score": 5 }),
            json!({ "score": { "min": 10, "max": 1 } }),
            json!({ "at": { "start": "soon" } }),
        ] {
            let e = parse_filter_spec(Some(&raw), SCHEMA).expect_err("should fail");
            assert_eq!(e.code, "bad_params");
        }
    }
}
