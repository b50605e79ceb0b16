use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::cmp::Ordering;

use crate::aggregate::{count_by, mean_by, sum_by};
use crate::derived::format_percent;
use crate::error::ReportError;
use crate::export::{CellValue, Column, ColumnSpec, HEADER_FILL};
use crate::filter::{filter, FieldDef, FieldKind, FilterSpec, Filterable};
use crate::records::{
    day_key, QuizAttempt, Subscription, SubscriptionStatus, DISPLAY_FALLBACK, GROUP_FALLBACK,
};
use crate::series::{to_series, Series};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartType {
    Pie,
    Bar,
    Line,
}

#[derive(Debug, Clone, Copy)]
pub struct ChartDef {
    pub name: &'static str,
    pub chart_type: ChartType,
    pub chronological: bool,
}

/// Everything a report type declares once: labels, filterable and sortable
/// fields, columns and charts.
pub trait ReportRecord: Filterable + Clone {
    const TITLE: &'static str;
    const SHEET_NAME: &'static str;
    const FILE_STEM: &'static str;
    const FILTERS: &'static [FieldDef];
    const SORT_FIELDS: &'static [FieldDef];
    const CHARTS: &'static [ChartDef];

    fn columns() -> ColumnSpec<Self>;

    /// Grouped series for one of `CHARTS`, in chart order.
    fn chart(def: &ChartDef, records: &[Self]) -> Series;

    fn summary(records: &[Self]) -> Value;

    /// The normalized record with derived fields resolved.
    fn to_json(&self) -> Value;
}

pub fn find_chart<R: ReportRecord>(name: &str) -> Option<&'static ChartDef> {
    R::CHARTS.iter().find(|c| c.name == name)
}

fn or_display(v: Option<&str>) -> String {
    v.unwrap_or(DISPLAY_FALLBACK).to_string()
}

fn or_group(v: Option<&str>) -> String {
    v.unwrap_or(GROUP_FALLBACK).to_string()
}

fn day_group(dt: Option<&DateTime<Utc>>) -> String {
    day_key(dt).unwrap_or_else(|| GROUP_FALLBACK.to_string())
}

fn finite_or_zero(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

const SUBSCRIPTION_STATUSES: &[&str] = &["active", "inactive"];

impl Filterable for Subscription {
    fn text_field(&self, field: &str) -> Option<String> {
        match field {
            "studentName" => self.student_name().map(str::to_string),
            "email" => self.student_email().map(str::to_string),
            "classSubject" => self.class_subject().map(str::to_string),
            "status" => Some(self.status.as_str().to_string()),
            _ => None,
        }
    }

    fn number_field(&self, field: &str) -> Option<f64> {
        match field {
            "feePaid" => self.fee_paid,
            _ => None,
        }
    }

    fn date_field(&self, field: &str) -> Option<DateTime<Utc>> {
        match field {
            "createdAt" => self.created_at,
            _ => None,
        }
    }
}

impl ReportRecord for Subscription {
    const TITLE: &'static str = "Subscription Report";
    const SHEET_NAME: &'static str = "Subscriptions";
    const FILE_STEM: &'static str = "subscriptions";
    const FILTERS: &'static [FieldDef] = &[
        FieldDef { name: "studentName", kind: FieldKind::Text },
        FieldDef { name: "classSubject", kind: FieldKind::Text },
        FieldDef { name: "status", kind: FieldKind::Enum(SUBSCRIPTION_STATUSES) },
        FieldDef { name: "feePaid", kind: FieldKind::Number },
        FieldDef { name: "createdAt", kind: FieldKind::Date },
    ];
    const SORT_FIELDS: &'static [FieldDef] = &[
        FieldDef { name: "studentName", kind: FieldKind::Text },
        FieldDef { name: "classSubject", kind: FieldKind::Text },
        FieldDef { name: "status", kind: FieldKind::Enum(SUBSCRIPTION_STATUSES) },
        FieldDef { name: "feePaid", kind: FieldKind::Number },
        FieldDef { name: "createdAt", kind: FieldKind::Date },
    ];
    const CHARTS: &'static [ChartDef] = &[
        ChartDef { name: "subscriptionsByClass", chart_type: ChartType::Pie, chronological: false },
        ChartDef { name: "subscriptionsByStatus", chart_type: ChartType::Pie, chronological: false },
        ChartDef { name: "revenueByClass", chart_type: ChartType::Bar, chronological: false },
        ChartDef { name: "revenueByDate", chart_type: ChartType::Line, chronological: true },
    ];

    fn columns() -> ColumnSpec<Self> {
        ColumnSpec::new(vec![
            Column {
                header: "Student Name",
                extract: |s| CellValue::Text(or_display(s.student_name())),
            },
            Column {
                header: "Email",
                extract: |s| CellValue::Text(or_display(s.student_email())),
            },
            Column {
                header: "Class Subject",
                extract: |s| CellValue::Text(or_display(s.class_subject())),
            },
            Column {
                header: "Fee Paid",
                extract: |s| CellValue::Number(finite_or_zero(s.fee_paid)),
            },
            Column {
                header: "Status",
                extract: |s| {
                    CellValue::text(match s.status {
                        SubscriptionStatus::Unknown => DISPLAY_FALLBACK,
                        other => other.label(),
                    })
                },
            },
            Column {
                header: "Subscribed On",
                extract: |s| {
                    CellValue::Text(
                        day_key(s.created_at.as_ref())
                            .unwrap_or_else(|| DISPLAY_FALLBACK.to_string()),
                    )
                },
            },
        ])
    }

    fn chart(def: &ChartDef, records: &[Self]) -> Series {
        let subject = |s: &Subscription| or_group(s.class_subject());
        match def.name {
            "subscriptionsByStatus" => to_series(
                &count_by(records, |s| s.status.label().to_string()),
                def.chronological,
            ),
            "revenueByClass" => to_series(&sum_by(records, subject, |s| s.fee_paid), def.chronological),
            "revenueByDate" => to_series(
                &sum_by(records, |s| day_group(s.created_at.as_ref()), |s| s.fee_paid),
                def.chronological,
            ),
            _ => to_series(&count_by(records, subject), def.chronological),
        }
    }

    fn summary(records: &[Self]) -> Value {
        let active = records
            .iter()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .count();
        let inactive = records
            .iter()
            .filter(|s| s.status == SubscriptionStatus::Inactive)
            .count();
        let revenue: f64 = records.iter().map(|s| finite_or_zero(s.fee_paid)).sum();
        json!({
            "totalSubscriptions": records.len(),
            "activeCount": active,
            "inactiveCount": inactive,
            "totalRevenue": revenue,
        })
    }

    fn to_json(&self) -> Value {
        json!(self)
    }
}

impl Filterable for QuizAttempt {
    fn text_field(&self, field: &str) -> Option<String> {
        match field {
            "studentName" => self.student_name().map(str::to_string),
            "subject" => self.subject().map(str::to_string),
            "lessonName" => self.lesson_name().map(str::to_string),
            _ => None,
        }
    }

    fn number_field(&self, field: &str) -> Option<f64> {
        match field {
            "percentage" => Some(self.percentage()),
            "marks" => self.marks,
            "totalMarks" => self.total_marks,
            _ => None,
        }
    }

    fn date_field(&self, field: &str) -> Option<DateTime<Utc>> {
        match field {
            "attemptedAt" => self.attempted_at,
            _ => None,
        }
    }
}

impl ReportRecord for QuizAttempt {
    const TITLE: &'static str = "Quiz Attempts Report";
    const SHEET_NAME: &'static str = "Quiz Attempts";
    const FILE_STEM: &'static str = "quiz-attempts";
    const FILTERS: &'static [FieldDef] = &[
        FieldDef { name: "studentName", kind: FieldKind::Text },
        FieldDef { name: "subject", kind: FieldKind::Text },
        FieldDef { name: "lessonName", kind: FieldKind::Text },
        FieldDef { name: "percentage", kind: FieldKind::Number },
        FieldDef { name: "attemptedAt", kind: FieldKind::Date },
    ];
    const SORT_FIELDS: &'static [FieldDef] = &[
        FieldDef { name: "studentName", kind: FieldKind::Text },
        FieldDef { name: "subject", kind: FieldKind::Text },
        FieldDef { name: "lessonName", kind: FieldKind::Text },
        FieldDef { name: "marks", kind: FieldKind::Number },
        FieldDef { name: "percentage", kind: FieldKind::Number },
        FieldDef { name: "attemptedAt", kind: FieldKind::Date },
    ];
    const CHARTS: &'static [ChartDef] = &[
        ChartDef { name: "attemptsBySubject", chart_type: ChartType::Pie, chronological: false },
        ChartDef { name: "attemptsByDate", chart_type: ChartType::Line, chronological: true },
        ChartDef { name: "averagePercentageBySubject", chart_type: ChartType::Bar, chronological: false },
        ChartDef { name: "averagePercentageByDate", chart_type: ChartType::Line, chronological: true },
    ];

    fn columns() -> ColumnSpec<Self> {
        ColumnSpec::new(vec![
            Column {
                header: "Student Name",
                extract: |a| CellValue::Text(or_display(a.student_name())),
            },
            Column {
                header: "Subject",
                extract: |a| CellValue::Text(or_display(a.subject())),
            },
            Column {
                header: "Lesson",
                extract: |a| CellValue::Text(or_display(a.lesson_name())),
            },
            Column {
                header: "Marks",
                extract: |a| CellValue::Number(finite_or_zero(a.marks)),
            },
            Column {
                header: "Total Marks",
                extract: |a| CellValue::Number(finite_or_zero(a.total_marks)),
            },
            Column {
                header: "Percentage",
                extract: |a| CellValue::Text(format_percent(a.percentage())),
            },
            Column {
                header: "Attempted On",
                extract: |a| {
                    CellValue::Text(
                        day_key(a.attempted_at.as_ref())
                            .unwrap_or_else(|| DISPLAY_FALLBACK.to_string()),
                    )
                },
            },
        ])
    }

    fn chart(def: &ChartDef, records: &[Self]) -> Series {
        let subject = |a: &QuizAttempt| or_group(a.subject());
        let day = |a: &QuizAttempt| day_group(a.attempted_at.as_ref());
        let pct = |a: &QuizAttempt| Some(a.percentage());
        match def.name {
            "attemptsByDate" => to_series(&count_by(records, day), def.chronological),
            "averagePercentageBySubject" => {
                to_series(&mean_by(records, subject, pct), def.chronological)
            }
            "averagePercentageByDate" => to_series(&mean_by(records, day, pct), def.chronological),
            _ => to_series(&count_by(records, subject), def.chronological),
        }
    }

    fn summary(records: &[Self]) -> Value {
        let pcts: Vec<f64> = records.iter().map(|a| a.percentage()).collect();
        let average = if pcts.is_empty() {
            None
        } else {
            Some(pcts.iter().sum::<f64>() / pcts.len() as f64)
        };
        let highest = pcts.iter().copied().fold(None, |m: Option<f64>, v| {
            Some(m.map_or(v, |m| m.max(v)))
        });
        let lowest = pcts.iter().copied().fold(None, |m: Option<f64>, v| {
            Some(m.map_or(v, |m| m.min(v)))
        });
        json!({
            "totalAttempts": records.len(),
            "averagePercentage": average,
            "highestPercentage": highest,
            "lowestPercentage": lowest,
        })
    }

    fn to_json(&self) -> Value {
        let pct = self.percentage();
        let mut v = json!(self);
        v["percentage"] = json!(pct);
        v["percentageText"] = json!(format_percent(pct));
        v
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub by: String,
    pub dir: SortDir,
    #[serde(skip)]
    kind: FieldKind,
}

impl SortSpec {
    pub fn new(field: &FieldDef, dir: SortDir) -> Self {
        Self {
            by: field.name.to_string(),
            dir,
            kind: field.kind,
        }
    }
}

/// `{ "by": field, "dir": "asc" | "desc" }`; absent means source order.
pub fn parse_sort(raw: Option<&Value>, fields: &[FieldDef]) -> Result<Option<SortSpec>, ReportError> {
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let Some(obj) = raw.as_object() else {
        return Err(ReportError::bad_params("sort must be an object"));
    };
    let Some(by) = obj.get("by").and_then(|v| v.as_str()) else {
        return Err(ReportError::bad_params("sort.by must be a string"));
    };
    let Some(field) = fields.iter().find(|f| f.name == by) else {
        let allowed: Vec<&str> = fields.iter().map(|f| f.name).collect();
        return Err(ReportError::bad_params(format!(
            "sort.by must be one of: {}",
            allowed.join(", ")
        )));
    };
    let dir = match obj.get("dir").and_then(|v| v.as_str()) {
        None => SortDir::Asc,
        Some(d) if d.eq_ignore_ascii_case("asc") => SortDir::Asc,
        Some(d) if d.eq_ignore_ascii_case("desc") => SortDir::Desc,
        Some(_) => return Err(ReportError::bad_params("sort.dir must be one of: asc, desc")),
    };
    Ok(Some(SortSpec::new(field, dir)))
}

fn compare_present<T: PartialOrd>(a: Option<T>, b: Option<T>, dir: SortDir) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            match dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable sort. Records missing the sort value go last in either direction.
pub fn sort_records<R: Filterable>(records: &mut [R], spec: &SortSpec) {
    let field = spec.by.as_str();
    match spec.kind {
        FieldKind::Number => records.sort_by(|a, b| {
            compare_present(a.number_field(field), b.number_field(field), spec.dir)
        }),
        FieldKind::Date => records.sort_by(|a, b| {
            compare_present(a.date_field(field), b.date_field(field), spec.dir)
        }),
        FieldKind::Text | FieldKind::Enum(_) => records.sort_by(|a, b| {
            compare_present(
                a.text_field(field).map(|s| s.to_lowercase()),
                b.text_field(field).map(|s| s.to_lowercase()),
                spec.dir,
            )
        }),
    }
}

/// Filter then sort. This one record list feeds the table, charts and exports.
pub fn prepare<R: ReportRecord>(records: &[R], filters: &FilterSpec, sort: Option<&SortSpec>) -> Vec<R> {
    let mut out = filter(records, filters);
    if let Some(spec) = sort {
        sort_records(&mut out, spec);
    }
    out
}

pub fn options<R: ReportRecord>() -> Value {
    let field_json = |defs: &[FieldDef]| -> Vec<Value> {
        defs.iter()
            .map(|d| {
                let mut v = json!({ "field": d.name, "kind": d.kind.as_str() });
                if let FieldKind::Enum(values) = d.kind {
                    v["values"] = json!(values);
                }
                v
            })
            .collect()
    };
    let charts: Vec<Value> = R::CHARTS
        .iter()
        .map(|c| json!({ "name": c.name, "chartType": c.chart_type, "chronological": c.chronological }))
        .collect();
    json!({
        "title": R::TITLE,
        "headerFill": HEADER_FILL.hex(),
        "columns": R::columns().headers(),
        "filters": field_json(R::FILTERS),
        "sortFields": field_json(R::SORT_FIELDS),
        "charts": charts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse_filter_spec;
    use crate::records::{parse_quiz_attempt, parse_subscription};

    fn subs() -> Vec<Subscription> {
        [
            json!({ "studentId": { "name": "Anna Lee", "email": "anna@example.com" }, "classId": { "subject": "Math" }, "feePaid": 100, "status": "active", "createdAt": "2024-01-01T08:00:00Z" }),
            json!({ "studentId": { "name": "Bob Smith" }, "classId": { "subject": "Physics" }, "feePaid": 50, "status": "inactive", "createdAt": "2024-01-01T12:00:00Z" }),
            json!({ "studentId": null, "classId": null, "feePaid": 75, "status": "active", "createdAt": "2024-01-02" }),
        ]
        .iter()
        .filter_map(parse_subscription)
        .collect()
    }

    fn attempts() -> Vec<QuizAttempt> {
        [
            json!({ "studentId": { "name": "Anna Lee" }, "quizId": { "lessonName": "Fractions", "classId": { "subject": "Math" } }, "marks": 45, "totalMarks": 50, "attemptedAt": "2024-02-02" }),
            json!({ "studentId": { "name": "Bob Smith" }, "quizId": { "lessonName": "Motion", "classId": { "subject": "Physics" } }, "marks": 0, "totalMarks": 0, "attemptedAt": "2024-02-01" }),
            json!({ "studentId": { "name": "Cara Diaz" }, "quizId": null, "marks": 30, "totalMarks": 40 }),
        ]
        .iter()
        .filter_map(parse_quiz_attempt)
        .collect()
    }

    #[test]
    fn student_name_filter_matches_anna_not_bob() {
        let spec = parse_filter_spec(Some(&json!({ "studentName": "ann" })), Subscription::FILTERS)
            .expect("filters");
        let out = prepare(&subs(), &spec, None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].student_name(), Some("Anna Lee"));
    }

    #[test]
    fn revenue_by_date_is_chronological() {
        let def = find_chart::<Subscription>("revenueByDate").expect("chart");
        let mut data = subs();
        data.reverse();
        let s = Subscription::chart(def, &data);
        assert_eq!(s.labels, vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(s.values, vec![150.0, 75.0]);
    }

    #[test]
    fn missing_class_groups_under_unknown() {
        let def = find_chart::<Subscription>("subscriptionsByClass").expect("chart");
        let s = Subscription::chart(def, &subs());
        assert_eq!(s.labels, vec!["Math", "Physics", "Unknown"]);
        let total: f64 = s.values.iter().sum();
        assert_eq!(total, 3.0);
    }

    #[test]
    fn table_rows_use_display_fallbacks() {
        let rows = Subscription::columns().rows(&subs());
        assert_eq!(rows[2][0], CellValue::text("N/A"));
        assert_eq!(rows[2][2], CellValue::text("N/A"));
        assert_eq!(rows[0][5], CellValue::text("2024-01-01"));
    }

    #[test]
    fn percentage_column_and_filter_share_one_value() {
        let data = attempts();
        let rows = QuizAttempt::columns().rows(&data);
        assert_eq!(rows[0][5], CellValue::text("90.00%"));
        assert_eq!(rows[1][5], CellValue::text("0.00%"));

        let spec = parse_filter_spec(
            Some(&json!({ "percentage": { "min": 75, "max": 90 } })),
            QuizAttempt::FILTERS,
        )
        .expect("filters");
        let out = prepare(&data, &spec, None);
        let names: Vec<_> = out.iter().filter_map(|a| a.student_name()).collect();
        assert_eq!(names, vec!["Anna Lee", "Cara Diaz"]);
    }

    #[test]
    fn sort_puts_missing_last_both_ways() {
        let sort = parse_sort(
            Some(&json!({ "by": "attemptedAt", "dir": "desc" })),
            QuizAttempt::SORT_FIELDS,
        )
        .expect("sort");
        let out = prepare(&attempts(), &FilterSpec::new(), sort.as_ref());
        let names: Vec<_> = out.iter().filter_map(|a| a.student_name()).collect();
        assert_eq!(names, vec!["Anna Lee", "Bob Smith", "Cara Diaz"]);

        let sort = parse_sort(Some(&json!({ "by": "attemptedAt" })), QuizAttempt::SORT_FIELDS)
            .expect("sort");
        let out = prepare(&attempts(), &FilterSpec::new(), sort.as_ref());
        let names: Vec<_> = out.iter().filter_map(|a| a.student_name()).collect();
        assert_eq!(names, vec!["Bob Smith", "Anna Lee", "Cara Diaz"]);
    }

    #[test]
    fn numeric_sort_is_not_lexical() {
        let sort = parse_sort(Some(&json!({ "by": "feePaid" })), Subscription::SORT_FIELDS)
            .expect("sort")
            .expect("some");
        assert_eq!(sort.kind, FieldKind::Number);
        let out = prepare(&subs(), &FilterSpec::new(), Some(&sort));
        let fees: Vec<_> = out.iter().filter_map(|s| s.fee_paid).collect();
        assert_eq!(fees, vec![50.0, 75.0, 100.0]);
    }

    #[test]
    fn bad_sort_is_rejected() {
        assert!(parse_sort(Some(&json!({ "by": "shoeSize" })), QuizAttempt::SORT_FIELDS).is_err());
        assert!(parse_sort(
            Some(&json!({ "by": "marks", "dir": "sideways" })),
            QuizAttempt::SORT_FIELDS
        )
        .is_err());
        assert!(parse_sort(None, QuizAttempt::SORT_FIELDS).expect("none").is_none());
    }

    #[test]
    fn quiz_summary_handles_empty() {
        let empty = QuizAttempt::summary(&[]);
        assert_eq!(empty["totalAttempts"], json!(0));
        assert!(empty["averagePercentage"].is_null());

        let s = QuizAttempt::summary(&attempts());
        assert_eq!(s["highestPercentage"], json!(90.0));
        assert_eq!(s["lowestPercentage"], json!(0.0));
    }

    #[test]
    fn average_percentage_by_subject() {
        let def = find_chart::<QuizAttempt>("averagePercentageBySubject").expect("chart");
        let s = QuizAttempt::chart(def, &attempts());
        assert_eq!(s.labels, vec!["Math", "Physics", "Unknown"]);
        assert_eq!(s.values, vec![90.0, 0.0, 75.0]);
    }
}
