use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::derived;

/// Label shown in tables and exports when a relation is missing.
pub const DISPLAY_FALLBACK: &str = "N/A";
/// Group key used by charts when a relation is missing.
pub const GROUP_FALLBACK: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Subscriptions,
    QuizAttempts,
}

impl RecordKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subscriptions" => Some(Self::Subscriptions),
            "quizAttempts" => Some(Self::QuizAttempts),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscriptions => "subscriptions",
            Self::QuizAttempts => "quizAttempts",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRef {
    pub subject: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRef {
    pub lesson_name: Option<String>,
    pub class: Option<ClassRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Unknown,
}

impl SubscriptionStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "inactive" => Self::Inactive,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Unknown => "unknown",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
            Self::Unknown => GROUP_FALLBACK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Option<String>,
    pub student: Option<StudentRef>,
    pub class: Option<ClassRef>,
    pub fee_paid: Option<f64>,
    pub status: SubscriptionStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn student_name(&self) -> Option<&str> {
        self.student.as_ref().and_then(|s| s.name.as_deref())
    }

    pub fn student_email(&self) -> Option<&str> {
        self.student.as_ref().and_then(|s| s.email.as_deref())
    }

    pub fn class_subject(&self) -> Option<&str> {
        self.class.as_ref().and_then(|c| c.subject.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub id: Option<String>,
    pub student: Option<StudentRef>,
    pub quiz: Option<QuizRef>,
    pub marks: Option<f64>,
    pub total_marks: Option<f64>,
    pub attempted_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    pub fn student_name(&self) -> Option<&str> {
        self.student.as_ref().and_then(|s| s.name.as_deref())
    }

    pub fn subject(&self) -> Option<&str> {
        self.quiz
            .as_ref()
            .and_then(|q| q.class.as_ref())
            .and_then(|c| c.subject.as_deref())
    }

    pub fn lesson_name(&self) -> Option<&str> {
        self.quiz.as_ref().and_then(|q| q.lesson_name.as_deref())
    }

    pub fn percentage(&self) -> f64 {
        derived::percentage(self.marks, self.total_marks)
    }
}

/// A loaded RecordSet. Immutable until the shell fetches again.
#[derive(Debug, Clone)]
pub enum RecordSet {
    Subscriptions(Vec<Subscription>),
    QuizAttempts(Vec<QuizAttempt>),
}

impl RecordSet {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Subscriptions(_) => RecordKind::Subscriptions,
            Self::QuizAttempts(_) => RecordKind::QuizAttempts,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Subscriptions(v) => v.len(),
            Self::QuizAttempts(v) => v.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub records: RecordSet,
    pub skipped: usize,
}

/// Normalizes a fetched JSON array. Elements that are not objects are skipped.
pub fn normalize(kind: RecordKind, raw: &[Value]) -> LoadOutcome {
    let mut skipped = 0;
    let records = match kind {
        RecordKind::Subscriptions => {
            let mut out = Vec::with_capacity(raw.len());
            for v in raw {
                match parse_subscription(v) {
                    Some(s) => out.push(s),
                    None => skipped += 1,
                }
            }
            RecordSet::Subscriptions(out)
        }
        RecordKind::QuizAttempts => {
            let mut out = Vec::with_capacity(raw.len());
            for v in raw {
                match parse_quiz_attempt(v) {
                    Some(a) => out.push(a),
                    None => skipped += 1,
                }
            }
            RecordSet::QuizAttempts(out)
        }
    };
    LoadOutcome { records, skipped }
}

pub fn parse_subscription(v: &Value) -> Option<Subscription> {
    let obj = v.as_object()?;
    Some(Subscription {
        id: record_id(v),
        student: first_present(v, &["studentId", "studentRef", "student"]).and_then(student_ref),
        class: first_present(v, &["classId", "classRef", "class"]).and_then(class_ref),
        fee_paid: obj.get("feePaid").and_then(lenient_f64),
        status: obj
            .get("status")
            .and_then(|s| s.as_str())
            .map(SubscriptionStatus::parse)
            .unwrap_or(SubscriptionStatus::Unknown),
        created_at: obj.get("createdAt").and_then(lenient_datetime),
    })
}

pub fn parse_quiz_attempt(v: &Value) -> Option<QuizAttempt> {
    let obj = v.as_object()?;
    let attempted_at = obj
        .get("attemptedAt")
        .and_then(lenient_datetime)
        .or_else(|| obj.get("createdAt").and_then(lenient_datetime));
    Some(QuizAttempt {
        id: record_id(v),
        student: first_present(v, &["studentId", "studentRef", "student"]).and_then(student_ref),
        quiz: first_present(v, &["quizId", "quizRef", "quiz"]).and_then(quiz_ref),
        marks: obj.get("marks").and_then(lenient_f64),
        total_marks: obj.get("totalMarks").and_then(lenient_f64),
        attempted_at,
    })
}

fn record_id(v: &Value) -> Option<String> {
    first_present(v, &["_id", "id"]).and_then(|id| match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_present<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| v.get(*k))
        .find(|x| !x.is_null())
}

// A bare id string is an unpopulated relation and carries no labels.
fn student_ref(v: &Value) -> Option<StudentRef> {
    v.as_object()?;
    Some(StudentRef {
        name: text_field(v, "name"),
        email: text_field(v, "email"),
    })
}

fn class_ref(v: &Value) -> Option<ClassRef> {
    v.as_object()?;
    Some(ClassRef {
        subject: text_field(v, "subject"),
        name: text_field(v, "name").or_else(|| text_field(v, "className")),
    })
}

fn quiz_ref(v: &Value) -> Option<QuizRef> {
    v.as_object()?;
    Some(QuizRef {
        lesson_name: text_field(v, "lessonName"),
        class: first_present(v, &["classId", "classRef", "class"]).and_then(class_ref),
    })
}

fn text_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(|s| s.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Accepts JSON numbers and numeric strings. NaN and infinities read as missing.
pub fn lenient_f64(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

pub fn lenient_datetime(v: &Value) -> Option<DateTime<Utc>> {
    parse_datetime(v.as_str()?)
}

pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    parse_date_only(s).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|n| n.and_utc())
}

pub fn parse_date_only(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// ISO day key (`YYYY-MM-DD`) used for date groupings and export cells.
pub fn day_key(dt: Option<&DateTime<Utc>>) -> Option<String> {
    dt.map(|d| d.format("%Y-%m-%d").to_string())
}
