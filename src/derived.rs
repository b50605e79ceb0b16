/// `marks / total_marks * 100`, or 0 when the denominator is zero or missing.
///
/// Missing or non-finite marks count as 0. The result is always finite, so it is
/// safe to range-filter and average without further checks.
pub fn percentage(marks: Option<f64>, total_marks: Option<f64>) -> f64 {
    let total = match total_marks {
        Some(t) if t.is_finite() && t > 0.0 => t,
        _ => return 0.0,
    };
    let marks = marks.filter(|m| m.is_finite()).unwrap_or(0.0);
    let p = (marks / total) * 100.0;
    if p.is_finite() {
        p
    } else {
        0.0
    }
}

pub fn format_percent(v: f64) -> String {
    format!("{:.2}%", v)
}
