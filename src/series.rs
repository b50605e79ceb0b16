use serde::Serialize;

use crate::aggregate::Grouped;
use crate::records::parse_date_only;

/// Parallel label/value arrays for pie, bar and line charts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl Series {
    /// Empty series render as an explicit "no data" state, not an empty chart.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Converts grouped aggregates into chart arrays.
///
/// With `chronological`, keys are read as `YYYY-MM-DD` and sorted ascending
/// with a stable sort; keys that are not dates (the `Unknown` bucket) go last.
pub fn to_series<V>(grouped: &Grouped<V>, chronological: bool) -> Series
where
    V: Copy + Into<f64>,
{
    let mut pairs: Vec<(&str, f64)> = grouped.iter().map(|(k, v)| (k, (*v).into())).collect();
    if chronological {
        pairs.sort_by_key(|(k, _)| match parse_date_only(k) {
            Some(d) => (0u8, Some(d)),
            None => (1u8, None),
        });
    }
    let (labels, values) = pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .unzip();
    Series { labels, values }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{count_by, sum_by};

    #[test]
    fn lengths_match_group_count() {
        let data = ["b", "a", "b", "c"];
        let g = count_by(&data, |s| s.to_string());
        let s = to_series(&g, false);
        assert_eq!(s.labels.len(), g.len());
        assert_eq!(s.values.len(), g.len());
        assert_eq!(s.labels, vec!["b", "a", "c"]);
        assert_eq!(s.values, vec![2.0, 1.0, 1.0]);
    }

    #[test]
    fn chronological_sort_puts_unknown_last() {
        let data = [
            ("2024-01-02", 75.0),
            ("Unknown", 5.0),
            ("2024-01-01", 100.0),
            ("2024-01-01", 50.0),
        ];
        let g = sum_by(&data, |r| r.0.to_string(), |r| Some(r.1));
        let s = to_series(&g, true);
        assert_eq!(s.labels, vec!["2024-01-01", "2024-01-02", "Unknown"]);
        assert_eq!(s.values, vec![150.0, 75.0, 5.0]);
    }

    #[test]
    fn empty_grouping_gives_empty_series() {
        let g = count_by::<&str, _>(&[], |s| s.to_string());
        let s = to_series(&g, true);
        assert!(s.is_empty());
        assert_eq!(s.values.len(), 0);
    }
}
