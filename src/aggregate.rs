use std::collections::HashMap;

/// Ordered mapping from group key to an aggregate, in first-seen key order.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouped<V> {
    entries: Vec<(String, V)>,
}

impl<V> Grouped<V> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn map_values<W>(self, f: impl Fn(V) -> W) -> Grouped<W> {
        Grouped {
            entries: self.entries.into_iter().map(|(k, v)| (k, f(v))).collect(),
        }
    }
}

/// Single-pass group-and-fold. Each new key starts from a clone of `seed`.
///
/// Keys keep the order in which they are first seen; date-keyed callers sort
/// afterwards (see `series::to_series`).
pub fn aggregate<R, V, K, F>(records: &[R], key_fn: K, seed: V, reduce_fn: F) -> Grouped<V>
where
    V: Clone,
    K: Fn(&R) -> String,
    F: Fn(V, &R) -> V,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut entries: Vec<(String, Option<V>)> = Vec::new();
    for r in records {
        let key = key_fn(r);
        let slot = match index.get(&key) {
            Some(i) => *i,
            None => {
                index.insert(key.clone(), entries.len());
                entries.push((key, Some(seed.clone())));
                entries.len() - 1
            }
        };
        if let Some(acc) = entries[slot].1.take() {
            entries[slot].1 = Some(reduce_fn(acc, r));
        }
    }
    Grouped {
        entries: entries
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect(),
    }
}

pub fn count_by<R, K>(records: &[R], key_fn: K) -> Grouped<u32>
where
    K: Fn(&R) -> String,
{
    aggregate(records, key_fn, 0u32, |acc, _| acc.saturating_add(1))
}

/// Sums a numeric field per group. Missing and NaN values add 0.
pub fn sum_by<R, K, F>(records: &[R], key_fn: K, field: F) -> Grouped<f64>
where
    K: Fn(&R) -> String,
    F: Fn(&R) -> Option<f64>,
{
    aggregate(records, key_fn, 0.0f64, |acc, r| {
        acc + field(r).filter(|v| v.is_finite()).unwrap_or(0.0)
    })
}

/// Mean of a numeric field per group. Missing values count as 0 so the mean
/// matches what the table shows for the same rows.
pub fn mean_by<R, K, F>(records: &[R], key_fn: K, field: F) -> Grouped<f64>
where
    K: Fn(&R) -> String,
    F: Fn(&R) -> Option<f64>,
{
    aggregate(records, key_fn, (0.0f64, 0u32), |(sum, n), r| {
        (sum + field(r).filter(|v| v.is_finite()).unwrap_or(0.0), n + 1)
    })
    .map_values(|(sum, n)| if n > 0 { sum / n as f64 } else { 0.0 })
}

#[cfg(test)]
impl<V> Grouped<V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Sub {
        subject: Option<&'static str>,
        fee: Option<f64>,
        day: &'static str,
    }

    fn subject_key(s: &Sub) -> String {
        s.subject.unwrap_or("Unknown").to_string()
    }

    fn subs() -> Vec<Sub> {
        vec![
            Sub { subject: Some("Physics"), fee: Some(100.0), day: "2024-01-01" },
            Sub { subject: Some("Math"), fee: Some(50.0), day: "2024-01-01" },
            Sub { subject: None, fee: None, day: "2024-01-02" },
            Sub { subject: Some("Physics"), fee: Some(f64::NAN), day: "2024-01-02" },
            Sub { subject: Some("Math"), fee: Some(75.0), day: "2024-01-03" },
        ]
    }

    #[test]
    fn count_keeps_first_seen_order_and_falls_back_to_unknown() {
        let g = count_by(&subs(), subject_key);
        let keys: Vec<_> = g.keys().collect();
        assert_eq!(keys, vec!["Physics", "Math", "Unknown"]);
        assert_eq!(g.get("Physics"), Some(&2));
        assert_eq!(g.get("Unknown"), Some(&1));
    }

    #[test]
    fn counts_partition_the_input() {
        let data = subs();
        let g = count_by(&data, |s| s.day.to_string());
        let total: u32 = g.iter().map(|(_, v)| *v).sum();
        assert_eq!(total as usize, data.len());
        assert!(count_by::<Sub, _>(&[], subject_key).is_empty());
    }

    #[test]
    fn sum_treats_missing_and_nan_as_zero() {
        let g = sum_by(&subs(), subject_key, |s| s.fee);
        assert_eq!(g.get("Physics"), Some(&100.0));
        assert_eq!(g.get("Math"), Some(&125.0));
        assert_eq!(g.get("Unknown"), Some(&0.0));
    }

    #[test]
    fn daily_revenue_scenario() {
        let data = vec![
            Sub { subject: None, fee: Some(100.0), day: "2024-01-01" },
            Sub { subject: None, fee: Some(50.0), day: "2024-01-01" },
            Sub { subject: None, fee: Some(75.0), day: "2024-01-02" },
        ];
        let g = sum_by(&data, |s| s.day.to_string(), |s| s.fee);
        let pairs: Vec<_> = g.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        assert_eq!(
            pairs,
            vec![("2024-01-01".to_string(), 150.0), ("2024-01-02".to_string(), 75.0)]
        );
    }

    #[test]
    fn mean_per_group() {
        let g = mean_by(&subs(), subject_key, |s| s.fee);
        assert_eq!(g.get("Math"), Some(&62.5));
        assert_eq!(g.get("Physics"), Some(&50.0));
    }

    #[test]
    fn aggregate_does_not_touch_input() {
        let data = subs();
        let before = data.len();
        let _ = aggregate(&data, subject_key, Vec::new(), |mut acc: Vec<f64>, s| {
            acc.push(s.fee.unwrap_or(0.0));
            acc
        });
        assert_eq!(data.len(), before);
    }
}
