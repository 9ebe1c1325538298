use color_eyre::eyre;
use color_eyre::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Latency histogram: each value with the number of times it was observed.
#[derive(Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Histogram {
    values: BTreeMap<u64, usize>,
}

impl Histogram {
    /// Creates an empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an histogram from a list of values.
    pub fn from<T: IntoIterator<Item = u64>>(values: T) -> Self {
        let mut histogram = Self::new();
        values.into_iter().for_each(|value| histogram.increment(value));
        histogram
    }

    /// Creates an histogram from parallel lists of values and their counts,
    /// the way clients dump them.
    pub fn from_buckets(
        values: &[u64],
        counts: &[u64],
    ) -> Result<Self, Report> {
        if values.len() != counts.len() {
            eyre::bail!(
                "histogram has {} values but {} counts",
                values.len(),
                counts.len()
            );
        }
        let mut histogram = Self::new();
        for (&value, &count) in values.iter().zip(counts) {
            if count > 0 {
                *histogram.values.entry(value).or_insert(0) += count as usize;
            }
        }
        Ok(histogram)
    }

    /// Every value, repeated as many times as observed, in increasing order.
    pub fn values(&self) -> impl Iterator<Item = u64> + '_ {
        self.values
            .iter()
            .flat_map(|(value, count)| (0..*count).map(move |_| *value))
    }

    pub fn merge(&mut self, other: &Self) {
        for (value, count) in &other.values {
            *self.values.entry(*value).or_insert(0) += count;
        }
    }

    /// Increments the occurrence of some value in the histogram.
    pub fn increment(&mut self, value: u64) {
        *self.values.entry(value).or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn count(&self) -> usize {
        self.values.values().sum()
    }

    pub fn mean(&self) -> f64 {
        let (sum, count) = self.sum_and_count();
        if count == 0 {
            return f64::NAN;
        }
        sum / count as f64
    }

    pub fn min(&self) -> f64 {
        self.values
            .keys()
            .next()
            .map(|min| *min as f64)
            .unwrap_or(f64::NAN)
    }

    pub fn max(&self) -> f64 {
        self.values
            .keys()
            .next_back()
            .map(|max| *max as f64)
            .unwrap_or(f64::NAN)
    }

    /// Computes a given percentile, in `[0, 1]`, interpolating linearly
    /// between the two closest ranks.
    pub fn percentile(&self, percentile: f64) -> f64 {
        assert!((0.0..=1.0).contains(&percentile));
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        let rank = percentile * (count - 1) as f64;
        let below = rank.floor() as usize;
        let above = rank.ceil() as usize;
        let left = self.value_at(below);
        let right = self.value_at(above);
        left + (right - left) * (rank - below as f64)
    }

    /// Cumulative distribution: each distinct value with the fraction of
    /// observations less than or equal to it.
    pub fn cdf(&self) -> Vec<(u64, f64)> {
        let total = self.count() as f64;
        let mut seen = 0;
        self.values
            .iter()
            .map(|(value, count)| {
                seen += count;
                (*value, seen as f64 / total)
            })
            .collect()
    }

    // value at position `index` of the sorted observations
    fn value_at(&self, mut index: usize) -> f64 {
        for (value, count) in &self.values {
            if index < *count {
                return *value as f64;
            }
            index -= count;
        }
        panic!("index should be smaller than the number of observations")
    }

    fn sum_and_count(&self) -> (f64, usize) {
        self.values.iter().fold(
            (0.0, 0),
            |(sum_acc, count_acc), (value, count)| {
                (sum_acc + (*value as f64) * (*count as f64), count_acc + count)
            },
        )
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min={:<6} max={:<6} avg={:<6} p50={:<6} p95={:<6} p99={:<6}",
            self.min().round(),
            self.max().round(),
            self.mean().round(),
            self.percentile(0.5).round(),
            self.percentile(0.95).round(),
            self.percentile(0.99).round(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn stats() {
        let histogram = Histogram::from(vec![1, 2, 3, 4]);
        assert_eq!(histogram.count(), 4);
        assert_eq!(histogram.min(), 1.0);
        assert_eq!(histogram.max(), 4.0);
        assert!(approx(histogram.mean(), 2.5));
        assert!(approx(histogram.percentile(0.5), 2.5));
        assert!(approx(histogram.percentile(0.95), 3.85));
        assert!(approx(histogram.percentile(0.0), 1.0));
        assert!(approx(histogram.percentile(1.0), 4.0));
    }

    #[test]
    fn repeated_values() {
        let histogram = Histogram::from_buckets(&[10, 20, 30], &[2, 0, 2])
            .expect("buckets should be valid");
        let values: Vec<_> = histogram.values().collect();
        assert_eq!(values, vec![10, 10, 30, 30]);
        assert!(approx(histogram.percentile(0.5), 20.0));
        assert!(approx(histogram.percentile(0.25), 10.0));
        assert_eq!(histogram.cdf(), vec![(10, 0.5), (30, 1.0)]);
    }

    #[test]
    fn mismatched_buckets() {
        assert!(Histogram::from_buckets(&[10, 20], &[1]).is_err());
    }

    #[test]
    fn empty() {
        let histogram = Histogram::new();
        assert!(histogram.is_empty());
        assert_eq!(histogram.percentile(0.99), 0.0);
        assert!(histogram.min().is_nan());
        assert!(histogram.cdf().is_empty());
    }

    #[test]
    fn merge() {
        let mut read = Histogram::from(vec![1, 1, 5]);
        let write = Histogram::from(vec![1, 7]);
        read.merge(&write);
        assert_eq!(read, Histogram::from(vec![1, 1, 1, 5, 7]));
    }

    #[quickcheck]
    fn merge_keeps_all_values(a: Vec<u16>, b: Vec<u16>) -> bool {
        let a: Vec<u64> = a.into_iter().map(u64::from).collect();
        let b: Vec<u64> = b.into_iter().map(u64::from).collect();
        let mut merged = Histogram::from(a.clone());
        merged.merge(&Histogram::from(b.clone()));

        let mut all: Vec<_> = a.into_iter().chain(b).collect();
        all.sort_unstable();
        merged.values().collect::<Vec<_>>() == all
    }

    #[quickcheck]
    fn percentiles_are_monotonic(values: Vec<u16>) -> bool {
        let histogram =
            Histogram::from(values.into_iter().map(u64::from));
        let percentiles: Vec<_> = (0..=100)
            .map(|p| histogram.percentile(p as f64 / 100.0))
            .collect();
        percentiles.windows(2).all(|pair| pair[0] <= pair[1] + 1e-9)
    }
}
