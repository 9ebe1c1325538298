use crate::db::RunData;
use serde::{Deserialize, Serialize};

// two-sided 95% critical values of Student's t, by degrees of freedom
const T_95: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228,
    2.201, 2.179, 2.160, 2.145, 2.131, 2.120, 2.110, 2.101, 2.093, 2.086,
    2.080, 2.074, 2.069, 2.064, 2.060, 2.056, 2.052, 2.048, 2.045, 2.042,
];
const T_95_LARGE: [(usize, f64); 3] = [(120, 1.980), (60, 2.000), (40, 2.021)];
const T_95_INFINITY: f64 = 1.960;

/// A mean with the half width of its 95% confidence interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanConf {
    pub mean: f64,
    pub ci: f64,
}

impl MeanConf {
    pub fn scaled(&self, divisor: f64) -> Self {
        Self {
            mean: self.mean / divisor,
            ci: self.ci / divisor,
        }
    }
}

/// Mean and 95% confidence interval of a sample. A sample with a single
/// value has no interval; an empty one is all zeros.
pub fn mean_and_conf(values: &[f64]) -> MeanConf {
    match values.len() {
        0 => MeanConf::default(),
        1 => MeanConf {
            mean: values[0],
            ci: 0.0,
        },
        n => {
            let count = n as f64;
            let mean = values.iter().sum::<f64>() / count;
            let variance = values
                .iter()
                .map(|value| (value - mean) * (value - mean))
                .sum::<f64>()
                / (count - 1.0);
            let ci = t_critical(n - 1) * variance.sqrt() / count.sqrt();
            MeanConf { mean, ci }
        }
    }
}

// uses the closest tabulated degrees of freedom not above `df`
fn t_critical(df: usize) -> f64 {
    if df == 0 {
        return 0.0;
    }
    if df <= T_95.len() {
        return T_95[df - 1];
    }
    if df > 120 {
        return T_95_INFINITY;
    }
    T_95_LARGE
        .iter()
        .find(|(tabulated, _)| df >= *tabulated)
        .map(|(_, t)| *t)
        .unwrap_or(T_95[T_95.len() - 1])
}

/// Aggregate of the runs of a test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub runs: usize,
    pub ops_tput: MeanConf,
    pub data_tput: MeanConf,
    pub records_tput: MeanConf,
    pub mean_latency: MeanConf,
    pub median_latency: MeanConf,
    pub p95_latency: MeanConf,
    pub p99_latency: MeanConf,
    // extremes over all runs
    pub min_latency: MeanConf,
    pub max_latency: MeanConf,
}

impl Summary {
    pub fn from_runs(runs: &[RunData]) -> Self {
        let metric = |f: fn(&RunData) -> f64| {
            let values: Vec<_> = runs.iter().map(f).collect();
            mean_and_conf(&values)
        };
        let min_latency = runs
            .iter()
            .map(|run| run.min_latency)
            .fold(None, |acc: Option<f64>, value| {
                Some(acc.map_or(value, |acc| acc.min(value)))
            })
            .unwrap_or_default();
        let max_latency = runs
            .iter()
            .map(|run| run.max_latency)
            .fold(None, |acc: Option<f64>, value| {
                Some(acc.map_or(value, |acc| acc.max(value)))
            })
            .unwrap_or_default();

        Self {
            runs: runs.len(),
            ops_tput: metric(|run| run.ops_tput),
            data_tput: metric(|run| run.data_tput),
            records_tput: metric(|run| run.records_tput),
            mean_latency: metric(|run| run.mean_latency),
            median_latency: metric(|run| run.median_latency),
            p95_latency: metric(|run| run.p95_latency),
            p99_latency: metric(|run| run.p99_latency),
            min_latency: MeanConf {
                mean: min_latency,
                ci: 0.0,
            },
            max_latency: MeanConf {
                mean: max_latency,
                ci: 0.0,
            },
        }
    }

    pub fn latency(&self, latency: LatencyType) -> MeanConf {
        match latency {
            LatencyType::Mean => self.mean_latency,
            LatencyType::Median => self.median_latency,
            LatencyType::P95 => self.p95_latency,
            LatencyType::P99 => self.p99_latency,
            LatencyType::Max => self.max_latency,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LatencyType {
    Mean,
    Median,
    P95,
    P99,
    Max,
}

impl LatencyType {
    pub fn all() -> [LatencyType; 5] {
        [
            LatencyType::Mean,
            LatencyType::Median,
            LatencyType::P95,
            LatencyType::P99,
            LatencyType::Max,
        ]
    }

    /// Suffix of the figure files plotting this latency.
    pub fn file_suffix(&self) -> &str {
        match self {
            LatencyType::Mean => "meanLat",
            LatencyType::Median => "lat50",
            LatencyType::P95 => "lat95",
            LatencyType::P99 => "lat99",
            LatencyType::Max => "maxLat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn run(records_tput: f64, min: f64, max: f64) -> RunData {
        RunData {
            ops_tput: records_tput / 100.0,
            data_tput: 1.0,
            records_tput,
            mean_latency: 10.0,
            median_latency: 9.0,
            p95_latency: 20.0,
            p99_latency: 30.0,
            min_latency: min,
            max_latency: max,
        }
    }

    #[test]
    fn mean_and_conf_small_samples() {
        assert_eq!(mean_and_conf(&[]), MeanConf { mean: 0.0, ci: 0.0 });
        assert_eq!(mean_and_conf(&[7.0]), MeanConf { mean: 7.0, ci: 0.0 });
    }

    #[test]
    fn mean_and_conf_three_values() {
        // stddev 1, t(2) = 4.303
        let mc = mean_and_conf(&[1.0, 2.0, 3.0]);
        assert!(approx(mc.mean, 2.0));
        assert!(approx(mc.ci, 4.303 / 3f64.sqrt()));
    }

    #[test]
    fn identical_values_have_no_interval() {
        let mc = mean_and_conf(&[5.0, 5.0, 5.0, 5.0]);
        assert!(approx(mc.mean, 5.0));
        assert!(approx(mc.ci, 0.0));
    }

    #[test]
    fn critical_values() {
        assert_eq!(t_critical(1), 12.706);
        assert_eq!(t_critical(30), 2.042);
        assert_eq!(t_critical(45), 2.021);
        assert_eq!(t_critical(100), 2.000);
        assert_eq!(t_critical(1000), 1.960);
    }

    #[test]
    fn summary_over_runs() {
        let runs = vec![run(100.0, 3.0, 50.0), run(300.0, 1.0, 90.0)];
        let summary = Summary::from_runs(&runs);
        assert_eq!(summary.runs, 2);
        assert!(approx(summary.records_tput.mean, 200.0));
        assert!(summary.records_tput.ci > 0.0);
        assert!(approx(summary.mean_latency.ci, 0.0));
        assert_eq!(summary.min_latency, MeanConf { mean: 1.0, ci: 0.0 });
        assert_eq!(summary.max_latency, MeanConf { mean: 90.0, ci: 0.0 });
        assert_eq!(summary.latency(LatencyType::Max).mean, 90.0);
        assert_eq!(summary.latency(LatencyType::P99).mean, 30.0);
    }

    #[test]
    fn empty_summary() {
        let summary = Summary::from_runs(&[]);
        assert_eq!(summary, Summary::default());
    }
}
