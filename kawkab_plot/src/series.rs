use crate::config::{Metric, PlotConfig};
use crate::db::{CacheLog, Entry, Histogram, LatencyType, ResultsDB, TputLog};
use color_eyre::eyre;
use color_eyre::Report;

const MILLION: f64 = 1_000_000.0;
// latencies are recorded in microseconds and plotted in milliseconds
const MICROS_PER_MILLI: f64 = 1_000.0;

/// A line (or a set of bars) ready to be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    // half width of the confidence interval of each `y`
    pub ci: Option<Vec<f64>>,
}

impl Series {
    pub fn new(label: impl ToString, x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            label: label.to_string(),
            x,
            y,
            ci: None,
        }
    }

    pub fn with_ci(mut self, ci: Vec<f64>) -> Self {
        self.ci = Some(ci);
        self
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

fn entry<'a>(
    db: &'a ResultsDB,
    config: &PlotConfig,
    metric: &Metric,
    point_index: usize,
    iat: f64,
) -> Result<&'a Entry, Report> {
    let point = &metric.points[point_index];
    let test_id = config.test_id(metric, point, iat);
    db.get(&test_id, Some(&point.res_file)).ok_or_else(|| {
        eyre::eyre!("no results for {} in {}", test_id, point.res_file)
    })
}

/// One line per point of each metric: records per second (millions)
/// against `latency` (ms), one sample per inter-arrival time.
pub fn latency_throughput(
    db: &ResultsDB,
    config: &PlotConfig,
    metrics: &[Metric],
    latency: LatencyType,
) -> Result<Vec<Series>, Report> {
    let mut all_series = Vec::new();
    for metric in metrics {
        for (index, point) in metric.points.iter().enumerate() {
            let mut x = Vec::with_capacity(point.iats.len());
            let mut y = Vec::with_capacity(point.iats.len());
            let mut ci = Vec::with_capacity(point.iats.len());
            for &iat in &point.iats {
                let summary = &entry(db, config, metric, index, iat)?.summary;
                let tput = summary.records_tput.scaled(MILLION);
                let lat = summary.latency(latency).scaled(MICROS_PER_MILLI);
                x.push(tput.mean);
                y.push(lat.mean);
                ci.push(lat.ci);
            }
            let label = format!("{} {}", metric.label, point.val);
            all_series.push(Series::new(label, x, y).with_ci(ci));
        }
    }
    Ok(all_series)
}

/// One bar group per metric: records per second (millions) at the first
/// inter-arrival time of each point.
pub fn throughput_bars(
    db: &ResultsDB,
    config: &PlotConfig,
    metrics: &[Metric],
) -> Result<Vec<Series>, Report> {
    let mut all_series = Vec::with_capacity(metrics.len());
    for metric in metrics {
        let mut x = Vec::with_capacity(metric.points.len());
        let mut y = Vec::with_capacity(metric.points.len());
        let mut ci = Vec::with_capacity(metric.points.len());
        for (index, point) in metric.points.iter().enumerate() {
            let iat = point.iats.first().copied().ok_or_else(|| {
                eyre::eyre!(
                    "point {} of {} has no iat",
                    point.val,
                    metric.label
                )
            })?;
            let summary = &entry(db, config, metric, index, iat)?.summary;
            let tput = summary.records_tput.scaled(MILLION);
            x.push(point.val as f64);
            y.push(tput.mean);
            ci.push(tput.ci);
        }
        all_series.push(Series::new(&metric.label, x, y).with_ci(ci));
    }
    Ok(all_series)
}

/// Cumulative fraction of samples at or below each recorded latency,
/// with latencies divided by `scale`.
pub fn latency_cdf(label: &str, histogram: &Histogram, scale: f64) -> Series {
    let (x, y) = histogram
        .cdf()
        .into_iter()
        .map(|(value, fraction)| (value as f64 / scale, fraction))
        .unzip();
    Series::new(label, x, y)
}

/// Records per second (millions) over time. With `zero_ends`, the first and
/// last samples, which only cover part of a second, are set to zero.
pub fn throughput_timeline(
    label: &str,
    log: &TputLog,
    offset_secs: f64,
    zero_ends: bool,
) -> Series {
    let x = log.time_secs.iter().map(|time| time + offset_secs).collect();
    let mut y: Vec<_> =
        log.counts.iter().map(|count| count / MILLION).collect();
    if zero_ends {
        if let Some(first) = y.first_mut() {
            *first = 0.0;
        }
        if let Some(last) = y.last_mut() {
            *last = 0.0;
        }
    }
    Series::new(label, x, y)
}

pub fn cache_timeline(log: &CacheLog) -> Vec<Series> {
    let series = |label: &str, y: &[f64]| {
        Series::new(label, log.time_secs.clone(), y.to_vec())
    };
    vec![
        series("Cache occupancy", &log.cache_occupancy),
        series("Local store occupancy", &log.local_store_occupancy),
        series("Local store evictable", &log.local_store_evictable),
        series("Global store queue", &log.global_store_queue),
    ]
}

/// Placement of grouped bars: group `i` of series `k` is drawn at
/// `left_blank + i + k * width`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarLayout {
    pub left_blank: f64,
    pub width: f64,
}

impl Default for BarLayout {
    fn default() -> Self {
        Self {
            left_blank: 0.3,
            width: 0.2,
        }
    }
}

impl BarLayout {
    pub fn positions(&self, series_index: usize, groups: usize) -> Vec<f64> {
        (0..groups)
            .map(|group| {
                self.left_blank
                    + group as f64
                    + series_index as f64 * self.width
            })
            .collect()
    }

    /// Center of each group of `series_count` bars.
    pub fn ticks(&self, series_count: usize, groups: usize) -> Vec<f64> {
        (0..groups)
            .map(|group| {
                group as f64
                    + series_count as f64 * self.width / 2.0
                    + self.left_blank / 2.0
            })
            .collect()
    }
}

/// Stairs that go up at each `x` to the next `y`, ending at 1.
pub fn step_up_cdf(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut step_x = Vec::with_capacity(2 * x.len() + 1);
    let mut step_y = Vec::with_capacity(2 * x.len() + 1);
    for i in 0..x.len() {
        step_x.push(x[i]);
        step_y.push(y[i]);
        if i + 1 < x.len() {
            step_x.push(x[i]);
            step_y.push(y[i + 1]);
        }
    }
    if let Some(&last) = step_x.last() {
        step_x.push(last);
        step_y.push(1.0);
    }
    (step_x, step_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Param, Point};
    use crate::db::{RunData, Summary};
    use kawkab_exp::System;

    fn run(records_tput: f64, median_latency: f64) -> RunData {
        RunData {
            ops_tput: records_tput / 100.0,
            data_tput: 1.0,
            records_tput,
            mean_latency: median_latency,
            median_latency,
            p95_latency: median_latency * 2.0,
            p99_latency: median_latency * 3.0,
            min_latency: 1.0,
            max_latency: median_latency * 10.0,
        }
    }

    fn metric() -> Metric {
        Metric {
            system: System::Kawkab,
            label: String::from("Kawkab"),
            param: Param::BatchSize,
            points: vec![
                Point {
                    res_file: String::from("write-results.json"),
                    prefix: String::from("rw-kw48"),
                    val: 100,
                    num_clients: None,
                    iats: vec![4.0, 2.0],
                    from_hist: false,
                },
                Point {
                    res_file: String::from("write-results.json"),
                    prefix: String::from("rw-kw48"),
                    val: 1000,
                    num_clients: None,
                    iats: vec![2.0],
                    from_hist: false,
                },
            ],
        }
    }

    fn db(config: &PlotConfig, metric: &Metric) -> ResultsDB {
        let mut entries = Vec::new();
        for point in &metric.points {
            for &iat in &point.iats {
                let test_id = config.test_id(metric, point, iat);
                let tput = point.val as f64 * 1000.0 / iat;
                let runs = vec![run(tput, 2000.0), run(tput, 4000.0)];
                entries.push(Entry {
                    key: test_id.to_string(),
                    test_id,
                    res_file: point.res_file.clone(),
                    summary: Summary::from_runs(&runs),
                    runs,
                });
            }
        }
        ResultsDB::from_entries(entries)
    }

    #[test]
    fn latency_throughput_lines() {
        let config = PlotConfig::default();
        let metric = metric();
        let db = db(&config, &metric);

        let series = latency_throughput(
            &db,
            &config,
            std::slice::from_ref(&metric),
            LatencyType::Median,
        )
        .expect("series should be built");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].label, "Kawkab 100");
        assert_eq!(series[0].x, vec![0.025, 0.05]);
        assert_eq!(series[0].y, vec![3.0, 3.0]);
        let ci = series[0].ci.as_ref().expect("ci should be set");
        assert!(ci.iter().all(|ci| *ci > 0.0));
        assert_eq!(series[1].label, "Kawkab 1000");
        assert_eq!(series[1].x, vec![0.5]);
    }

    #[test]
    fn missing_results_fail() {
        let config = PlotConfig::default();
        let metric = metric();
        let db = ResultsDB::default();
        let result = latency_throughput(
            &db,
            &config,
            std::slice::from_ref(&metric),
            LatencyType::P99,
        );
        assert!(result.is_err());
    }

    #[test]
    fn throughput_bar_groups() {
        let config = PlotConfig::default();
        let metric = metric();
        let db = db(&config, &metric);

        let series =
            throughput_bars(&db, &config, std::slice::from_ref(&metric))
                .expect("series should be built");
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].label, "Kawkab");
        assert_eq!(series[0].x, vec![100.0, 1000.0]);
        // first iat of each point
        assert_eq!(series[0].y, vec![0.025, 0.5]);
        assert_eq!(series[0].ci, Some(vec![0.0, 0.0]));
    }

    #[test]
    fn cdf_series() {
        let histogram = Histogram::from(vec![1000, 2000, 2000, 4000]);
        let series = latency_cdf("All", &histogram, 1000.0);
        assert_eq!(series.x, vec![1.0, 2.0, 4.0]);
        assert_eq!(series.y, vec![0.25, 0.75, 1.0]);
    }

    #[test]
    fn timeline_series() {
        let log = TputLog {
            time_secs: vec![1.0, 2.0, 3.0],
            counts: vec![500_000.0, 2_000_000.0, 700_000.0],
        };
        let series = throughput_timeline("Writes", &log, 10.0, false);
        assert_eq!(series.x, vec![11.0, 12.0, 13.0]);
        assert_eq!(series.y, vec![0.5, 2.0, 0.7]);

        let series = throughput_timeline("Writes", &log, 0.0, true);
        assert_eq!(series.y, vec![0.0, 2.0, 0.0]);
    }

    #[test]
    fn cache_series() {
        let log = CacheLog {
            time_secs: vec![0.0, 1.0],
            cache_occupancy: vec![10.0, 20.0],
            local_store_occupancy: vec![1.0, 2.0],
            local_store_evictable: vec![0.0, 1.0],
            global_store_queue: vec![5.0, 0.0],
        };
        let series = cache_timeline(&log);
        assert_eq!(series.len(), 4);
        assert!(series.iter().all(|series| series.x == log.time_secs));
        assert_eq!(series[3].y, vec![5.0, 0.0]);
    }

    #[test]
    fn bar_layout() {
        let layout = BarLayout {
            left_blank: 0.5,
            width: 0.25,
        };
        assert_eq!(layout.positions(0, 3), vec![0.5, 1.5, 2.5]);
        assert_eq!(layout.positions(2, 2), vec![1.0, 2.0]);
        // two series per group
        assert_eq!(layout.ticks(2, 2), vec![0.5, 1.5]);
    }

    #[test]
    fn stairs() {
        let (x, y) = step_up_cdf(&[1.0, 2.0], &[0.5, 0.9]);
        assert_eq!(x, vec![1.0, 1.0, 2.0, 2.0]);
        assert_eq!(y, vec![0.5, 0.9, 0.9, 1.0]);

        let (x, y) = step_up_cdf(&[], &[]);
        assert!(x.is_empty() && y.is_empty());
    }
}
