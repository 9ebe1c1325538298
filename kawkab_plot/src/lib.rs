#![deny(rust_2018_idioms)]

pub mod config;
pub mod db;
pub mod fmt;
#[cfg(feature = "pyo3")]
pub mod plot;
pub mod series;

// Re-exports.
pub use config::{FigureSpec, PlotConfig};
pub use db::{ResultsDB, Search};
pub use series::Series;

use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use db::{run_latency_histogram, CacheLog, HistsFile};
use fmt::PlotFmt;

// latencies in histograms are in microseconds
const CDF_SCALE: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Lines,
    Bars,
    Cdf,
}

/// Axes settings of a chart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartOpts {
    pub xlabel: String,
    pub ylabel: String,
    pub log_x: bool,
    pub log_y: bool,
    pub x_max: Option<f64>,
    pub y_max: Option<f64>,
    pub markers: bool,
}

/// A single output figure: what to draw and how.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub name: String,
    pub kind: ChartKind,
    pub opts: ChartOpts,
    pub series: Vec<Series>,
}

/// Computes the charts of `figure`. A latency-throughput figure yields one
/// chart per latency type, every other figure a single chart.
pub fn charts(
    config: &PlotConfig,
    db: &ResultsDB,
    figure: &FigureSpec,
) -> Result<Vec<Chart>, Report> {
    let charts = match figure {
        FigureSpec::LatencyThroughput {
            name,
            metrics,
            latencies,
            log_y,
            y_max,
        } => latencies
            .iter()
            .map(|&latency| -> Result<Chart, Report> {
                let series =
                    series::latency_throughput(db, config, metrics, latency)?;
                Ok(Chart {
                    name: format!("{}-{}", name, latency.file_suffix()),
                    kind: ChartKind::Lines,
                    opts: ChartOpts {
                        xlabel: PlotFmt::throughput_label().to_string(),
                        ylabel: PlotFmt::latency_label(latency),
                        log_y: *log_y,
                        y_max: *y_max,
                        markers: true,
                        ..Default::default()
                    },
                    series,
                })
            })
            .collect::<Result<Vec<_>, Report>>()?,
        FigureSpec::ThroughputBars {
            name,
            metrics,
            xlabel,
            log_y,
        } => vec![Chart {
            name: name.clone(),
            kind: ChartKind::Bars,
            opts: ChartOpts {
                xlabel: xlabel.clone(),
                ylabel: PlotFmt::throughput_label().to_string(),
                log_y: *log_y,
                ..Default::default()
            },
            series: series::throughput_bars(db, config, metrics)?,
        }],
        FigureSpec::LatencyCdf {
            name,
            inputs,
            log_x,
        } => {
            let mut all_series = Vec::with_capacity(inputs.len());
            for input in inputs {
                let histogram = run_latency_histogram(&input.run_dir)
                    .wrap_err_with(|| {
                        format!("load histograms of {}", input.run_dir)
                    })?;
                all_series.push(series::latency_cdf(
                    &input.label,
                    &histogram,
                    CDF_SCALE,
                ));
            }
            vec![Chart {
                name: name.clone(),
                kind: ChartKind::Cdf,
                opts: ChartOpts {
                    xlabel: String::from("Latency (ms)"),
                    ylabel: PlotFmt::cdf_label().to_string(),
                    log_x: *log_x,
                    y_max: Some(1.0),
                    ..Default::default()
                },
                series: all_series,
            }]
        }
        FigureSpec::Timeline {
            name,
            inputs,
            x_max,
            y_max,
        } => {
            let mut all_series = Vec::with_capacity(inputs.len());
            for input in inputs {
                let hists = HistsFile::load(&input.path)?;
                all_series.push(series::throughput_timeline(
                    &input.label,
                    hists.tput_log()?,
                    input.offset_secs,
                    input.zero_ends,
                ));
            }
            vec![Chart {
                name: name.clone(),
                kind: ChartKind::Lines,
                opts: ChartOpts {
                    xlabel: PlotFmt::time_label().to_string(),
                    ylabel: PlotFmt::throughput_label().to_string(),
                    x_max: *x_max,
                    y_max: *y_max,
                    ..Default::default()
                },
                series: all_series,
            }]
        }
        FigureSpec::CacheTimeline {
            name,
            path,
            start_diff,
            x_max,
        } => {
            let log = CacheLog::load(path, *start_diff)?;
            vec![Chart {
                name: name.clone(),
                kind: ChartKind::Lines,
                opts: ChartOpts {
                    xlabel: PlotFmt::time_label().to_string(),
                    ylabel: String::from("Percentage"),
                    x_max: *x_max,
                    y_max: Some(100.0),
                    ..Default::default()
                },
                series: series::cache_timeline(&log),
            }]
        }
    };
    Ok(charts)
}

#[cfg(feature = "pyo3")]
pub use render::{render, render_bars, render_cdf, render_lines};

#[cfg(feature = "pyo3")]
mod render {
    use super::{Chart, ChartKind, ChartOpts, PlotConfig};
    use crate::fmt::PlotFmt;
    use crate::plot::{Axes, Figure, PyPlot};
    use crate::series::{self, BarLayout, Series};
    use crate::{pydict, pytry};
    use color_eyre::eyre::WrapErr;
    use color_eyre::Report;
    use pyo3::prelude::*;

    const FIGSIZE: (f64, f64) = (8.0, 4.5);

    pub fn render(
        py: Python<'_>,
        config: &PlotConfig,
        chart: &Chart,
    ) -> Result<(), Report> {
        match chart.kind {
            ChartKind::Lines => render_lines(
                py,
                config,
                &chart.name,
                &chart.series,
                &chart.opts,
            ),
            ChartKind::Bars => render_bars(
                py,
                config,
                &chart.name,
                &chart.series,
                &chart.opts,
            ),
            ChartKind::Cdf => {
                render_cdf(py, config, &chart.name, &chart.series, &chart.opts)
            }
        }
    }

    /// Draws each series as a line, with error bars when it has a
    /// confidence interval.
    pub fn render_lines(
        py: Python<'_>,
        config: &PlotConfig,
        name: &str,
        all_series: &[Series],
        opts: &ChartOpts,
    ) -> Result<(), Report> {
        let plt = pytry!(py, PyPlot::new(py));
        let (fig, ax) = new_figure(py, &plt)?;

        for (index, series) in all_series.iter().enumerate() {
            let kwargs = pytry!(
                py,
                pydict!(
                    py,
                    ("label", series.label.as_str()),
                    ("color", PlotFmt::color(index)),
                    ("linestyle", PlotFmt::linestyle(index)),
                    ("linewidth", 1),
                )
            );
            if opts.markers {
                pytry!(py, kwargs.set_item("marker", PlotFmt::marker(index)));
            }
            match &series.ci {
                Some(ci) => {
                    pytry!(py, kwargs.set_item("yerr", ci.clone()));
                    pytry!(py, kwargs.set_item("capsize", 3));
                    pytry!(
                        py,
                        ax.errorbar(
                            series.x.clone(),
                            series.y.clone(),
                            Some(kwargs)
                        )
                    );
                }
                None => {
                    pytry!(
                        py,
                        ax.plot(
                            series.x.clone(),
                            series.y.clone(),
                            Some(kwargs)
                        )
                    );
                }
            }
        }

        decorate(py, &ax, opts, all_series.len())?;
        save(py, &plt, fig, config, name)
    }

    /// Draws the series as groups of bars, one group per x value of the
    /// first series.
    pub fn render_bars(
        py: Python<'_>,
        config: &PlotConfig,
        name: &str,
        all_series: &[Series],
        opts: &ChartOpts,
    ) -> Result<(), Report> {
        let plt = pytry!(py, PyPlot::new(py));
        let (fig, ax) = new_figure(py, &plt)?;

        let layout = BarLayout::default();
        let groups = all_series.iter().map(Series::len).max().unwrap_or(0);
        for (index, series) in all_series.iter().enumerate() {
            let kwargs = pytry!(
                py,
                pydict!(
                    py,
                    ("label", series.label.as_str()),
                    ("width", layout.width),
                    ("color", PlotFmt::grey(index)),
                    ("hatch", PlotFmt::hatch(index)),
                    ("edgecolor", "black"),
                    ("align", "center"),
                    ("zorder", 3),
                )
            );
            if let Some(ci) = &series.ci {
                pytry!(py, kwargs.set_item("yerr", ci.clone()));
                pytry!(py, kwargs.set_item("capsize", 3));
                pytry!(py, kwargs.set_item("ecolor", "#5c5c5c"));
            }
            let x = layout.positions(index, series.len());
            pytry!(py, ax.bar(x, series.y.clone(), Some(kwargs)));
        }

        // label groups with the x values of the first series
        if let Some(first) = all_series.first() {
            pytry!(py, ax.set_xticks(layout.ticks(all_series.len(), groups)));
            let labels: Vec<_> =
                first.x.iter().map(|x| format!("{}", x)).collect();
            pytry!(py, ax.set_xticklabels(labels));
        }
        let kwargs = pytry!(py, pydict!(py, ("axis", "y"), ("zorder", 0)));
        pytry!(py, ax.grid(Some(kwargs)));

        decorate(py, &ax, opts, all_series.len())?;
        save(py, &plt, fig, config, name)
    }

    /// Draws each series as a stepped cumulative distribution.
    pub fn render_cdf(
        py: Python<'_>,
        config: &PlotConfig,
        name: &str,
        all_series: &[Series],
        opts: &ChartOpts,
    ) -> Result<(), Report> {
        let stepped: Vec<_> = all_series
            .iter()
            .map(|series| {
                let (x, y) = series::step_up_cdf(&series.x, &series.y);
                Series::new(&series.label, x, y)
            })
            .collect();
        let opts = ChartOpts {
            markers: false,
            ..opts.clone()
        };
        render_lines(py, config, name, &stepped, &opts)
    }

    fn new_figure<'p>(
        py: Python<'p>,
        plt: &PyPlot<'p>,
    ) -> Result<(Figure<'p>, Axes<'p>), Report> {
        let kwargs = pytry!(py, pydict!(py, ("figsize", FIGSIZE)));
        let (fig, ax) = pytry!(py, plt.subplots(Some(kwargs)));
        Ok((fig, ax))
    }

    fn decorate(
        py: Python<'_>,
        ax: &Axes<'_>,
        opts: &ChartOpts,
        series_count: usize,
    ) -> Result<(), Report> {
        pytry!(py, ax.set_xlabel(&opts.xlabel));
        pytry!(py, ax.set_ylabel(&opts.ylabel));

        if opts.log_x {
            pytry!(py, ax.set_xscale("log"));
        }
        if opts.log_y {
            pytry!(py, ax.set_yscale("log"));
        }
        if let Some(x_max) = opts.x_max {
            let kwargs = pytry!(py, pydict!(py, ("right", x_max)));
            pytry!(py, ax.set_xlim(Some(kwargs)));
        }
        // linear y axes start at zero
        let kwargs = pytry!(py, pydict!(py, ("top", opts.y_max)));
        if !opts.log_y {
            pytry!(py, kwargs.set_item("bottom", 0));
        }
        pytry!(py, ax.set_ylim(Some(kwargs)));

        // legend above the plot, in a single row when possible
        let kwargs = pytry!(
            py,
            pydict!(
                py,
                ("loc", "lower center"),
                ("bbox_to_anchor", (0.5, 1.0)),
                ("frameon", false),
                ("ncol", series_count.clamp(1, 6)),
            )
        );
        pytry!(py, ax.legend(Some(kwargs)));
        Ok(())
    }

    fn save(
        py: Python<'_>,
        plt: &PyPlot<'_>,
        fig: Figure<'_>,
        config: &PlotConfig,
        name: &str,
    ) -> Result<(), Report> {
        std::fs::create_dir_all(&config.fig_dir)
            .wrap_err_with(|| format!("create {}", config.fig_dir))?;
        for path in config.figure_paths(name) {
            let kwargs = pytry!(py, pydict!(py, ("bbox_inches", "tight")));
            pytry!(py, plt.savefig(&path, Some(kwargs)));
            tracing::info!("saved {}", path);
        }
        pytry!(py, plt.close(fig));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HistInput, TimelineInput};
    use crate::db::{READ_HISTS_FILE, WRITE_HISTS_FILE};

    #[test]
    fn timeline_chart() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join(WRITE_HISTS_FILE);
        std::fs::write(
            &path,
            r#"[{"TputLog":{"TimeSec":[1,2,3,],
                "Counts":[1000000,3000000,2000000,]}}]"#,
        )
        .expect("write should work");

        let config = PlotConfig::default();
        let figure = FigureSpec::Timeline {
            name: String::from("burst"),
            inputs: vec![TimelineInput {
                label: String::from("Write Requests"),
                path: path.display().to_string(),
                offset_secs: 0.0,
                zero_ends: true,
            }],
            x_max: Some(300.0),
            y_max: None,
        };
        let charts = charts(&config, &ResultsDB::default(), &figure)
            .expect("charts should be built");
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].kind, ChartKind::Lines);
        assert_eq!(charts[0].opts.xlabel, "Time (sec)");
        assert_eq!(charts[0].opts.x_max, Some(300.0));
        assert_eq!(charts[0].series[0].y, vec![0.0, 3.0, 0.0]);
    }

    #[test]
    fn cdf_chart() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(
            dir.path().join(READ_HISTS_FILE),
            r#"[{"Latency Histogram":{"latency":[1000,3000],"count":[1,1]}}]"#,
        )
        .expect("write should work");
        std::fs::write(
            dir.path().join(WRITE_HISTS_FILE),
            r#"[{"Latency Histogram":{"latency":[2000,3000],"count":[1,1]}}]"#,
        )
        .expect("write should work");

        let figure = FigureSpec::LatencyCdf {
            name: String::from("lats"),
            inputs: vec![HistInput {
                label: String::from("All"),
                run_dir: dir.path().display().to_string(),
            }],
            log_x: true,
        };
        let charts =
            charts(&PlotConfig::default(), &ResultsDB::default(), &figure)
                .expect("charts should be built");
        assert_eq!(charts[0].kind, ChartKind::Cdf);
        assert!(charts[0].opts.log_x);
        let series = &charts[0].series[0];
        assert_eq!(series.x, vec![1.0, 2.0, 3.0]);
        assert_eq!(series.y, vec![0.25, 0.5, 1.0]);
    }

    #[test]
    fn cache_chart() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("cache.csv");
        std::fs::write(
            &path,
            "10, 1, 0, 0, 5\n20, 2, 1, 3, 6\n30, 3, 2, 0, 7\n",
        )
        .expect("write should work");
        let figure = FigureSpec::CacheTimeline {
            name: String::from("cache"),
            path: path.display().to_string(),
            start_diff: 1,
            x_max: None,
        };
        let charts =
            charts(&PlotConfig::default(), &ResultsDB::default(), &figure)
                .expect("charts should be built");
        assert_eq!(charts[0].series.len(), 4);
        assert_eq!(charts[0].series[0].x, vec![5.0, 6.0]);
        assert_eq!(charts[0].series[0].y, vec![20.0, 30.0]);
    }

    #[test]
    fn latency_charts_need_results() {
        let figure = FigureSpec::LatencyThroughput {
            name: String::from("bs"),
            metrics: vec![crate::config::Metric {
                system: kawkab_exp::System::Kawkab,
                label: String::from("Kawkab"),
                param: crate::config::Param::BatchSize,
                points: vec![crate::config::Point {
                    res_file: String::from("write-results.json"),
                    prefix: String::from("rw-kw48"),
                    val: 100,
                    num_clients: None,
                    iats: vec![1.0],
                    from_hist: false,
                }],
            }],
            latencies: vec![db::LatencyType::Median],
            log_y: false,
            y_max: None,
        };
        let result =
            charts(&PlotConfig::default(), &ResultsDB::default(), &figure);
        assert!(result.is_err());
    }
}
