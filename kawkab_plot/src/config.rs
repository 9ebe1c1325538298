use crate::db::LatencyType;
use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use kawkab_exp::{SerializationFormat, System, TestId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters shared by every test of a figure, unless the plotted
/// parameter overrides them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestDefaults {
    pub write_ratio: usize,
    pub num_clients: usize,
    pub clients_per_machine: usize,
    pub batch_size: usize,
    pub record_size: usize,
    pub files_per_client: usize,
}

impl Default for TestDefaults {
    fn default() -> Self {
        Self {
            write_ratio: 100,
            num_clients: 200,
            clients_per_machine: 10,
            batch_size: 10000,
            record_size: 16,
            files_per_client: 1,
        }
    }
}

/// The test parameter a metric varies across its points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Param {
    BatchSize,
    WriteRatio,
    RecordSize,
    NumClients,
    ClientsPerMachine,
    FilesPerClient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub res_file: String,
    pub prefix: String,
    // value of the metric's parameter at this point
    pub val: usize,
    #[serde(default)]
    pub num_clients: Option<usize>,
    pub iats: Vec<f64>,
    // recompute latencies from the run's histograms
    #[serde(default)]
    pub from_hist: bool,
}

/// A line (or a bar group) of a figure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub system: System,
    pub label: String,
    pub param: Param,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    Pdf,
    Eps,
    Png,
}

impl Format {
    pub fn extension(&self) -> &str {
        match self {
            Format::Pdf => "pdf",
            Format::Eps => "eps",
            Format::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistInput {
    pub label: String,
    pub run_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineInput {
    pub label: String,
    // a `*-results-hists.json` file
    pub path: String,
    #[serde(default)]
    pub offset_secs: f64,
    // zero the partial first and last seconds
    #[serde(default)]
    pub zero_ends: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FigureSpec {
    /// Latency against throughput, one figure per latency type.
    LatencyThroughput {
        name: String,
        metrics: Vec<Metric>,
        #[serde(default = "all_latencies")]
        latencies: Vec<LatencyType>,
        #[serde(default)]
        log_y: bool,
        #[serde(default)]
        y_max: Option<f64>,
    },
    /// Throughput of each point as grouped bars.
    ThroughputBars {
        name: String,
        metrics: Vec<Metric>,
        xlabel: String,
        #[serde(default)]
        log_y: bool,
    },
    /// Latency distribution of whole runs.
    LatencyCdf {
        name: String,
        inputs: Vec<HistInput>,
        #[serde(default)]
        log_x: bool,
    },
    /// Throughput over time.
    Timeline {
        name: String,
        inputs: Vec<TimelineInput>,
        #[serde(default)]
        x_max: Option<f64>,
        #[serde(default)]
        y_max: Option<f64>,
    },
    /// Server cache statistics over time.
    CacheTimeline {
        name: String,
        path: String,
        #[serde(default)]
        start_diff: usize,
        #[serde(default)]
        x_max: Option<f64>,
    },
}

fn all_latencies() -> Vec<LatencyType> {
    LatencyType::all().to_vec()
}

impl FigureSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::LatencyThroughput { name, .. }
            | Self::ThroughputBars { name, .. }
            | Self::LatencyCdf { name, .. }
            | Self::Timeline { name, .. }
            | Self::CacheTimeline { name, .. } => name,
        }
    }

    /// Metrics whose results must be loaded into the database.
    pub fn metrics(&self) -> &[Metric] {
        match self {
            Self::LatencyThroughput { metrics, .. }
            | Self::ThroughputBars { metrics, .. } => metrics,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub results_dir: String,
    pub fig_dir: String,
    pub defaults: TestDefaults,
    pub test_runs: Vec<usize>,
    pub formats: Vec<Format>,
    pub figures: Vec<FigureSpec>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            results_dir: String::from("../experiments/results"),
            fig_dir: String::from("figures"),
            defaults: TestDefaults::default(),
            test_runs: vec![1],
            formats: vec![Format::Pdf, Format::Eps],
            figures: Vec::new(),
        }
    }
}

impl PlotConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Report> {
        let path = path.as_ref();
        kawkab_exp::deserialize(path, SerializationFormat::Json)
            .wrap_err_with(|| format!("load plot config {}", path.display()))
    }

    /// Identifier of the test behind `point` at inter-arrival time `iat`.
    pub fn test_id(
        &self,
        metric: &Metric,
        point: &Point,
        iat: f64,
    ) -> TestId {
        let d = &self.defaults;
        let mut id = TestId {
            system: metric.system,
            prefix: point.prefix.clone(),
            num_clients: point.num_clients.unwrap_or(d.num_clients),
            clients_per_machine: d.clients_per_machine,
            batch_size: d.batch_size,
            record_size: d.record_size,
            files_per_client: d.files_per_client,
            write_ratio: d.write_ratio,
            iat,
        };
        match metric.param {
            Param::BatchSize => id.batch_size = point.val,
            Param::WriteRatio => id.write_ratio = point.val,
            Param::RecordSize => id.record_size = point.val,
            Param::NumClients => id.num_clients = point.val,
            Param::ClientsPerMachine => id.clients_per_machine = point.val,
            Param::FilesPerClient => id.files_per_client = point.val,
        }
        id
    }

    /// Directory of run `run` of a test.
    pub fn run_dir(&self, test_id: &TestId, run: usize) -> String {
        format!(
            "{}/{}/{}/run_{}",
            self.results_dir,
            test_id.system.dir_name(),
            test_id,
            run
        )
    }

    /// Paths of a figure, one per configured format.
    pub fn figure_paths(&self, name: &str) -> Vec<String> {
        self.formats
            .iter()
            .map(|format| {
                format!("{}/{}.{}", self.fig_dir, name, format.extension())
            })
            .collect()
    }
}
