use crate::config::PlotConfig;
use crate::db::{run_latency_histogram, RunData, Search, Summary};
use color_eyre::eyre::{self, WrapErr};
use color_eyre::Report;
use kawkab_exp::{SerializationFormat, System, TestId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SNAPSHOT_SUFFIX: &str = "_run_data_snapshot.bincode.gz";
const HIST_SNAPSHOT_SUFFIX: &str = "_hist_run_data_snapshot.bincode.gz";

/// All runs of one test, as read from one result file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    // textual test id, the lookup key
    pub key: String,
    pub test_id: TestId,
    pub res_file: String,
    pub runs: Vec<RunData>,
    pub summary: Summary,
}

#[derive(Debug, Clone)]
struct LoadJob {
    test_id: TestId,
    res_file: String,
    from_hist: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ResultsDB {
    results: Vec<Entry>,
}

impl ResultsDB {
    /// Loads the results of every point of every figure in `config`.
    pub fn load(config: &PlotConfig) -> Result<Self, Report> {
        let jobs = Self::jobs(config);

        // track the number of loaded entries
        let loaded_entries = Arc::new(Mutex::new(0));
        let total_entries = jobs.len();

        let loads: Vec<_> = jobs
            .into_par_iter()
            .map(|job| {
                let loaded_entries = loaded_entries.clone();
                Self::load_entry(config, job, loaded_entries, total_entries)
            })
            .inspect(|entry| {
                if let Err(e) = entry {
                    tracing::warn!("error: {:?}", e);
                }
            })
            .collect();

        let mut results = Vec::with_capacity(loads.len());
        for entry in loads {
            results.push(entry.wrap_err("load entry")?);
        }
        Ok(Self { results })
    }

    pub fn from_entries(results: Vec<Entry>) -> Self {
        Self { results }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.results
    }

    // one job per (test, result file), in figure order
    fn jobs(config: &PlotConfig) -> Vec<LoadJob> {
        let mut jobs: Vec<LoadJob> = Vec::new();
        for figure in &config.figures {
            for metric in figure.metrics() {
                for point in &metric.points {
                    for &iat in &point.iats {
                        let test_id = config.test_id(metric, point, iat);
                        let exists = jobs.iter().any(|job| {
                            job.res_file == point.res_file
                                && job.from_hist == point.from_hist
                                && job.test_id.to_string()
                                    == test_id.to_string()
                        });
                        if !exists {
                            jobs.push(LoadJob {
                                test_id,
                                res_file: point.res_file.clone(),
                                from_hist: point.from_hist,
                            });
                        }
                    }
                }
            }
        }
        jobs
    }

    fn load_entry(
        config: &PlotConfig,
        job: LoadJob,
        loaded_entries: Arc<Mutex<usize>>,
        total_entries: usize,
    ) -> Result<Entry, Report> {
        // register load start time
        let start = std::time::Instant::now();

        let mut runs = Vec::with_capacity(config.test_runs.len());
        for &run in &config.test_runs {
            let run_data =
                Self::load_run(config, &job, run).wrap_err_with(|| {
                    format!("load run {} of {}", run, job.test_id)
                })?;
            runs.push(run_data);
        }
        let summary = Summary::from_runs(&runs);

        // register that a new entry is loaded
        let mut loaded_entries = loaded_entries
            .lock()
            .expect("locking loaded entries should work");
        *loaded_entries += 1;
        tracing::info!(
            "loaded {} {} after {:?} | {} of {}",
            job.test_id,
            job.res_file,
            start.elapsed(),
            loaded_entries,
            total_entries,
        );

        Ok(Entry {
            key: job.test_id.to_string(),
            test_id: job.test_id,
            res_file: job.res_file,
            runs,
            summary,
        })
    }

    fn load_run(
        config: &PlotConfig,
        job: &LoadJob,
        run: usize,
    ) -> Result<RunData, Report> {
        let run_dir = config.run_dir(&job.test_id, run);
        let path = format!("{}/{}", run_dir, job.res_file);
        let suffix = if job.from_hist {
            HIST_SNAPSHOT_SUFFIX
        } else {
            SNAPSHOT_SUFFIX
        };

        // check if there's snapshot of the parsed run
        let snapshot = format!("{}{}", path, suffix);
        if Path::new(&snapshot).exists() {
            return kawkab_exp::deserialize(
                &snapshot,
                SerializationFormat::BincodeGz,
            )
            .wrap_err_with(|| {
                format!("deserialize run data snapshot {}", snapshot)
            });
        }

        let text = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("read {}", path))?;
        let mut run_data = match job.test_id.system {
            System::Kawkab => RunData::parse_kawkab(&text),
            System::Btrdb => RunData::parse_btrdb(&text),
        }
        .wrap_err_with(|| format!("parse {}", path))?;

        if job.from_hist {
            if job.test_id.system != System::Kawkab {
                eyre::bail!("only kawkab runs have latency histograms");
            }
            let histogram = run_latency_histogram(&run_dir)?;
            tracing::debug!(
                "{} p50={} p95={} p99={} from histograms",
                path,
                histogram.percentile(0.50),
                histogram.percentile(0.95),
                histogram.percentile(0.99)
            );
            run_data.override_latencies(&histogram);
        }

        // create snapshot
        kawkab_exp::serialize(
            &run_data,
            &snapshot,
            SerializationFormat::BincodeGz,
        )
        .wrap_err_with(|| format!("serialize run data snapshot {}", snapshot))?;
        Ok(run_data)
    }

    /// The entry of `test_id` read from `res_file`; without a result file,
    /// the last entry loaded for `test_id`.
    pub fn get(
        &self,
        test_id: &TestId,
        res_file: Option<&str>,
    ) -> Option<&Entry> {
        let key = test_id.to_string();
        self.results.iter().rev().find(|entry| {
            entry.key == key
                && res_file
                    .map(|res_file| entry.res_file == res_file)
                    .unwrap_or(true)
        })
    }

    pub fn find(&self, search: &Search) -> Vec<&Entry> {
        self.results
            .iter()
            .filter(|entry| search.matches(&entry.test_id, &entry.res_file))
            .collect()
    }

    /// A database with only the entries matching `search`.
    pub fn select(&self, search: &Search) -> Self {
        let results = self.find(search).into_iter().cloned().collect();
        Self { results }
    }

    /// Dumps every loaded entry as json into `output_dir/results.json`.
    pub fn data_to_json(
        &self,
        output_dir: impl AsRef<Path>,
    ) -> Result<(), Report> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)
            .wrap_err_with(|| format!("create {}", output_dir.display()))?;
        kawkab_exp::serialize(
            &self.results,
            output_dir.join("results.json"),
            SerializationFormat::Json,
        )
        .wrap_err("serialize results")
    }
}
