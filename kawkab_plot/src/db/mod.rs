mod cache_log;
mod histogram;
mod results_db;
mod run_data;
mod summary;

// Re-exports.
pub use cache_log::CacheLog;
pub use histogram::Histogram;
pub use results_db::{Entry, ResultsDB};
pub use run_data::{
    run_latency_histogram, strip_trailing_commas, HistsFile, RunData,
    TputLog, READ_HISTS_FILE, WRITE_HISTS_FILE,
};
pub use summary::{mean_and_conf, LatencyType, MeanConf, Summary};

use kawkab_exp::{System, TestId};

#[derive(Clone, Debug)]
pub struct Search {
    pub system: System,
    pub prefix: String,
    res_file: Option<String>,
    num_clients: Option<usize>,
    batch_size: Option<usize>,
    record_size: Option<usize>,
    write_ratio: Option<usize>,
    files_per_client: Option<usize>,
}

impl Search {
    pub fn new(system: System, prefix: impl ToString) -> Self {
        Self {
            system,
            prefix: prefix.to_string(),
            res_file: None,
            num_clients: None,
            batch_size: None,
            record_size: None,
            write_ratio: None,
            files_per_client: None,
        }
    }

    pub fn res_file(&mut self, res_file: impl ToString) -> &mut Self {
        self.res_file = Some(res_file.to_string());
        self
    }

    pub fn num_clients(&mut self, num_clients: usize) -> &mut Self {
        self.num_clients = Some(num_clients);
        self
    }

    pub fn batch_size(&mut self, batch_size: usize) -> &mut Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn record_size(&mut self, record_size: usize) -> &mut Self {
        self.record_size = Some(record_size);
        self
    }

    pub fn write_ratio(&mut self, write_ratio: usize) -> &mut Self {
        self.write_ratio = Some(write_ratio);
        self
    }

    pub fn files_per_client(&mut self, files_per_client: usize) -> &mut Self {
        self.files_per_client = Some(files_per_client);
        self
    }

    pub(crate) fn matches(&self, test_id: &TestId, res_file: &str) -> bool {
        let optional = |filter: Option<usize>, value: usize| {
            filter.map(|filter| filter == value).unwrap_or(true)
        };
        test_id.system == self.system
            && test_id.prefix == self.prefix
            && self
                .res_file
                .as_ref()
                .map(|filter| filter == res_file)
                .unwrap_or(true)
            && optional(self.num_clients, test_id.num_clients)
            && optional(self.batch_size, test_id.batch_size)
            && optional(self.record_size, test_id.record_size)
            && optional(self.write_ratio, test_id.write_ratio)
            && optional(self.files_per_client, test_id.files_per_client)
    }
}
