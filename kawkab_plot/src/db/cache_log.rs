use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Periodic cache statistics dumped by a kawkab server, in percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheLog {
    pub time_secs: Vec<f64>,
    pub cache_occupancy: Vec<f64>,
    pub local_store_occupancy: Vec<f64>,
    pub local_store_evictable: Vec<f64>,
    pub global_store_queue: Vec<f64>,
}

// columns of the headerless csv, in order
#[derive(Debug, Deserialize)]
struct CacheLogRow {
    cache_occupancy: f64,
    local_store_occupancy: f64,
    local_store_evictable: f64,
    global_store_queue: f64,
    time: f64,
}

impl CacheLog {
    pub fn load(
        path: impl AsRef<Path>,
        start_diff: usize,
    ) -> Result<Self, Report> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("open cache log {}", path.display()))?;
        Self::from_reader(file, start_diff)
            .wrap_err_with(|| format!("parse cache log {}", path.display()))
    }

    /// Parses the log, dropping the first `start_diff` rows (logged before
    /// the clients started) and shifting time so that clients start at 0.
    pub fn from_reader(
        reader: impl Read,
        start_diff: usize,
    ) -> Result<Self, Report> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut log = Self::default();
        for row in reader.deserialize().skip(start_diff) {
            let row: CacheLogRow = row?;
            log.time_secs.push(row.time.trunc() - start_diff as f64);
            log.cache_occupancy.push(row.cache_occupancy);
            log.local_store_occupancy.push(row.local_store_occupancy);
            log.local_store_evictable.push(row.local_store_evictable);
            log.global_store_queue.push(row.global_store_queue);
        }
        Ok(log)
    }

    pub fn len(&self) -> usize {
        self.time_secs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_secs.is_empty()
    }
}
