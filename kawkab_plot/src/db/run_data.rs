use crate::db::Histogram;
use color_eyre::eyre::{self, WrapErr};
use color_eyre::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// histogram files written by kawkab clients next to their summary
pub const READ_HISTS_FILE: &str = "read-results-hists.json";
pub const WRITE_HISTS_FILE: &str = "write-results-hists.json";

/// Summary of a single run of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunData {
    #[serde(rename = "OpsTput")]
    pub ops_tput: f64,
    #[serde(rename = "DataTput")]
    pub data_tput: f64,
    #[serde(rename = "Records per second")]
    pub records_tput: f64,
    #[serde(rename = "Mean latency")]
    pub mean_latency: f64,
    #[serde(rename = "Median latency")]
    pub median_latency: f64,
    #[serde(rename = "95% latency")]
    pub p95_latency: f64,
    #[serde(rename = "99% latency")]
    pub p99_latency: f64,
    #[serde(rename = "Min latency")]
    pub min_latency: f64,
    #[serde(rename = "Max latency")]
    pub max_latency: f64,
}

impl RunData {
    /// Parses a kawkab client summary. The file is scanned for `key:value`
    /// tokens rather than parsed as JSON, since clients don't always write
    /// valid JSON; tokens that don't look like a numeric pair are skipped.
    pub fn parse_kawkab(text: &str) -> Result<Self, Report> {
        let mut values = HashMap::new();
        for token in text.split_whitespace() {
            let parts: Vec<_> = token.split(':').collect();
            if parts.len() != 2 {
                continue;
            }
            let key = parts[0].replace('"', "");
            let value = match parts[1].replace(',', "").parse::<f64>() {
                Ok(value) => value,
                Err(_) => continue,
            };
            if let Some(key) = canonical_key(&key) {
                values.insert(key, value);
            }
        }

        let field = |key: &str| {
            values.get(key).copied().ok_or_else(|| {
                eyre::eyre!("kawkab results have no {:?}", key)
            })
        };
        Ok(Self {
            ops_tput: field("OpsTput")?,
            data_tput: field("DataTput")?,
            records_tput: field("Records per second")?,
            mean_latency: field("Mean latency")?,
            median_latency: field("Median latency")?,
            p95_latency: field("95% latency")?,
            p99_latency: field("99% latency")?,
            min_latency: field("Min latency")?,
            max_latency: field("Max latency")?,
        })
    }

    /// Parses a BTrDB client summary, a JSON object that may miss the comma
    /// after its median line.
    pub fn parse_btrdb(text: &str) -> Result<Self, Report> {
        let fixed: Vec<_> = text
            .lines()
            .map(|line| {
                if line.starts_with("\"Median") && !line.ends_with(',') {
                    format!("{},", line)
                } else {
                    line.to_string()
                }
            })
            .collect();
        let json = strip_trailing_commas(&fixed.join("\n"));
        serde_json::from_str(&json).wrap_err("parse btrdb results")
    }

    /// Replaces the latencies with the ones of `histogram`.
    pub fn override_latencies(&mut self, histogram: &Histogram) {
        self.min_latency = histogram.min();
        self.max_latency = histogram.max();
        self.mean_latency = histogram.mean();
        self.median_latency = histogram.percentile(0.50);
        self.p95_latency = histogram.percentile(0.95);
        self.p99_latency = histogram.percentile(0.99);
    }
}

fn canonical_key(key: &str) -> Option<&'static str> {
    let key = match key {
        "opsPs" => "OpsTput",
        "thrMBps" => "DataTput",
        "recsPs" => "Records per second",
        "meanLat" => "Mean latency",
        "50%Lat" => "Median latency",
        "95%Lat" => "95% latency",
        "99%Lat" => "99% latency",
        "minLat" => "Min latency",
        "maxLat" => "Max latency",
        _ => return None,
    };
    Some(key)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyHistogram {
    pub latency: Vec<u64>,
    pub count: Vec<u64>,
}

/// Completed requests per second over the duration of a test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TputLog {
    #[serde(rename = "TimeSec")]
    pub time_secs: Vec<f64>,
    #[serde(rename = "Counts")]
    pub counts: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistsEntry {
    #[serde(rename = "Latency Histogram", default)]
    pub latency_histogram: Option<LatencyHistogram>,
    #[serde(rename = "TputLog", default)]
    pub tput_log: Option<TputLog>,
    #[serde(rename = "50%Lat", default)]
    pub p50_latency: Option<f64>,
    #[serde(rename = "95%Lat", default)]
    pub p95_latency: Option<f64>,
    #[serde(rename = "99%Lat", default)]
    pub p99_latency: Option<f64>,
}

/// Content of a `*-results-hists.json` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistsFile {
    entries: Vec<HistsEntry>,
}

impl HistsFile {
    pub fn parse(text: &str) -> Result<Self, Report> {
        let json = strip_trailing_commas(text);
        let entries =
            serde_json::from_str(&json).wrap_err("parse histograms file")?;
        Ok(Self { entries })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Report> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("read {}", path.display()))?;
        Self::parse(&text)
            .wrap_err_with(|| format!("parse {}", path.display()))
    }

    fn first(&self) -> Result<&HistsEntry, Report> {
        self.entries
            .first()
            .ok_or_else(|| eyre::eyre!("histograms file has no entries"))
    }

    pub fn latency_histogram(&self) -> Result<Histogram, Report> {
        let buckets = self
            .first()?
            .latency_histogram
            .as_ref()
            .ok_or_else(|| eyre::eyre!("no latency histogram"))?;
        Histogram::from_buckets(&buckets.latency, &buckets.count)
    }

    pub fn tput_log(&self) -> Result<&TputLog, Report> {
        self.first()?
            .tput_log
            .as_ref()
            .ok_or_else(|| eyre::eyre!("no throughput log"))
    }
}

/// Merged read and write latency histograms of a run directory.
pub fn run_latency_histogram(
    run_dir: impl AsRef<Path>,
) -> Result<Histogram, Report> {
    let run_dir = run_dir.as_ref();
    let mut histogram =
        HistsFile::load(run_dir.join(READ_HISTS_FILE))?.latency_histogram()?;
    let writes =
        HistsFile::load(run_dir.join(WRITE_HISTS_FILE))?.latency_histogram()?;
    histogram.merge(&writes);
    Ok(histogram)
}

/// Removes commas that directly precede a closing bracket or brace, outside
/// of strings. Kawkab clients leave them after the last array element.
pub fn strip_trailing_commas(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = json.chars().peekable();
    while let Some(c) = chars.next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                // look past whitespace for the next significant char
                let rest: String = chars
                    .clone()
                    .skip_while(|next| next.is_whitespace())
                    .take(1)
                    .collect();
                if rest != "]" && rest != "}" {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const KAWKAB_RESULTS: &str = r#"{ "reqs":120000, "opsPs":2000.00,
"thrMBps":3.05, "meanLat":1520.50, "50%Lat":1200.00, "95%Lat":4100.00,
"99%Lat":9000.00, "minLat":310.00, "maxLat":25000.00, "recsPs":200000.00,
"25%Lat":900.00, "75%Lat":2000.00,
"Latency CDF":[0.1,0.5,1.0,],
"TputLog":{"TimeSec":[1,2,3,], "Counts":[10,20,30,]}
}"#;

    const BTRDB_RESULTS: &str = r#"{
"OpsTput": 1000.5,
"DataTput": 2.5,
"Records per second": 50000,
"Mean latency": 900,
"Median latency": 800
"95% latency": 2000,
"99% latency": 4000,
"Min latency": 100,
"Max latency": 9000
}"#;

    #[test]
    fn kawkab_results() {
        let run = RunData::parse_kawkab(KAWKAB_RESULTS)
            .expect("kawkab results should parse");
        assert_eq!(run.ops_tput, 2000.0);
        assert_eq!(run.data_tput, 3.05);
        assert_eq!(run.records_tput, 200000.0);
        assert_eq!(run.mean_latency, 1520.5);
        assert_eq!(run.median_latency, 1200.0);
        assert_eq!(run.p95_latency, 4100.0);
        assert_eq!(run.p99_latency, 9000.0);
        assert_eq!(run.min_latency, 310.0);
        assert_eq!(run.max_latency, 25000.0);
    }

    #[test]
    fn kawkab_results_missing_field() {
        let result = RunData::parse_kawkab(r#"{ "opsPs":2000.00 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn btrdb_results() {
        let run = RunData::parse_btrdb(BTRDB_RESULTS)
            .expect("btrdb results should parse");
        assert_eq!(run.ops_tput, 1000.5);
        assert_eq!(run.records_tput, 50000.0);
        assert_eq!(run.median_latency, 800.0);
        assert_eq!(run.max_latency, 9000.0);
    }

    #[test]
    fn trailing_commas() {
        assert_eq!(strip_trailing_commas("[1,2,3,]"), "[1,2,3]");
        assert_eq!(strip_trailing_commas("{\"a\":[1, ],\n}"), "{\"a\":[1 ]\n}");
        // commas inside strings are kept
        assert_eq!(strip_trailing_commas(r#"["a,]",]"#), r#"["a,]"]"#);
        assert_eq!(strip_trailing_commas(r#"["a\",]"]"#), r#"["a\",]"]"#);
    }

    #[test]
    fn hists_file() {
        let text = r#"[ { "50%Lat":1200.0, "95%Lat":4100.0, "99%Lat":9000.0,
            "Latency Histogram":{"latency":[100,200,300,], "count":[1,2,1,]},
            "TputLog":{"TimeSec":[1,2,], "Counts":[1000000,2000000,]} } ]"#;
        let hists = HistsFile::parse(text).expect("hists should parse");
        let histogram =
            hists.latency_histogram().expect("histogram should exist");
        assert_eq!(histogram.count(), 4);
        assert_eq!(histogram.percentile(0.5), 200.0);
        let tput = hists.tput_log().expect("tput log should exist");
        assert_eq!(tput.time_secs, vec![1.0, 2.0]);
        assert_eq!(tput.counts, vec![1000000.0, 2000000.0]);
    }

    #[test]
    fn latencies_from_histograms() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(
            dir.path().join(READ_HISTS_FILE),
            r#"[{"Latency Histogram":{"latency":[1,2],"count":[1,1]}}]"#,
        )
        .expect("write should work");
        std::fs::write(
            dir.path().join(WRITE_HISTS_FILE),
            r#"[{"Latency Histogram":{"latency":[3,4],"count":[1,1]}}]"#,
        )
        .expect("write should work");

        let histogram =
            run_latency_histogram(dir.path()).expect("histograms should load");
        let mut run = RunData::parse_kawkab(KAWKAB_RESULTS)
            .expect("kawkab results should parse");
        run.override_latencies(&histogram);
        assert_eq!(run.min_latency, 1.0);
        assert_eq!(run.max_latency, 4.0);
        assert_eq!(run.mean_latency, 2.5);
        assert_eq!(run.median_latency, 2.5);
        assert!((run.p95_latency - 3.85).abs() < 1e-9);
        // throughput is untouched
        assert_eq!(run.records_tput, 200000.0);
    }

    #[test]
    fn empty_hists_file() {
        let hists = HistsFile::parse("[]").expect("empty list should parse");
        assert!(hists.latency_histogram().is_err());
    }
}
