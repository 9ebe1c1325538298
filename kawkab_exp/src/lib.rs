#![deny(rust_2018_idioms)]

pub mod cmd;
pub mod config;
pub mod machine;
pub mod progress;
pub mod sweep;
pub mod test_id;
pub mod util;

// Re-exports.
pub use config::ExperimentConfig;
pub use machine::{Hosts, Machine, Machines};
pub use test_id::TestId;

use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Testbed {
    // lab machines sharing a home directory
    Cluster,
    Ec2,
    // every host is this machine
    Local,
}

impl Testbed {
    pub fn is_ec2(&self) -> bool {
        self == &Testbed::Ec2
    }

    /// Command that prints something while a process named `pname` is alive.
    pub fn pgrep_command(&self, pname: &str) -> String {
        match self {
            Testbed::Ec2 => format!("pgrep -xl {}", pname),
            Testbed::Cluster | Testbed::Local => {
                format!("pgrep -fl {} | grep java", pname)
            }
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
)]
pub enum System {
    Kawkab,
    Btrdb,
}

impl System {
    pub fn name(&self) -> &str {
        match self {
            System::Kawkab => "Kawkab",
            System::Btrdb => "BTrDB",
        }
    }

    /// Name of the directory holding this system's results.
    pub fn dir_name(&self) -> &str {
        match self {
            System::Kawkab => "kawkab",
            System::Btrdb => "btrdb",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationFormat {
    Json,
    BincodeGz,
}

pub fn serialize<T>(
    data: T,
    file: impl AsRef<Path>,
    format: SerializationFormat,
) -> Result<(), Report>
where
    T: serde::Serialize,
{
    // if the file does not exist it will be created, otherwise truncated
    let file = std::fs::File::create(file).wrap_err("serialize create file")?;
    let buf = std::io::BufWriter::new(file);
    match format {
        SerializationFormat::Json => {
            serde_json::to_writer_pretty(buf, &data)
                .wrap_err("serialize json")?;
        }
        SerializationFormat::BincodeGz => {
            let mut gz = flate2::write::GzEncoder::new(
                buf,
                flate2::Compression::fast(),
            );
            bincode::serialize_into(&mut gz, &data)
                .wrap_err("serialize bincode")?;
            gz.finish().wrap_err("serialize gz finish")?;
        }
    }
    Ok(())
}

pub fn deserialize<T>(
    file: impl AsRef<Path>,
    format: SerializationFormat,
) -> Result<T, Report>
where
    T: serde::de::DeserializeOwned,
{
    // open the file in read-only
    let file = std::fs::File::open(file).wrap_err("deserialize open file")?;
    let buf = std::io::BufReader::new(file);
    let data = match format {
        SerializationFormat::Json => {
            serde_json::from_reader(buf).wrap_err("deserialize json")?
        }
        SerializationFormat::BincodeGz => {
            let gz = flate2::read::GzDecoder::new(buf);
            bincode::deserialize_from(gz).wrap_err("deserialize bincode")?
        }
    };
    Ok(data)
}

/// Installs a plain fmt subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn pgrep_per_testbed() {
        assert_eq!(Testbed::Ec2.pgrep_command("java"), "pgrep -xl java");
        assert_eq!(
            Testbed::Cluster.pgrep_command("java"),
            "pgrep -fl java | grep java"
        );
    }

    #[test]
    fn serialize_both_formats() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut data = BTreeMap::new();
        data.insert(String::from("opsPs"), 1200u64);
        data.insert(String::from("recsPs"), 120000u64);

        for (name, format) in [
            ("data.json", SerializationFormat::Json),
            ("data.bincode.gz", SerializationFormat::BincodeGz),
        ] {
            let path = dir.path().join(name);
            serialize(&data, &path, format).expect("serialize should work");
            let loaded: BTreeMap<String, u64> =
                deserialize(&path, format).expect("deserialize should work");
            assert_eq!(loaded, data);
        }
    }
}
