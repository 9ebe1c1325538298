use crate::args;
use crate::{SerializationFormat, Testbed};
use color_eyre::eyre::{self, WrapErr};
use color_eyre::Report;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SERVER_MAIN_CLASS: &str = "kawkab.fs.Main";
const CLIENT_MAIN_CLASS: &str = "kawkab.fs.testclient.ClientMain";

// clients don't wait before starting their workload
const CLIENT_WAIT_MS: usize = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub testbed: Testbed,
    pub ssh_username: String,
    pub key_file: Option<PathBuf>,
    pub backends: Vec<String>,
    pub servers: Vec<String>,
    // one client process is started per entry; repeat a host to start more
    pub clients: Vec<String>,
    pub kawkab_dir: String,
    // where each test's results are collected
    pub exp_dir: String,
    // scratch directory on every host
    pub run_dir: String,
    pub server_base_port: u16,
    pub client_base_port: u16,
    pub server_jvm: JvmConfig,
    pub client_jvm: JvmConfig,
    pub backend_script: String,
    pub sweep: SweepConfig,
    pub server_start_wait_secs: u64,
    pub client_wait_extra_secs: usize,
    pub server_stop_wait_limit: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            testbed: Testbed::Cluster,
            ssh_username: String::from("kawkab"),
            key_file: None,
            backends: Vec::new(),
            servers: Vec::new(),
            clients: Vec::new(),
            kawkab_dir: String::from("kawkab"),
            exp_dir: String::from("kawkab/experiments/results/kawkab"),
            run_dir: String::from("/tmp/kawkab"),
            server_base_port: 33433,
            client_base_port: 43567,
            server_jvm: JvmConfig::server(),
            client_jvm: JvmConfig::client(),
            backend_script: String::from("minio/reset.sh"),
            sweep: SweepConfig::default(),
            server_start_wait_secs: 25,
            client_wait_extra_secs: 60,
            server_stop_wait_limit: 5,
        }
    }
}

impl ExperimentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Report> {
        let path = path.as_ref();
        let config: Self =
            crate::deserialize(path, SerializationFormat::Json)
                .wrap_err_with(|| {
                    format!("load experiment config {}", path.display())
                })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Report> {
        if self.testbed.is_ec2() && self.key_file.is_none() {
            eyre::bail!("ec2 testbed requires a key file");
        }
        if self.servers.is_empty() {
            eyre::bail!("at least one server is required");
        }
        if self.clients.is_empty() {
            eyre::bail!("at least one client is required");
        }
        if self.sweep.clients_per_machine == 0 {
            eyre::bail!("clients_per_machine should be positive");
        }
        Ok(())
    }

    /// Total number of clients across all client machines.
    pub fn total_clients(&self) -> usize {
        self.clients.len() * self.sweep.clients_per_machine
    }

    /// Port of the server the client with id `cid` connects to.
    pub fn server_port(&self, cid: usize) -> u16 {
        let index = cid % self.servers.len();
        self.server_base_port + index as u16
    }

    /// Server host the client with id `cid` connects to.
    pub fn server_for(&self, cid: usize) -> &str {
        &self.servers[cid % self.servers.len()]
    }

    pub fn run_dirs(&self) -> RunDirs {
        RunDirs::new(&self.run_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JvmConfig {
    pub flags: String,
    // extra entries; the kawkab directory is always prepended
    pub classpath: Vec<String>,
    pub main_class: String,
}

impl JvmConfig {
    pub fn server() -> Self {
        Self {
            flags: String::from(
                "-ea -Xms12g -Xmx24g -XX:MaxDirectMemorySize=16684m \
                 -XX:+UnlockExperimentalVMOptions -XX:+UseZGC",
            ),
            classpath: Vec::new(),
            main_class: String::from(SERVER_MAIN_CLASS),
        }
    }

    pub fn client() -> Self {
        Self {
            flags: String::from(
                "-ea -XX:+UnlockExperimentalVMOptions -XX:+UseZGC",
            ),
            classpath: Vec::new(),
            main_class: String::from(CLIENT_MAIN_CLASS),
        }
    }

    pub fn classpath_arg(&self, kawkab_dir: &str) -> String {
        let mut entries = vec![
            String::from("."),
            kawkab_dir.to_string(),
            format!("{}/bin", kawkab_dir),
        ];
        entries.extend(self.classpath.iter().cloned());
        entries.join(":")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub batch_size: usize,
    pub write_ratio: usize,
    pub iats: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub test_types: Vec<String>,
    pub test_prefixes: Vec<String>,
    pub loads: Vec<LoadConfig>,
    pub record_sizes: Vec<usize>,
    pub files_per_client: Vec<usize>,
    pub test_runs: Vec<usize>,
    pub clients_per_machine: usize,
    pub test_duration_secs: usize,
    pub warmup_secs: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            test_types: vec![String::from("rw")],
            test_prefixes: vec![String::from("kw48")],
            loads: vec![LoadConfig {
                batch_size: 10000,
                write_ratio: 100,
                iats: vec![1.0],
            }],
            record_sizes: vec![16],
            files_per_client: vec![1],
            test_runs: vec![1],
            clients_per_machine: 10,
            test_duration_secs: 60,
            warmup_secs: 120,
        }
    }
}

/// Directories a test run writes into, on every host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirs {
    pub run: String,
    pub results: String,
    pub histograms: String,
    pub clients: String,
    pub servers: String,
    pub out: String,
}

impl RunDirs {
    fn new(run_dir: &str) -> Self {
        Self {
            run: run_dir.to_string(),
            results: format!("{}/results", run_dir),
            histograms: format!("{}/histograms", run_dir),
            clients: format!("{}/clients", run_dir),
            servers: format!("{}/servers", run_dir),
            out: format!("{}/out", run_dir),
        }
    }

    pub fn all(&self) -> Vec<&str> {
        vec![
            &self.run,
            &self.results,
            &self.histograms,
            &self.clients,
            &self.servers,
            &self.out,
        ]
    }

    pub fn run_file(&self, process_type: ProcessType) -> String {
        let dir = match process_type {
            ProcessType::Backend(_) => &self.out,
            ProcessType::Server(_) => &self.servers,
            ProcessType::Client(_) => &self.clients,
        };
        format!("{}/{}", dir, process_type.file_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessType {
    Backend(usize),
    Server(usize),
    Client(usize),
}

impl ProcessType {
    pub fn name(&self) -> String {
        match self {
            Self::Backend(index) => format!("backend_{:02}", index),
            Self::Server(index) => format!("server_{:02}", index),
            Self::Client(cid) => format!("client_{:02}", cid),
        }
    }

    fn file_name(&self) -> String {
        format!("{}.out", self.name())
    }
}

pub struct ServerConfig<'a> {
    server_id: usize,
    out_folder: &'a str,
    classpath: String,
    jvm: &'a JvmConfig,
}

impl<'a> ServerConfig<'a> {
    pub fn new(
        server_id: usize,
        config: &'a ExperimentConfig,
        dirs: &'a RunDirs,
    ) -> Self {
        Self {
            server_id,
            out_folder: &dirs.servers,
            classpath: config.server_jvm.classpath_arg(&config.kawkab_dir),
            jvm: &config.server_jvm,
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        args![
            self.jvm.flags,
            format!("-DnodeID={}", self.server_id),
            // where the server's cache dumps its statistics
            format!("-DoutFolder={}", self.out_folder),
            "-cp",
            self.classpath,
            self.jvm.main_class,
        ]
    }
}

/// Workload parameters shared by all clients of a test run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientWorkload {
    pub test_type: String,
    pub clients_per_machine: usize,
    pub total_clients: usize,
    pub batch_size: usize,
    pub record_size: usize,
    pub files_per_client: usize,
    pub write_ratio: usize,
    pub iat: f64,
    pub test_duration_secs: usize,
    pub warmup_secs: usize,
}

pub struct ClientConfig<'a> {
    cid: usize,
    master_id: usize,
    master_ip: &'a str,
    server_ip: &'a str,
    server_port: u16,
    master_port: u16,
    files_path: &'a str,
    classpath: String,
    jvm: &'a JvmConfig,
    workload: &'a ClientWorkload,
}

impl<'a> ClientConfig<'a> {
    pub fn new(
        cid: usize,
        (master_id, master_ip): (usize, &'a str),
        config: &'a ExperimentConfig,
        workload: &'a ClientWorkload,
    ) -> Self {
        Self {
            cid,
            master_id,
            master_ip,
            server_ip: config.server_for(cid),
            server_port: config.server_port(cid),
            master_port: config.client_base_port,
            files_path: &config.run_dir,
            classpath: config.client_jvm.classpath_arg(&config.kawkab_dir),
            jvm: &config.client_jvm,
            workload,
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let w = self.workload;
        args![
            self.jvm.flags,
            "-cp",
            self.classpath,
            self.jvm.main_class,
            format!("mport={}", self.master_port),
            format!("wt={}", CLIENT_WAIT_MS),
            format!("nc={}", w.clients_per_machine),
            format!("bs={}", w.batch_size),
            format!("rs={}", w.record_size),
            format!("nf={}", w.files_per_client),
            format!("fp={}", self.files_path),
            format!("typ={}", w.test_type),
            format!("tc={}", w.total_clients),
            format!("td={}", w.test_duration_secs),
            format!("wr={}", w.write_ratio),
            format!("iat={:.6}", w.iat),
            format!("wmup={}", w.warmup_secs),
            format!("cid={}", self.cid),
            format!("mid={}", self.master_id),
            format!("mip={}", self.master_ip),
            format!("sip={}", self.server_ip),
            format!("sport={}", self.server_port),
        ]
    }
}
