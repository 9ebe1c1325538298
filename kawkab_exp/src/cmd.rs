use crate::machine::{self, ExecOutput, Machine};
use crate::{SerializationFormat, Testbed};
use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Ad-hoc commands over a fixed set of target machines, used to deploy and
/// inspect an ec2 testbed between batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CmdConfig {
    pub targets: Vec<String>,
    pub ssh_username: String,
    pub key_file: Option<PathBuf>,
    // default source and destination of `sync`
    pub src: String,
    pub dst: String,
    // default command of `cmd`
    pub command: String,
    pub make_command: String,
}

impl Default for CmdConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            ssh_username: String::from("ubuntu"),
            key_file: None,
            src: String::from("kawkab/src"),
            dst: String::from("/home/ubuntu/kawkab/"),
            command: String::from("grep Exc /tmp/kawkab/servers/*"),
            make_command: String::from("cd /home/ubuntu/kawkab; mvn compile"),
        }
    }
}

impl CmdConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Report> {
        let path = path.as_ref();
        crate::deserialize(path, SerializationFormat::Json)
            .wrap_err_with(|| format!("load cmd config {}", path.display()))
    }
}

pub struct Targets {
    config: CmdConfig,
    machines: Vec<Machine>,
}

impl Targets {
    pub fn new(config: CmdConfig) -> Self {
        let machines = config
            .targets
            .iter()
            .map(|host| {
                Machine::new(
                    Testbed::Ec2,
                    host,
                    &config.ssh_username,
                    config.key_file.clone(),
                )
            })
            .collect();
        Self { config, machines }
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    /// Uploads the configured source to the configured destination.
    pub async fn sync(&self) -> Result<Vec<ExecOutput>, Report> {
        self.rsync(&self.config.src, &self.config.dst).await
    }

    pub async fn make(&self) -> Result<Vec<ExecOutput>, Report> {
        tracing::info!("running make command");
        self.run(&self.config.make_command).await
    }

    /// Runs `command` on every target, or the configured one if not set.
    pub async fn cmd(
        &self,
        command: Option<&str>,
    ) -> Result<Vec<ExecOutput>, Report> {
        let command = command.unwrap_or(&self.config.command);
        self.run(command).await
    }

    /// Keeps a session open on every target.
    pub async fn sleep(&self) -> Result<Vec<ExecOutput>, Report> {
        tracing::info!("sleeping");
        self.run("sleep 100d").await
    }

    pub async fn rsync(
        &self,
        src: &str,
        dst: &str,
    ) -> Result<Vec<ExecOutput>, Report> {
        tracing::info!("copying {} to {}", src, dst);
        let outputs = machine::copy_to_all(&self.machines, src, dst).await?;
        Ok(outputs.into_iter().map(|(_, output)| output).collect())
    }

    /// Downloads `src` from every target into `dst`.
    pub async fn download(
        &self,
        src: &str,
        dst: &str,
    ) -> Result<Vec<ExecOutput>, Report> {
        tracing::info!("downloading {} to {}", src, dst);
        let mut outputs = Vec::with_capacity(self.machines.len());
        for result in machine::copy_from_all(&self.machines, src, dst).await
        {
            outputs.push(result?);
        }
        Ok(outputs)
    }

    async fn run(&self, command: &str) -> Result<Vec<ExecOutput>, Report> {
        let outputs =
            machine::exec_parallel(&self.machines, command, false).await?;
        Ok(outputs.into_iter().map(|(_, output)| output).collect())
    }
}
