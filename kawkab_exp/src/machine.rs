use crate::{ExperimentConfig, Testbed};
use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use std::path::PathBuf;
use std::time::Duration;

// delay between two checks of a process that is still running
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Machine {
    Remote {
        host: String,
        username: String,
        key_file: Option<PathBuf>,
    },
    // commands run on this machine, but the host is still advertised to
    // the processes started
    Local {
        host: String,
    },
}

impl Machine {
    pub fn new(
        testbed: Testbed,
        host: impl ToString,
        username: impl ToString,
        key_file: Option<PathBuf>,
    ) -> Self {
        let host = host.to_string();
        match testbed {
            Testbed::Local => Self::Local { host },
            Testbed::Cluster | Testbed::Ec2 => Self::Remote {
                host,
                username: username.to_string(),
                key_file,
            },
        }
    }

    /// The machine driving the experiments.
    pub fn localhost() -> Self {
        Self::Local {
            host: String::from("127.0.0.1"),
        }
    }

    pub fn host(&self) -> &str {
        match self {
            Self::Remote { host, .. } => host,
            Self::Local { host } => host,
        }
    }

    pub async fn exec(
        &self,
        command: impl ToString,
        sudo: bool,
    ) -> Result<ExecOutput, Report> {
        Self::exec_command(self.prepare_exec(command, sudo))
            .await
            .wrap_err_with(|| format!("exec at {}", self.host()))
    }

    pub fn prepare_exec(
        &self,
        command: impl ToString,
        sudo: bool,
    ) -> tokio::process::Command {
        let command = if sudo {
            format!("sudo {}", command.to_string())
        } else {
            command.to_string()
        };
        match self {
            Self::Remote {
                host,
                username,
                key_file,
            } => Self::prepare_ssh_exec(
                username,
                host,
                key_file.as_ref(),
                command,
            ),
            Self::Local { .. } => Self::create_command(command),
        }
    }

    /// Runs `commands` one after the other on this machine.
    pub async fn exec_sequence(
        &self,
        commands: &[String],
        sudo: bool,
    ) -> Result<Vec<ExecOutput>, Report> {
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            outputs.push(self.exec(command, sudo).await?);
        }
        Ok(outputs)
    }

    pub async fn copy_to(
        &self,
        local_path: &str,
        remote_path: &str,
    ) -> Result<ExecOutput, Report> {
        let command = match self {
            Self::Remote {
                host,
                username,
                key_file,
            } => format!(
                "rsync -iprl {}{} {}@{}:{}",
                Self::rsync_ssh(username, key_file.as_ref()),
                local_path,
                username,
                host,
                remote_path
            ),
            Self::Local { .. } => Self::local_copy(local_path, remote_path),
        };
        Self::exec_command(Self::create_command(command))
            .await
            .wrap_err_with(|| format!("copy to {}", self.host()))
    }

    pub async fn copy_from(
        &self,
        remote_path: &str,
        local_path: &str,
    ) -> Result<ExecOutput, Report> {
        let command = match self {
            Self::Remote {
                host,
                username,
                key_file,
            } => format!(
                "rsync -zaiprl {}{}@{}:{} {}",
                Self::rsync_ssh(username, key_file.as_ref()),
                username,
                host,
                remote_path,
                local_path
            ),
            Self::Local { .. } => Self::local_copy(remote_path, local_path),
        };
        Self::exec_command(Self::create_command(command))
            .await
            .wrap_err_with(|| format!("copy from {}", self.host()))
    }

    fn rsync_ssh(username: &str, key_file: Option<&PathBuf>) -> String {
        match key_file {
            Some(key_file) => format!(
                "-e \"ssh -l {} -i {} -o StrictHostKeyChecking=no\" ",
                username,
                key_file.display()
            ),
            None => String::new(),
        }
    }

    fn local_copy(from: &str, to: &str) -> String {
        format!("cp -r {} {}", from, to)
    }

    fn prepare_ssh_exec(
        username: &str,
        host: &str,
        key_file: Option<&PathBuf>,
        command: impl ToString,
    ) -> tokio::process::Command {
        let identity = key_file
            .map(|key_file| format!("-i {} ", key_file.display()))
            .unwrap_or_default();
        let ssh_command = format!(
            "ssh -4 {}-o StrictHostKeyChecking=no {}@{} {}",
            identity,
            username,
            host,
            Self::escape(command)
        );
        Self::create_command(ssh_command)
    }

    fn create_command(command_arg: impl ToString) -> tokio::process::Command {
        let command_arg = command_arg.to_string();
        tracing::debug!("{}", command_arg);
        let mut command = tokio::process::Command::new("bash");
        command.arg("-c");
        command.arg(command_arg);
        command
    }

    async fn exec_command(
        mut command: tokio::process::Command,
    ) -> Result<ExecOutput, Report> {
        let out = command.output().await.wrap_err("spawn command")?;
        let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        Ok(ExecOutput { stdout, stderr })
    }

    fn escape(command: impl ToString) -> String {
        format!("\"{}\"", command.to_string())
    }
}

/// Runs `command` on every machine concurrently and returns the outputs in
/// the same order as `machines`.
pub async fn exec_parallel<'a>(
    machines: impl IntoIterator<Item = &'a Machine>,
    command: &str,
    sudo: bool,
) -> Result<Vec<(&'a Machine, ExecOutput)>, Report> {
    let per_host = machines
        .into_iter()
        .map(|machine| (machine, vec![command.to_string()]))
        .collect();
    let outputs = exec_parallel_per_host(per_host, sudo).await?;
    Ok(outputs
        .into_iter()
        .map(|(machine, mut outputs)| {
            let output = outputs.pop().unwrap_or_default();
            (machine, output)
        })
        .collect())
}

/// Runs, concurrently across machines, each machine's own list of commands;
/// the commands of a single machine run in order.
pub async fn exec_parallel_per_host<'a>(
    per_host: Vec<(&'a Machine, Vec<String>)>,
    sudo: bool,
) -> Result<Vec<(&'a Machine, Vec<ExecOutput>)>, Report> {
    let execs = per_host.iter().map(|(machine, commands)| {
        machine.exec_sequence(commands, sudo)
    });
    let results = futures::future::join_all(execs).await;

    let mut outputs = Vec::with_capacity(results.len());
    for ((machine, _), result) in per_host.into_iter().zip(results) {
        let result = result?;
        result.iter().for_each(|output| log_output(machine, output));
        outputs.push((machine, result));
    }
    Ok(outputs)
}

/// Downloads `remote_path` from every machine into `local_path`. Copies
/// run concurrently; a failed copy is logged and doesn't stop the others.
pub async fn copy_from_all<'a>(
    machines: impl IntoIterator<Item = &'a Machine>,
    remote_path: &str,
    local_path: &str,
) -> Vec<Result<ExecOutput, Report>> {
    let copies = machines
        .into_iter()
        .map(|machine| machine.copy_from(remote_path, local_path));
    let results = futures::future::join_all(copies).await;
    for result in &results {
        if let Err(e) = result {
            tracing::warn!("copy failed: {:?}", e);
        }
    }
    results
}

/// Uploads `local_path` to `remote_path` on every machine concurrently.
pub async fn copy_to_all<'a>(
    machines: impl IntoIterator<Item = &'a Machine>,
    local_path: &str,
    remote_path: &str,
) -> Result<Vec<(&'a Machine, ExecOutput)>, Report> {
    let machines: Vec<_> = machines.into_iter().collect();
    let copies = machines
        .iter()
        .map(|machine| machine.copy_to(local_path, remote_path));
    let results = futures::future::join_all(copies).await;

    let mut outputs = Vec::with_capacity(results.len());
    for (machine, result) in machines.into_iter().zip(results) {
        let output = result?;
        log_output(machine, &output);
        outputs.push((machine, output));
    }
    Ok(outputs)
}

pub fn log_output(machine: &Machine, output: &ExecOutput) {
    if !output.stdout.is_empty() {
        tracing::info!("[{}] {}", machine.host(), output.stdout);
    }
    if !output.stderr.is_empty() {
        tracing::warn!("[{}] {}", machine.host(), output.stderr);
    }
}

/// Selects a group of hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hosts {
    // union of all groups, each host once
    All,
    Servers,
    Clients,
    Backends,
    Host(String),
    List(Vec<String>),
}

pub struct Machines {
    testbed: Testbed,
    backends: Vec<Machine>,
    servers: Vec<Machine>,
    clients: Vec<Machine>,
}

impl Machines {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        let to_machines = |hosts: &[String]| -> Vec<Machine> {
            hosts
                .iter()
                .map(|host| {
                    Machine::new(
                        config.testbed,
                        host,
                        &config.ssh_username,
                        config.key_file.clone(),
                    )
                })
                .collect()
        };
        Self {
            testbed: config.testbed,
            backends: to_machines(&config.backends),
            servers: to_machines(&config.servers),
            clients: to_machines(&config.clients),
        }
    }

    pub fn testbed(&self) -> Testbed {
        self.testbed
    }

    pub fn backends(&self) -> &[Machine] {
        &self.backends
    }

    pub fn servers(&self) -> &[Machine] {
        &self.servers
    }

    pub fn clients(&self) -> &[Machine] {
        &self.clients
    }

    pub fn hosts(&self, hosts: &Hosts) -> Vec<&Machine> {
        match hosts {
            Hosts::All => {
                let mut all: Vec<&Machine> = Vec::new();
                for machine in self
                    .servers
                    .iter()
                    .chain(self.clients.iter())
                    .chain(self.backends.iter())
                {
                    if !all.iter().any(|m| m.host() == machine.host()) {
                        all.push(machine);
                    }
                }
                all
            }
            Hosts::Servers => dedup(&self.servers),
            Hosts::Clients => dedup(&self.clients),
            Hosts::Backends => dedup(&self.backends),
            Hosts::Host(host) => self
                .hosts(&Hosts::All)
                .into_iter()
                .filter(|machine| machine.host() == host)
                .collect(),
            Hosts::List(list) => {
                let all = self.hosts(&Hosts::All);
                list.iter()
                    .filter_map(|host| {
                        all.iter().find(|machine| machine.host() == host)
                    })
                    .copied()
                    .collect()
            }
        }
    }

    pub async fn exec(
        &self,
        hosts: &Hosts,
        command: &str,
        sudo: bool,
    ) -> Result<Vec<(&Machine, ExecOutput)>, Report> {
        exec_parallel(self.hosts(hosts), command, sudo).await
    }

    /// Polls each host until no process named `pname` is running there. The
    /// `limit` on polling iterations is shared by all hosts. With `kill`,
    /// the processes are first killed.
    pub async fn wait_for_process(
        &self,
        hosts: &Hosts,
        pname: &str,
        limit: usize,
        kill: bool,
    ) -> Result<(), Report> {
        let machines = self.hosts(hosts);
        if kill {
            let command = format!("pkill -f {}", pname);
            exec_parallel(machines.iter().copied(), &command, false).await?;
        }

        let pgrep = self.testbed.pgrep_command(pname);
        let checks =
            poll_while_running(&machines, &pgrep, limit, WAIT_POLL_INTERVAL)
                .await?;
        if checks >= limit {
            tracing::warn!(
                "stopped waiting for {} after {} checks",
                pname,
                limit
            );
        }
        Ok(())
    }
}

/// Runs `pgrep` on each machine in turn, sleeping `interval` between checks
/// that still find the process, until it prints nothing. Returns how many
/// of the `limit` checks were spent.
async fn poll_while_running(
    machines: &[&Machine],
    pgrep: &str,
    limit: usize,
    interval: Duration,
) -> Result<usize, Report> {
    let mut count = 0;
    for machine in machines {
        tracing::info!("waiting at {}: {}", machine.host(), pgrep);
        while count < limit {
            let output = machine.exec(pgrep, false).await?;
            if !output.stderr.is_empty() {
                tracing::warn!("[{}] {}", machine.host(), output.stderr);
                break;
            }
            if output.stdout.is_empty() {
                break;
            }
            tokio::time::sleep(interval).await;
            count += 1;
        }
    }
    Ok(count)
}

fn dedup(machines: &[Machine]) -> Vec<&Machine> {
    let mut unique: Vec<&Machine> = Vec::with_capacity(machines.len());
    for machine in machines {
        if !unique.iter().any(|m| m.host() == machine.host()) {
            unique.push(machine);
        }
    }
    unique
}
