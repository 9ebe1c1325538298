use crate::config::{
    ClientConfig, ClientWorkload, ProcessType, RunDirs, ServerConfig,
    SweepConfig,
};
use crate::machine::{self, ExecOutput, Hosts, Machine, Machines};
use crate::progress::TracingProgressBar;
use crate::util::{self, join_args};
use crate::{ExperimentConfig, System, TestId};
use color_eyre::eyre::{self, WrapErr};
use color_eyre::Report;
use tokio::io::AsyncWriteExt;

// per-test summaries written by the clients
const TEST_RESULTS_CSV: &str = "all-results.csv";
const TEST_RESULTS_JSON: &str = "all-results.json";

const KILL_COMMANDS: [&str; 7] = [
    "pkill -9 java",
    "pkill -f ClientMain",
    "pkill cli.sh",
    "pkill -9 -f Main",
    "pkill -f zookeeper",
    "pkill -f server",
    "pkill minio",
];

/// One test of the sweep: a parameter combination and a run index.
#[derive(Debug, Clone, PartialEq)]
pub struct TestPoint {
    pub test_type: String,
    pub test_prefix: String,
    pub batch_size: usize,
    pub write_ratio: usize,
    pub files_per_client: usize,
    pub record_size: usize,
    pub iat: f64,
    pub test_run: usize,
    pub clients_per_machine: usize,
    pub total_clients: usize,
    pub test_duration_secs: usize,
    pub warmup_secs: usize,
}

impl TestPoint {
    pub fn test_id(&self) -> TestId {
        TestId {
            system: System::Kawkab,
            prefix: format!("{}-{}", self.test_type, self.test_prefix),
            num_clients: self.total_clients,
            clients_per_machine: self.clients_per_machine,
            batch_size: self.batch_size,
            record_size: self.record_size,
            files_per_client: self.files_per_client,
            write_ratio: self.write_ratio,
            iat: self.iat,
        }
    }

    pub fn test_dir(&self, exp_dir: &str) -> String {
        format!("{}/{}/run_{}", exp_dir, self.test_id(), self.test_run)
    }

    pub fn workload(&self) -> ClientWorkload {
        ClientWorkload {
            test_type: self.test_type.clone(),
            clients_per_machine: self.clients_per_machine,
            total_clients: self.total_clients,
            batch_size: self.batch_size,
            record_size: self.record_size,
            files_per_client: self.files_per_client,
            write_ratio: self.write_ratio,
            iat: self.iat,
            test_duration_secs: self.test_duration_secs,
            warmup_secs: self.warmup_secs,
        }
    }

    /// Leading columns of this test's line in the batch summary.
    fn summary_columns(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}, {}, {}, {:.2}, {}",
            self.write_ratio,
            self.total_clients,
            self.clients_per_machine,
            self.files_per_client,
            self.record_size,
            self.batch_size,
            self.test_prefix,
            self.iat,
            self.test_run
        )
    }
}

/// Expands the sweep into the ordered list of tests to run.
pub fn sweep_points(
    sweep: &SweepConfig,
    total_clients: usize,
) -> Vec<TestPoint> {
    let mut points = Vec::new();
    for test_type in &sweep.test_types {
        for load in &sweep.loads {
            for &files_per_client in &sweep.files_per_client {
                for test_prefix in &sweep.test_prefixes {
                    for &record_size in &sweep.record_sizes {
                        for &iat in &load.iats {
                            for &test_run in &sweep.test_runs {
                                points.push(TestPoint {
                                    test_type: test_type.clone(),
                                    test_prefix: test_prefix.clone(),
                                    batch_size: load.batch_size,
                                    write_ratio: load.write_ratio,
                                    files_per_client,
                                    record_size,
                                    iat,
                                    test_run,
                                    clients_per_machine: sweep
                                        .clients_per_machine,
                                    total_clients,
                                    test_duration_secs: sweep
                                        .test_duration_secs,
                                    warmup_secs: sweep.warmup_secs,
                                });
                            }
                        }
                    }
                }
            }
        }
    }
    points
}

pub async fn run_batch(
    machines: &Machines,
    config: &ExperimentConfig,
    progress: &TracingProgressBar,
) -> Result<(), Report> {
    let points = sweep_points(&config.sweep, config.total_clients());
    let total = points.len();
    for (index, point) in points.iter().enumerate() {
        tracing::info!(
            "experiment {} of {} | test id: {} | run {}",
            index + 1,
            total,
            point.test_id(),
            point.test_run
        );
        progress.start_test(&point.test_id(), point.test_run);
        run_test(machines, config, point)
            .await
            .wrap_err_with(|| format!("run test {}", point.test_id()))?;
        progress.test_done();
    }
    kill_processes(machines, &Hosts::All)
        .await
        .wrap_err("kill_processes")?;
    tracing::info!("finished {} experiments", total);
    Ok(())
}

async fn run_test(
    machines: &Machines,
    config: &ExperimentConfig,
    point: &TestPoint,
) -> Result<(), Report> {
    let dirs = config.run_dirs();
    let test_dir = point.test_dir(&config.exp_dir);

    cleanup(machines, config, &test_dir)
        .await
        .wrap_err("cleanup")?;
    util::stopwatch(3).await;
    prepare_folders(machines, &dirs, &test_dir)
        .await
        .wrap_err("prepare_folders")?;
    start_backend(machines, config, &dirs)
        .await
        .wrap_err("start_backend")?;
    util::stopwatch(2).await;
    start_servers(machines, config, &dirs)
        .await
        .wrap_err("start_servers")?;
    util::stopwatch(config.server_start_wait_secs).await;
    start_clients(machines, config, &dirs, point)
        .await
        .wrap_err("start_clients")?;
    util::stopwatch(3).await;

    // clients exit on their own once the test is over
    let limit = point.warmup_secs
        + point.test_duration_secs
        + config.client_wait_extra_secs;
    machines
        .wait_for_process(&Hosts::Clients, "java", limit, false)
        .await
        .wrap_err("wait for clients")?;
    machines
        .wait_for_process(
            &Hosts::Servers,
            "java",
            config.server_stop_wait_limit,
            true,
        )
        .await
        .wrap_err("wait for servers")?;
    util::stopwatch(3).await;

    copy_files(machines, &dirs, &test_dir).await;
    get_results(config, point, &test_dir)
        .await
        .wrap_err("get_results")?;
    util::stopwatch(3).await;
    Ok(())
}

/// Kills every process a test may have left behind. This is the only step
/// that runs as root.
pub async fn kill_processes(
    machines: &Machines,
    hosts: &Hosts,
) -> Result<(), Report> {
    for command in KILL_COMMANDS {
        machines.exec(hosts, command, true).await?;
    }
    Ok(())
}

async fn cleanup(
    machines: &Machines,
    config: &ExperimentConfig,
    test_dir: &str,
) -> Result<(), Report> {
    tracing::info!("cleanup");
    kill_processes(machines, &Hosts::All).await?;

    let command = format!("rm -r {}/*", config.run_dir);
    machines.exec(&Hosts::All, &command, false).await?;

    // kawkab's local file system state
    let command = format!(
        "rm -r {dir}/fs0/fs/* {dir}/fs1/fs/* {dir}/fs/*",
        dir = config.kawkab_dir
    );
    machines.exec(&Hosts::Servers, &command, false).await?;
    let command = "rm -r /tmp/fs0/fs/* /tmp/fs1/fs/* /tmp/fs/*";
    machines.exec(&Hosts::Servers, command, false).await?;

    let command = format!("rm -r {}/*", test_dir);
    Machine::localhost().exec(command, false).await?;
    Ok(())
}

async fn prepare_folders(
    machines: &Machines,
    dirs: &RunDirs,
    test_dir: &str,
) -> Result<(), Report> {
    tracing::info!("preparing folders");
    let mkdir = format!("mkdir -p {}", test_dir);
    if machines.testbed().is_ec2() {
        machines.exec(&Hosts::All, &mkdir, false).await?;
    }
    // results are always collected into the local test dir
    Machine::localhost().exec(&mkdir, false).await?;

    let command = format!("mkdir -p {}", dirs.all().join(" "));
    machines.exec(&Hosts::All, &command, false).await?;
    Ok(())
}

fn backend_command(
    config: &ExperimentConfig,
    dirs: &RunDirs,
    index: usize,
) -> String {
    format!(
        "source ~/.bash_profile; cd {}; {}/{} > {} 2>&1 &",
        dirs.run,
        config.kawkab_dir,
        config.backend_script,
        dirs.run_file(ProcessType::Backend(index))
    )
}

fn server_command(
    config: &ExperimentConfig,
    dirs: &RunDirs,
    server_id: usize,
) -> String {
    let args = ServerConfig::new(server_id, config, dirs).to_args();
    format!(
        "source ~/.bash_profile; cd /tmp; java {} > {} 2>&1 &",
        join_args(args),
        dirs.run_file(ProcessType::Server(server_id))
    )
}

/// One launch command per client machine. The client on machine `i` gets
/// id `i * clients_per_machine + 1`; the first one coordinates the others.
fn client_commands<'m>(
    clients: &'m [Machine],
    config: &ExperimentConfig,
    dirs: &RunDirs,
    point: &TestPoint,
) -> Result<Vec<(&'m Machine, String)>, Report> {
    let master = clients
        .first()
        .ok_or_else(|| eyre::eyre!("no client machines"))?;
    let master = (1, master.host());
    let workload = point.workload();

    let commands = clients
        .iter()
        .enumerate()
        .map(|(index, machine)| {
            let cid = index * point.clients_per_machine + 1;
            let args =
                ClientConfig::new(cid, master, config, &workload).to_args();
            let command = format!(
                "source ~/.bash_profile; cd {}; java {} > {} 2>&1 &",
                dirs.run,
                join_args(args),
                dirs.run_file(ProcessType::Client(cid))
            );
            (machine, command)
        })
        .collect();
    Ok(commands)
}

async fn start_backend(
    machines: &Machines,
    config: &ExperimentConfig,
    dirs: &RunDirs,
) -> Result<(), Report> {
    tracing::info!("starting backend storage");
    let per_host = machines
        .backends()
        .iter()
        .enumerate()
        .map(|(index, machine)| {
            (machine, vec![backend_command(config, dirs, index)])
        })
        .collect();
    machine::exec_parallel_per_host(per_host, false).await?;
    Ok(())
}

async fn start_servers(
    machines: &Machines,
    config: &ExperimentConfig,
    dirs: &RunDirs,
) -> Result<(), Report> {
    tracing::info!("starting {} servers", machines.servers().len());
    let per_host = machines
        .servers()
        .iter()
        .enumerate()
        .map(|(server_id, machine)| {
            (machine, vec![server_command(config, dirs, server_id)])
        })
        .collect();
    machine::exec_parallel_per_host(per_host, false).await?;
    Ok(())
}

/// Launches the clients one after the other, so that the master is up
/// first. Returns each launch's output once logged.
async fn start_clients(
    machines: &Machines,
    config: &ExperimentConfig,
    dirs: &RunDirs,
    point: &TestPoint,
) -> Result<Vec<ExecOutput>, Report> {
    let start = std::time::Instant::now();
    let commands = client_commands(machines.clients(), config, dirs, point)?;
    let mut outputs = Vec::with_capacity(commands.len());
    for (machine, command) in &commands {
        let output = machine.exec(command, false).await?;
        machine::log_output(machine, &output);
        outputs.push(output);
    }
    tracing::info!(
        "started {} client processes in {:?}",
        commands.len(),
        start.elapsed()
    );
    Ok(outputs)
}

/// Collects the run directory of every host into the test directory.
/// Failures are logged and the batch goes on.
async fn copy_files(machines: &Machines, dirs: &RunDirs, test_dir: &str) {
    tracing::info!("copying files");
    let hosts = machines.hosts(&Hosts::All);
    if machines.testbed().is_ec2() {
        let remote = format!("{}/", dirs.run);
        machine::copy_from_all(hosts, &remote, test_dir).await;
    } else {
        let command = format!("cp -r {}/* {}", dirs.run, test_dir);
        if let Err(e) = machine::exec_parallel(hosts, &command, false).await
        {
            tracing::warn!("copying files failed: {:?}", e);
        }
    }
}

async fn get_results(
    config: &ExperimentConfig,
    point: &TestPoint,
    test_dir: &str,
) -> Result<(), Report> {
    let test_csv = format!("{}/{}", test_dir, TEST_RESULTS_CSV);
    let test_results = match tokio::fs::read_to_string(&test_csv).await {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!("no results at {}: {:?}", test_csv, e);
            String::new()
        }
    };
    let line = summary_line(point, &test_results);

    let batch_csv = format!("{}/{}", config.exp_dir, TEST_RESULTS_CSV);
    let mut output_log = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&batch_csv)
        .await
        .wrap_err_with(|| format!("open {}", batch_csv))?;
    append_to_output_log(&mut output_log, line).await?;

    let test_json = format!("{}/{}", test_dir, TEST_RESULTS_JSON);
    if let Ok(json) = tokio::fs::read_to_string(&test_json).await {
        tracing::info!("{}", json);
    }
    tracing::info!("{}", test_results);
    Ok(())
}

fn summary_line(point: &TestPoint, test_results: &str) -> String {
    let last = test_results
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default();
    format!("{}, {}", point.summary_columns(), last.trim())
}

async fn append_to_output_log(
    output_log: &mut tokio::fs::File,
    line: String,
) -> Result<(), Report> {
    tracing::info!("{}", line);
    output_log
        .write_all(format!("{}\n", line).as_bytes())
        .await
        .wrap_err("output log write")?;
    output_log.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadConfig;

    fn sweep() -> SweepConfig {
        SweepConfig {
            test_types: vec![String::from("rw")],
            test_prefixes: vec![String::from("kw48"), String::from("kw49")],
            loads: vec![
                LoadConfig {
                    batch_size: 1000,
                    write_ratio: 100,
                    iats: vec![1.0, 0.5, 0.25],
                },
                LoadConfig {
                    batch_size: 500,
                    write_ratio: 80,
                    iats: vec![2.0],
                },
            ],
            record_sizes: vec![16, 64],
            files_per_client: vec![1],
            test_runs: vec![1, 2],
            clients_per_machine: 10,
            test_duration_secs: 60,
            warmup_secs: 120,
        }
    }

    #[test]
    fn sweep_size() {
        // types * prefixes * record sizes * files * sum(iats) * runs
        let points = sweep_points(&sweep(), 20);
        assert_eq!(points.len(), 1 * 2 * 2 * 1 * 4 * 2);
    }

    #[test]
    fn sweep_order() {
        let points = sweep_points(&sweep(), 20);
        let ids: Vec<_> = points
            .iter()
            .take(5)
            .map(|point| (point.test_id().to_string(), point.test_run))
            .collect();
        assert_eq!(
            ids,
            vec![
                (String::from("rw-kw48-nc20-bs1000-rs16-nf1-wr100-iat1"), 1),
                (String::from("rw-kw48-nc20-bs1000-rs16-nf1-wr100-iat1"), 2),
                (String::from("rw-kw48-nc20-bs1000-rs16-nf1-wr100-iat0.5"), 1),
                (String::from("rw-kw48-nc20-bs1000-rs16-nf1-wr100-iat0.5"), 2),
                (String::from("rw-kw48-nc20-bs1000-rs16-nf1-wr100-iat0.25"), 1),
            ]
        );
        let last = points.last().expect("sweep should not be empty");
        assert_eq!(
            last.test_id().to_string(),
            "rw-kw49-nc20-bs500-rs64-nf1-wr80-iat2"
        );
    }

    #[test]
    fn test_dir_and_parsing() {
        let point = &sweep_points(&sweep(), 20)[3];
        assert_eq!(
            point.test_dir("/results"),
            "/results/rw-kw48-nc20-bs1000-rs16-nf1-wr100-iat0.5/run_2"
        );
        // the results side parses the same identifier back
        let parsed: TestId = point
            .test_id()
            .to_string()
            .parse()
            .expect("test id should parse");
        assert_eq!(parsed.prefix, "rw-kw48");
        assert_eq!(parsed.iat, 0.5);
    }

    #[test]
    fn summary_takes_last_line() {
        let point = &sweep_points(&sweep(), 20)[0];
        let csv = "opsPs, thrMBps\n1200, 3.5\n\n";
        assert_eq!(
            summary_line(point, csv),
            "100, 20, 10, 1, 16, 1000, kw48, 1.00, 1, 1200, 3.5"
        );
        assert_eq!(
            summary_line(point, ""),
            "100, 20, 10, 1, 16, 1000, kw48, 1.00, 1, "
        );
    }

    #[tokio::test]
    async fn results_appended_to_batch_csv() {
        let exp_dir = tempfile::tempdir().expect("tempdir should be created");
        let config = ExperimentConfig {
            exp_dir: exp_dir.path().display().to_string(),
            ..Default::default()
        };
        let point = &sweep_points(&sweep(), 20)[0];
        let test_dir = point.test_dir(&config.exp_dir);
        std::fs::create_dir_all(&test_dir).expect("mkdir should work");
        std::fs::write(
            format!("{}/{}", test_dir, TEST_RESULTS_CSV),
            "header\n1200, 3.5\n",
        )
        .expect("write should work");

        get_results(&config, point, &test_dir)
            .await
            .expect("results should be collected");
        get_results(&config, point, &test_dir)
            .await
            .expect("results should be collected");

        let batch = std::fs::read_to_string(format!(
            "{}/{}",
            config.exp_dir, TEST_RESULTS_CSV
        ))
        .expect("batch csv should exist");
        let lines: Vec<_> = batch.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("kw48, 1.00, 1, 1200, 3.5"));
    }

    fn cluster_config() -> ExperimentConfig {
        ExperimentConfig {
            backends: vec![String::from("b1")],
            servers: vec![String::from("s1"), String::from("s2")],
            clients: vec![
                String::from("c1"),
                String::from("c2"),
                String::from("c3"),
            ],
            kawkab_dir: String::from("/home/kawkab"),
            ..Default::default()
        }
    }

    #[test]
    fn backend_and_server_launches() {
        let config = cluster_config();
        let dirs = config.run_dirs();
        assert_eq!(
            backend_command(&config, &dirs, 0),
            "source ~/.bash_profile; cd /tmp/kawkab; \
             /home/kawkab/minio/reset.sh \
             > /tmp/kawkab/out/backend_00.out 2>&1 &"
        );
        assert_eq!(
            server_command(&config, &dirs, 1),
            "source ~/.bash_profile; cd /tmp; java -ea -Xms12g -Xmx24g \
             -XX:MaxDirectMemorySize=16684m -XX:+UnlockExperimentalVMOptions \
             -XX:+UseZGC -DnodeID=1 -DoutFolder=/tmp/kawkab/servers \
             -cp .:/home/kawkab:/home/kawkab/bin kawkab.fs.Main \
             > /tmp/kawkab/servers/server_01.out 2>&1 &"
        );
    }

    #[test]
    fn client_launches() {
        let mut config = cluster_config();
        config.sweep.clients_per_machine = 3;
        let dirs = config.run_dirs();
        let machines = Machines::from_config(&config);
        let mut sweep = sweep();
        sweep.clients_per_machine = 3;
        let point = &sweep_points(&sweep, config.total_clients())[0];

        let commands =
            client_commands(machines.clients(), &config, &dirs, point)
                .expect("client commands should be built");
        assert_eq!(commands.len(), 3);
        assert_eq!(
            commands[0].1,
            "source ~/.bash_profile; cd /tmp/kawkab; java -ea \
             -XX:+UnlockExperimentalVMOptions -XX:+UseZGC \
             -cp .:/home/kawkab:/home/kawkab/bin \
             kawkab.fs.testclient.ClientMain mport=43567 wt=0 nc=3 bs=1000 \
             rs=16 nf=1 fp=/tmp/kawkab typ=rw tc=9 td=60 wr=100 \
             iat=1.000000 wmup=120 cid=1 mid=1 mip=c1 sip=s2 sport=33434 \
             > /tmp/kawkab/clients/client_01.out 2>&1 &"
        );

        // ids step by clients per machine; every client reports to c1
        let expected = [
            ("c1", "cid=1 mid=1 mip=c1 sip=s2 sport=33434", "client_01"),
            ("c2", "cid=4 mid=1 mip=c1 sip=s1 sport=33433", "client_04"),
            ("c3", "cid=7 mid=1 mip=c1 sip=s2 sport=33434", "client_07"),
        ];
        for ((machine, command), (host, ids, out)) in
            commands.iter().zip(expected)
        {
            assert_eq!(machine.host(), host);
            assert!(command.contains(ids), "{} in {}", ids, command);
            assert!(command.contains(out), "{} in {}", out, command);
        }

        let no_clients: Vec<Machine> = Vec::new();
        assert!(client_commands(&no_clients, &config, &dirs, point).is_err());
    }

    #[tokio::test]
    async fn backend_starts_with_profile() {
        use std::os::unix::fs::PermissionsExt;

        let home = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(
            home.path().join(".bash_profile"),
            "export KAWKAB_PROFILE=sourced\n",
        )
        .expect("write should work");
        std::env::set_var("HOME", home.path());

        let kawkab_dir = home.path().join("kawkab");
        std::fs::create_dir_all(&kawkab_dir).expect("mkdir should work");
        let script = kawkab_dir.join("reset.sh");
        std::fs::write(
            &script,
            "#!/bin/bash\necho \"profile=$KAWKAB_PROFILE\" > marker\n",
        )
        .expect("write should work");
        let mode = std::fs::Permissions::from_mode(0o755);
        std::fs::set_permissions(&script, mode).expect("chmod should work");

        let config = ExperimentConfig {
            testbed: crate::Testbed::Local,
            backends: vec![String::from("127.0.0.1")],
            kawkab_dir: kawkab_dir.display().to_string(),
            run_dir: home.path().join("run").display().to_string(),
            backend_script: String::from("reset.sh"),
            ..Default::default()
        };
        let dirs = config.run_dirs();
        for dir in dirs.all() {
            std::fs::create_dir_all(dir).expect("mkdir should work");
        }
        let machines = Machines::from_config(&config);
        start_backend(&machines, &config, &dirs)
            .await
            .expect("backend should start");

        // the script runs in the background
        let marker = home.path().join("run").join("marker");
        let mut contents = String::new();
        for _ in 0..50 {
            contents = std::fs::read_to_string(&marker).unwrap_or_default();
            if !contents.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        assert_eq!(contents.trim(), "profile=sourced");
    }

    #[tokio::test]
    async fn ec2_test_dir_created_locally() {
        let exp_dir = tempfile::tempdir().expect("tempdir should be created");
        // no hosts: only the local side runs
        let config = ExperimentConfig {
            testbed: crate::Testbed::Ec2,
            exp_dir: exp_dir.path().display().to_string(),
            ..Default::default()
        };
        let machines = Machines::from_config(&config);
        let point = &sweep_points(&sweep(), 20)[0];
        let test_dir = point.test_dir(&config.exp_dir);

        prepare_folders(&machines, &config.run_dirs(), &test_dir)
            .await
            .expect("folders should be prepared");
        assert!(std::path::Path::new(&test_dir).is_dir());
    }

    #[tokio::test]
    async fn client_launch_errors_surface() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        // the run dir was never prepared, so the launch can't cd into it
        let config = ExperimentConfig {
            testbed: crate::Testbed::Local,
            servers: vec![String::from("127.0.0.1")],
            clients: vec![String::from("127.0.0.1")],
            run_dir: dir.path().join("missing").display().to_string(),
            ..Default::default()
        };
        let machines = Machines::from_config(&config);
        let point = &sweep_points(&sweep(), config.total_clients())[0];

        let dirs = config.run_dirs();
        let outputs = start_clients(&machines, &config, &dirs, point)
            .await
            .expect("launch should run");
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].stderr.contains("missing"), "{:?}", outputs[0]);
    }
}
