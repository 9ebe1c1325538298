use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use kawkab_exp::progress::TracingProgressBar;
use kawkab_exp::sweep;
use kawkab_exp::{ExperimentConfig, Hosts, Machines};
use std::path::PathBuf;

// used when no configuration file is given
const CONFIG_FILE: &str = "exp_config.json";

#[derive(Parser)]
#[command(about = "Runs kawkab benchmark batches across a cluster")]
struct Cli {
    /// Experiment configuration (json)
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs every test of the sweep (default)
    Run,
    /// Kills kawkab, client and backend processes on all hosts
    Stop {
        /// Only stop these hosts
        #[arg(long = "host")]
        hosts: Vec<String>,
    },
    /// Lists the tests of the sweep without touching any host
    Points,
}

#[tokio::main]
async fn main() -> Result<(), Report> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = ExperimentConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let points =
                sweep::sweep_points(&config.sweep, config.total_clients());
            let progress = TracingProgressBar::init(points.len());
            let machines = Machines::from_config(&config);
            sweep::run_batch(&machines, &config, &progress)
                .await
                .wrap_err("run batch")?;
            progress.finish();
        }
        Command::Stop { hosts } => {
            kawkab_exp::init_tracing();
            let machines = Machines::from_config(&config);
            let hosts = if hosts.is_empty() {
                Hosts::All
            } else {
                Hosts::List(hosts)
            };
            sweep::kill_processes(&machines, &hosts)
                .await
                .wrap_err("kill processes")?;
        }
        Command::Points => {
            let points =
                sweep::sweep_points(&config.sweep, config.total_clients());
            for point in &points {
                println!("{} run_{}", point.test_id(), point.test_run);
            }
            println!("{} tests", points.len());
        }
    }
    Ok(())
}
