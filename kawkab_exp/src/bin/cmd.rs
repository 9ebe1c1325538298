use clap::{Parser, Subcommand};
use color_eyre::Report;
use kawkab_exp::cmd::{CmdConfig, Targets};
use std::path::PathBuf;

const CONFIG_FILE: &str = "cmd_config.json";

#[derive(Parser)]
#[command(about = "Runs a command on every target machine")]
struct Cli {
    /// Targets configuration (json)
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Uploads the configured source directory
    Sync,
    /// Runs the configured build command
    Make,
    /// Runs a command, or the configured one
    Cmd { command: Option<String> },
    /// Opens a long-lived session on every target
    Sleep,
    /// Uploads `src` to `dst`
    Rsync { src: String, dst: String },
    /// Downloads `src` from every target into `dst`
    Dlres { src: String, dst: String },
}

#[tokio::main]
async fn main() -> Result<(), Report> {
    color_eyre::install()?;
    kawkab_exp::init_tracing();
    let cli = Cli::parse();
    let targets = Targets::new(CmdConfig::load(&cli.config)?);

    let outputs = match &cli.command {
        Command::Sync => targets.sync().await?,
        Command::Make => targets.make().await?,
        Command::Cmd { command } => targets.cmd(command.as_deref()).await?,
        Command::Sleep => targets.sleep().await?,
        Command::Rsync { src, dst } => targets.rsync(src, dst).await?,
        Command::Dlres { src, dst } => targets.download(src, dst).await?,
    };
    tracing::info!("done on {} targets", outputs.len());
    Ok(())
}
