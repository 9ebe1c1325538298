use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use kawkab_exp::System;
use kawkab_plot::{PlotConfig, ResultsDB, Search};
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Dumps the parsed results of a plot configuration as json")]
struct Cli {
    /// Plot configuration (json)
    #[arg(short, long, default_value = "plot_config.json")]
    config: PathBuf,
    /// Directory where `results.json` is written
    #[arg(short, long)]
    output: PathBuf,
    /// Only dump the tests with this prefix, e.g. `rw-kw48`
    #[arg(long)]
    prefix: Option<String>,
    /// The prefix names BTrDB tests
    #[arg(long, requires = "prefix")]
    btrdb: bool,
    #[arg(long, requires = "prefix")]
    res_file: Option<String>,
    #[arg(long, requires = "prefix")]
    num_clients: Option<usize>,
    #[arg(long, requires = "prefix")]
    batch_size: Option<usize>,
    #[arg(long, requires = "prefix")]
    record_size: Option<usize>,
    #[arg(long, requires = "prefix")]
    write_ratio: Option<usize>,
    #[arg(long, requires = "prefix")]
    files_per_client: Option<usize>,
}

impl Cli {
    fn search(&self) -> Option<Search> {
        let prefix = self.prefix.as_ref()?;
        let system = if self.btrdb {
            System::Btrdb
        } else {
            System::Kawkab
        };
        let mut search = Search::new(system, prefix);
        if let Some(res_file) = &self.res_file {
            search.res_file(res_file);
        }
        if let Some(num_clients) = self.num_clients {
            search.num_clients(num_clients);
        }
        if let Some(batch_size) = self.batch_size {
            search.batch_size(batch_size);
        }
        if let Some(record_size) = self.record_size {
            search.record_size(record_size);
        }
        if let Some(write_ratio) = self.write_ratio {
            search.write_ratio(write_ratio);
        }
        if let Some(files_per_client) = self.files_per_client {
            search.files_per_client(files_per_client);
        }
        Some(search)
    }
}

fn main() -> Result<(), Report> {
    color_eyre::install()?;
    kawkab_exp::init_tracing();
    let cli = Cli::parse();

    let config = PlotConfig::load(&cli.config)?;
    let mut db = ResultsDB::load(&config).wrap_err("load results")?;
    if let Some(search) = cli.search() {
        db = db.select(&search);
    }
    db.data_to_json(&cli.output)?;
    tracing::info!(
        "{} entries written to {}",
        db.entries().len(),
        cli.output.display()
    );
    Ok(())
}
