use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use kawkab_plot::{PlotConfig, ResultsDB};
use pyo3::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Renders the figures of a plot configuration")]
struct Cli {
    /// Plot configuration (json)
    #[arg(short, long, default_value = "plot_config.json")]
    config: PathBuf,
    /// Only render the figures with these names
    #[arg(short, long)]
    figure: Vec<String>,
}

fn main() -> Result<(), Report> {
    color_eyre::install()?;
    kawkab_exp::init_tracing();
    let cli = Cli::parse();

    let config = PlotConfig::load(&cli.config)?;
    let db = ResultsDB::load(&config).wrap_err("load results")?;

    let figures: Vec<_> = config
        .figures
        .iter()
        .filter(|figure| {
            cli.figure.is_empty()
                || cli.figure.iter().any(|name| name == figure.name())
        })
        .collect();
    tracing::info!("rendering {} figures", figures.len());

    Python::with_gil(|py| -> Result<(), Report> {
        for figure in figures {
            let charts = kawkab_plot::charts(&config, &db, figure)
                .wrap_err_with(|| format!("figure {}", figure.name()))?;
            for chart in &charts {
                kawkab_plot::render(py, &config, chart)
                    .wrap_err_with(|| format!("render {}", chart.name))?;
            }
        }
        Ok(())
    })
}
