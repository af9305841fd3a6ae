use anyhow::Context;
use clap::Parser;
use generator::profile::{write_synthetic_hour, GeneratorConfig};
use report::RunReport;
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod report;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Hourly radar QPE workflow driver")]
struct Args {
    /// Generate a synthetic hour and process it
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Write the JSON run report here
    #[arg(long)]
    output: Option<PathBuf>,
    /// Directory for synthetic files in offline mode
    #[arg(long, default_value = "tools/data/synthetic")]
    dir: PathBuf,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 10)]
    scan_count: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(Vec::new(), None, None)
    };

    if args.offline {
        let generator = GeneratorConfig {
            station_id: workflow_config.qpe.station_id.clone(),
            scan_count: args.scan_count,
            seed: args.seed,
            ..GeneratorConfig::default()
        };
        let hour = write_synthetic_hour(&args.dir, &generator)
            .context("generating synthetic hour")?;
        workflow_config.scans = hour.scans;
        workflow_config.gauges = hour.gauges;
    }
    if let Some(output) = args.output {
        workflow_config.output = Some(output);
    }
    if workflow_config.scans.is_empty() {
        anyhow::bail!("no scan files given; pass --workflow <yaml> or --offline");
    }

    let runner = Runner::new(workflow_config);
    let result = runner.execute()?;
    let report = RunReport::from_result(&result);

    println!("{}", report.headline());
    for field in &report.product.fields {
        println!(
            "  {:<7} valid cells {:>7}, mean {:?}, max {:?}",
            field.name, field.valid_cells, field.mean, field.max
        );
    }
    for score in &report.product.verification {
        println!(
            "  {:<7} vs {} gauges: bias {:.3}, rmse {:.3}",
            score.name, score.count, score.bias, score.rmse
        );
    }
    println!(
        "  metrics: decoded {}, corrected cells {}, ill-conditioned {}",
        result.metrics.scans_decoded, result.metrics.cells_corrected, result.metrics.ill_conditioned
    );

    if let Some(path) = &runner.config().output {
        report.write(path)?;
    }
    Ok(())
}
