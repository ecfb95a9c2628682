use std::path::Path;

use anyhow::Context;
use clap::Parser;
use cmsbench::backend;
use cmsbench::conf::Config;
use cmsbench::core::{CliArgs, Command, GenerateArgs, RunArgs, setup_logging};
use cmsbench::dataset::{Dataset, generate_records, write_csv};
use cmsbench::runner::{ExperimentPlan, MatrixRunner};
use cmsbench::sink::{log_summary, write_results};
use log::info;

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = Config::load(args.config.as_deref().map(Path::new))?;
    config.apply_args(&args);
    config.validate()?;
    info!("effective config: {:?}", config);

    let dataset = Dataset::open(&config.experiment.dataset, Some(config.experiment.max_tier()))
        .with_context(|| format!("reading {}", config.experiment.dataset.display()))?;
    let backend = backend::connect(&config.backend).await?;
    let runner = MatrixRunner::new(backend, ExperimentPlan::from(&config.experiment));
    info!(
        "{} backend: {} cells x {} repetitions",
        config.backend.kind,
        runner.plan().cells(),
        runner.plan().repetitions
    );
    let results = runner.run(&dataset).await?;

    let kind = config.backend.kind;
    log_summary(kind.as_str(), &results);
    let path = config.output.resolve_path(kind);
    write_results(&path, config.output.format, kind.as_str(), &results)?;
    info!("wrote {} results to {}", results.len(), path.display());
    Ok(())
}

fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    let records = generate_records(args.records, args.seed);
    write_csv(&args.output, &records)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!("generated {} records into {}", records.len(), args.output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let args = CliArgs::parse();
    info!(args = args; "cmsbench started");
    match args.command {
        Command::Run(run_args) => run(run_args).await,
        Command::Generate(generate_args) => generate(generate_args),
    }
}
