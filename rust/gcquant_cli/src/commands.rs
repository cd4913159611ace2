use tracing::{
    info,
    instrument,
};

use gcquant::ReferenceSet;

use crate::cli::{
    RunArgs,
    WriteTemplateArgs,
};
use crate::config::Config;
use crate::error::CliError;
use crate::processing::{
    run_calibration,
    run_quantification,
};

fn prepare(args: &RunArgs) -> Result<(Config, ReferenceSet, rayon::ThreadPool), CliError> {
    let config = Config::load(args.config.as_deref())?.with_cli_args(args);
    config.validate()?;
    info!("Using configuration: {:#?}", config);

    let references = ReferenceSet::load(&config.reference_path)
        .map_err(|e| CliError::Config(format!("cannot load references: {}", e)))?;

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = config.workers {
        builder = builder.num_threads(n);
    }
    let pool = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok((config, references, pool))
}

/// Main function for the 'calibrate' subcommand.
#[instrument(skip_all)]
pub fn main_calibrate(args: RunArgs) -> Result<(), CliError> {
    let (config, references, pool) = prepare(&args)?;
    pool.install(|| run_calibration(&config, &references))
}

/// Main function for the 'quantify' subcommand.
#[instrument(skip_all)]
pub fn main_quantify(args: RunArgs) -> Result<(), CliError> {
    let (config, references, pool) = prepare(&args)?;
    pool.install(|| run_quantification(&config, &references))
}

/// Main function for the 'write-template' subcommand.
pub fn main_write_template(args: WriteTemplateArgs) -> Result<(), CliError> {
    if let Some(parent) = args.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(&Config::template())?;
    std::fs::write(&args.output_path, text)?;
    println!(
        "Wrote configuration template to: {}",
        args.output_path.display()
    );
    Ok(())
}
