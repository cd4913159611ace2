use clap::{
    Parser,
    Subcommand,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the calibration table from the calibration folder.
    Calibrate(RunArgs),
    /// Quantify every sample in the data folder against the calibration table.
    Quantify(RunArgs),
    /// Write a template configuration file.
    WriteTemplate(WriteTemplateArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CalTypeArg {
    /// Plain concentration curve
    Conc,
    /// Areas divided by an internal standard's area
    Internal,
}

/// Options shared by `calibrate` and `quantify`. Flags over-write the
/// values of the configuration file.
#[derive(Parser, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Reference manifest or library file
    #[arg(short, long)]
    pub reference_path: Option<PathBuf>,

    /// Do not use a background spectrum in the fit
    #[arg(long)]
    pub no_background: bool,

    /// Time (minutes) of the scan used as background spectrum
    #[arg(long)]
    pub background_time: Option<f64>,

    /// Folder with the calibration sets
    #[arg(long)]
    pub calibration_folder: Option<PathBuf>,

    /// Calibration table (parquet)
    #[arg(long)]
    pub calibration_table: Option<PathBuf>,

    /// Folder with the sample files
    #[arg(short, long)]
    pub data_folder: Option<PathBuf>,

    /// Calibration type
    #[arg(long, value_enum, alias = "cal_type")]
    pub cal_type: Option<CalTypeArg>,

    /// Internal standard compound, used with `--cal-type internal`
    #[arg(long)]
    pub standard: Option<String>,

    /// Start (minutes) of the internal standard window
    #[arg(long, alias = "std_start")]
    pub std_start: Option<f64>,

    /// Stop (minutes) of the internal standard window
    #[arg(long, alias = "std_stop")]
    pub std_stop: Option<f64>,

    /// Number of worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Skip writing QC plots
    #[arg(long)]
    pub no_plots: bool,
}

#[derive(Parser, Debug)]
pub struct WriteTemplateArgs {
    /// Where to write the configuration template.
    #[arg(short, long, default_value = "gcquant_config.json")]
    pub output_path: PathBuf,
}
