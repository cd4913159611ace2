use gcquant::GcmsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Gcms(#[from] GcmsError),

    #[error("Configuration error: {0}")]
    Config(String),
}
