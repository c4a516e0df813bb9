use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} is not set. Add it to the environment or a .env file.")]
    MissingEnv(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("API returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Malformed API response: missing '{0}'")]
    MissingField(&'static str),

    #[error("Failed to parse API response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Failed to install interrupt handler: {0}")]
    Interrupt(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
