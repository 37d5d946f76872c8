use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("TLE directory not found: {0}")]
    DirectoryNotFound(String),
    #[error("TLE file read error: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Invalid TLE format in {source_name}: {message}")]
    InvalidTle { source_name: String, message: String },
    #[error("Bad TLE checksum for {0}")]
    BadChecksum(String),
    #[error("Satellite not found: {0}")]
    NotFound(String),
    #[error("Elements for {name} are {age_days:.1} days old (limit {max_days:.1})")]
    StaleElements {
        name: String,
        age_days: f64,
        max_days: f64,
    },
    #[error("Propagation error: {0}")]
    Propagation(String),
}

impl From<sgp4::TleError> for PredictError {
    fn from(err: sgp4::TleError) -> Self {
        PredictError::InvalidTle {
            source_name: "tle".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<sgp4::ElementsError> for PredictError {
    fn from(err: sgp4::ElementsError) -> Self {
        PredictError::InvalidTle {
            source_name: "elements".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<sgp4::Error> for PredictError {
    fn from(err: sgp4::Error) -> Self {
        PredictError::Propagation(err.to_string())
    }
}
