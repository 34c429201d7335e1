use thiserror::Error;

/// Failures raised by a compute call or by backend construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    #[error("invalid viewport: {0}")]
    InvalidViewport(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("band worker failed: {0}")]
    WorkerFailed(String),
    #[error("GPU device failure: {0}")]
    DeviceFailure(String),
    #[error("native routine broke its contract: {0}")]
    NativeContract(String),
}

/// Failure while appending to or reading the benchmark log.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("log I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{field} {value:?} cannot be stored on one log line")]
    InvalidField { field: &'static str, value: String },
}

/// A log line that could not be parsed. Recovered locally by the loader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogCorruption {
    #[error("expected 4 fields, found {0}")]
    FieldCount(usize),
    #[error("bad elapsed time {0:?}")]
    Elapsed(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown preset {0:?} (expected easy, medium or hard)")]
    UnknownPreset(String),
}
