use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("no entity in {source_name} has a complete history across all dated columns")]
    DataIncomplete { source_name: String },

    #[error("entity {entity} has {available} feature rows, {required} required")]
    InsufficientHistory {
        entity: String,
        required: usize,
        available: usize,
    },

    #[error("entity {0} is not present in the panel")]
    UnknownEntity(String),

    #[error("no model mapped for horizon {0}")]
    UnmappedHorizon(u32),

    #[error("training partition is empty for horizon {horizon}")]
    EmptyTrainingSet { horizon: usize },

    #[error("failed to load model {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("model {model} inference failed: {reason}")]
    Inference { model: String, reason: String },

    #[error("bias correction failed: {0}")]
    BiasCorrection(String),

    #[error("no stored forecast for uid {0}")]
    NotFound(i64),

    #[error("malformed panel: {0}")]
    MalformedPanel(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ForecastError>;
