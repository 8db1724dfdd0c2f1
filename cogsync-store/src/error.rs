use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("trial {block}/{round}/{index} has no response and cannot be logged")]
    IncompleteTrial { block: u32, round: u32, index: u32 },
    #[error("unrecognised trial log row: {0}")]
    MalformedRow(String),
}
