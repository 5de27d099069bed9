use thiserror::Error;

#[derive(Debug, Error)]
pub enum GtfsError {
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("network error: {0}")]
    NetworkMessage(String),
    #[error("GTFS parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("protobuf decode error: {0}")]
    ProtobufError(#[from] prost::DecodeError),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
