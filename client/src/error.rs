use shared::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid question bank: {0}")]
    QuestionBank(String),

    #[error("failed to parse question bank: {0}")]
    Json(#[from] serde_json::Error),
}
