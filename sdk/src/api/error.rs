use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("GraphQL errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    #[error("GraphQL response carried no data")]
    EmptyResponse,

    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("websocket not connected")]
    NotConnected,

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Transport failures, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ApiError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ApiError::WebSocket(e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
