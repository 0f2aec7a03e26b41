use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("Model runtime unreachable: {0}")]
    ModelUnavailable(String),

    #[error("Model request timed out: {0}")]
    ModelTimeout(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    /// Connectivity and timeout failures; callers substitute a degraded response.
    pub fn is_transient(&self) -> bool {
        matches!(self, AiError::ModelUnavailable(_) | AiError::ModelTimeout(_))
    }
}

pub type Result<T> = std::result::Result<T, AiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AiError::ModelUnavailable("refused".into()).is_transient());
        assert!(AiError::ModelTimeout("60s".into()).is_transient());
        assert!(!AiError::Model("500".into()).is_transient());
        assert!(!AiError::MalformedOutput("x".into()).is_transient());
    }
}
