use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// A required credential or setting was missing when a backend client was built.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport failure, non-success status or malformed reply from a backend.
    /// Displays the backend's message text verbatim.
    #[error("{0}")]
    Backend(String),

    /// The validation adapter judged the semantic model invalid.
    #[error("semantic model validation failed: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Failed to create Redis pool: {0}")]
    PoolCreation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Collapse any error raised while talking to a backend into the single
    /// caller-facing backend error kind. Configuration errors pass through.
    pub fn into_backend(self) -> Self {
        match self {
            Self::Backend(_) | Self::Config(_) => self,
            other => Self::Backend(other.to_string()),
        }
    }

    /// Short machine-readable kind, used by the HTTP surface.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration",
            Self::Backend(_) => "backend",
            Self::Validation(_) => "validation",
            _ => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_displays_message_verbatim() {
        let err = BridgeError::Backend("Forbidden.".to_string());
        assert_eq!(err.to_string(), "Forbidden.");
    }

    #[test]
    fn into_backend_wraps_plumbing_errors() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = BridgeError::from(json_err).into_backend();
        assert!(matches!(err, BridgeError::Backend(ref msg) if msg.starts_with("JSON error")));

        let cfg = BridgeError::Config("missing key".to_string()).into_backend();
        assert_eq!(cfg.kind(), "configuration");
    }
}
