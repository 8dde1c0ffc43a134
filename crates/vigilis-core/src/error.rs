//! Error types for Vigilis

/// Result type alias using Vigilis's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Vigilis operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad rule, missing catalog entry, invalid threshold. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Semantic tier unreachable or uninitialized
    #[error("semantic model unavailable: {0}")]
    ModelUnavailable(String),

    /// Reasoning backend did not answer in time
    #[error("upstream timed out")]
    UpstreamTimeout,

    /// Reasoning backend asked us to slow down
    #[error("upstream rate limited")]
    UpstreamRateLimited,

    /// Reasoning backend answered with something we could not parse
    #[error("upstream returned malformed response: {0}")]
    UpstreamMalformedResponse(String),

    /// Reasoning backend rejected our credentials
    #[error("upstream authentication failed: {0}")]
    UpstreamAuth(String),

    /// Any other upstream failure
    #[error("upstream error: {message}")]
    Upstream {
        message: String,
        retryable: bool,
    },

    /// Overall batch deadline exceeded
    #[error("batch deadline exceeded")]
    BatchTimeout,

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new model-unavailable error
    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Create a new malformed-response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::UpstreamMalformedResponse(msg.into())
    }

    /// Create a new upstream error
    pub fn upstream(msg: impl Into<String>, retryable: bool) -> Self {
        Self::Upstream {
            message: msg.into(),
            retryable,
        }
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether retrying the same upstream call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::UpstreamTimeout | Self::UpstreamRateLimited => true,
            Self::UpstreamMalformedResponse(_) => true,
            Self::Upstream { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Short stable name used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamRateLimited => "upstream_rate_limited",
            Self::UpstreamMalformedResponse(_) => "upstream_malformed",
            Self::UpstreamAuth(_) => "upstream_auth",
            Self::Upstream { .. } => "upstream",
            Self::BatchTimeout => "batch_timeout",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::UpstreamTimeout.is_transient());
        assert!(Error::UpstreamRateLimited.is_transient());
        assert!(Error::malformed("garbage").is_transient());
        assert!(Error::upstream("502 bad gateway", true).is_transient());

        assert!(!Error::upstream("400 bad request", false).is_transient());
        assert!(!Error::UpstreamAuth("invalid key".into()).is_transient());
        assert!(!Error::config("bad rule").is_transient());
        assert!(!Error::BatchTimeout.is_transient());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(Error::UpstreamTimeout.kind(), "upstream_timeout");
        assert_eq!(Error::model_unavailable("x").kind(), "model_unavailable");
        assert_eq!(Error::config("x").to_string(), "configuration error: x");
    }
}
