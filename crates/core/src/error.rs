use thiserror::Error;

pub type FunnelResult<T> = Result<T, FunnelError>;

#[derive(Error, Debug)]
pub enum FunnelError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mandatory visitor fields (session id, timestamp) could not be derived.
    #[error("Visitor validation error: {0}")]
    Validation(String),

    #[error("Malformed sale payload: {0}")]
    MalformedSale(String),

    /// An external collaborator has no credentials configured.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("External authentication failed: {0}")]
    ExternalAuth(String),

    #[error("External service unavailable: {0}")]
    ExternalTransient(String),

    #[error("External service rejected request ({status}): {message}")]
    ExternalRejected { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl FunnelError {
    /// Classify a non-success HTTP status from an external platform.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => FunnelError::ExternalAuth(format!("HTTP {status}: {message}")),
            408 | 429 | 500..=599 => {
                FunnelError::ExternalTransient(format!("HTTP {status}: {message}"))
            }
            _ => FunnelError::ExternalRejected { status, message },
        }
    }

    /// Whether the calling layer may retry the operation unchanged.
    pub fn is_retriable(&self) -> bool {
        matches!(self, FunnelError::ExternalTransient(_))
    }

    /// Short machine-readable tag, used in API error bodies and delivery logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FunnelError::Config(_) => "config",
            FunnelError::Validation(_) => "validation",
            FunnelError::MalformedSale(_) => "malformed_sale",
            FunnelError::NotConfigured(_) => "not_configured",
            FunnelError::ExternalAuth(_) => "external_auth",
            FunnelError::ExternalTransient(_) => "external_transient",
            FunnelError::ExternalRejected { .. } => "external_rejected",
            FunnelError::Serialization(_) => "serialization",
            FunnelError::Io(_) => "io",
            FunnelError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retriable() {
        assert!(FunnelError::ExternalTransient("timeout".into()).is_retriable());
        assert!(!FunnelError::ExternalAuth("401".into()).is_retriable());
        assert!(!FunnelError::ExternalRejected {
            status: 400,
            message: "bad pixel".into()
        }
        .is_retriable());
        assert!(!FunnelError::Validation("missing session".into()).is_retriable());
    }

    #[test]
    fn test_http_status_classification() {
        assert!(matches!(
            FunnelError::from_http_status(401, "expired"),
            FunnelError::ExternalAuth(_)
        ));
        assert!(FunnelError::from_http_status(503, "down").is_retriable());
        assert!(FunnelError::from_http_status(429, "slow down").is_retriable());
        assert!(matches!(
            FunnelError::from_http_status(400, "bad"),
            FunnelError::ExternalRejected { status: 400, .. }
        ));
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(FunnelError::NotConfigured("token".into()).kind(), "not_configured");
        assert_eq!(FunnelError::MalformedSale("x".into()).kind(), "malformed_sale");
    }
}
