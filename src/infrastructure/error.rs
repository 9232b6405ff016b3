use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Local event store error: {0}")]
    LocalStore(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid or expired access token. Please re-authenticate.")]
    Unauthorized,
    #[error("Insufficient permissions. Ensure the token has calendar scope.")]
    Forbidden,
    #[error("Event not found.")]
    EventNotFound(String),
    #[error("Remote calendar API error: http {status}")]
    RemoteStatus { status: u16, message: String },
    #[error("Remote calendar API error: {0}")]
    RemoteApi(String),
}

impl InfraError {
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::EventNotFound(body.trim().to_string()),
            _ => Self::RemoteStatus {
                status,
                message: body.trim().to_string(),
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::RemoteStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_uses_human_readable_messages() {
        assert_eq!(
            InfraError::from_status(401, "").to_string(),
            "Invalid or expired access token. Please re-authenticate."
        );
        assert_eq!(
            InfraError::from_status(403, "").to_string(),
            "Insufficient permissions. Ensure the token has calendar scope."
        );
        assert_eq!(InfraError::from_status(404, "gone").to_string(), "Event not found.");
        assert_eq!(
            InfraError::from_status(502, "bad gateway").to_string(),
            "Remote calendar API error: http 502"
        );
    }

    #[test]
    fn only_network_throttling_and_server_errors_are_transient() {
        assert!(InfraError::Network("connection reset".to_string()).is_transient());
        assert!(InfraError::from_status(429, "").is_transient());
        assert!(InfraError::from_status(503, "").is_transient());
        assert!(!InfraError::from_status(400, "").is_transient());
        assert!(!InfraError::Unauthorized.is_transient());
    }
}
