//! Error types for the session actor and its collaborators

/// Errors returned by [`SessionHandle`](crate::SessionHandle) calls
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("keyboard session has shut down")]
    Closed,
    #[error("keyboard session dropped the reply")]
    NoReply,
}

/// Errors a transcription session reports when capture cannot start
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("audio device failed: {0}")]
    Device(String),
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_display() {
        assert_eq!(
            CaptureError::PermissionDenied.to_string(),
            "microphone permission denied"
        );
        assert_eq!(
            CaptureError::MissingCredentials("app key".into()).to_string(),
            "missing credentials: app key"
        );
        assert_eq!(CaptureError::Other("busy".into()).to_string(), "busy");
    }

    #[test]
    fn test_session_error_display() {
        assert_eq!(SessionError::Closed.to_string(), "keyboard session has shut down");
    }
}
