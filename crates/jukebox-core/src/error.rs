use thiserror::Error;

/// Errors surfaced by the conversation API and the streaming consumer
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status. `message` is the server's
    /// own text and is shown to the user as-is.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The connection failed or the response body became unreadable
    #[error("transport error: {0}")]
    Transport(String),

    /// A fragment or response body was not the JSON we expected
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A send is already streaming for this conversation
    #[error("a message is already being sent for this conversation")]
    SendInProgress,

    #[error("No artifacts found")]
    NoArtifact,

    #[error("no converter registered for {0} export")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

impl ApiError {
    /// The text to show the user in an alert.
    ///
    /// Server rejections are shown verbatim. Other failures drop the
    /// diagnostic prefix and serde detail that the `Display` form keeps for
    /// logs.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected { message, .. } => message.clone(),
            ApiError::Transport(detail) => format!("Could not reach the server ({})", detail),
            ApiError::Decode(_) => "The server sent a response that could not be read".to_string(),
            ApiError::SendInProgress => "Wait for the current reply to finish".to_string(),
            ApiError::Io(err) => format!("File error: {}", err),
            ApiError::NoArtifact | ApiError::UnsupportedFormat(_) => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_displays_server_text_verbatim() {
        let err = ApiError::Rejected {
            status: 400,
            message: "bad goal".to_string(),
        };
        assert_eq!(err.user_message(), "bad goal");
        assert_eq!(err.to_string(), "bad goal");
    }

    #[test]
    fn test_decode_error_hides_parser_detail() {
        let err: ApiError = serde_json::from_str::<serde_json::Value>("{nope")
            .unwrap_err()
            .into();
        assert!(matches!(err, ApiError::Decode(_)));
        assert!(err.to_string().starts_with("malformed response: "));
        assert_eq!(
            err.user_message(),
            "The server sent a response that could not be read"
        );
    }

    #[test]
    fn test_transport_message_drops_log_prefix() {
        let err = ApiError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "transport error: connection refused");
        assert_eq!(
            err.user_message(),
            "Could not reach the server (connection refused)"
        );
    }

    #[test]
    fn test_busy_and_export_messages() {
        assert_eq!(
            ApiError::SendInProgress.user_message(),
            "Wait for the current reply to finish"
        );
        assert_eq!(ApiError::NoArtifact.user_message(), "No artifacts found");
        assert_eq!(
            ApiError::UnsupportedFormat("PDF".to_string()).user_message(),
            "no converter registered for PDF export"
        );
    }
}
