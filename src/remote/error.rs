use std::fmt;

/// Errors from the remote customer API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Endpoint or API key missing from config
    NotConfigured,
    /// Transport failure (connect, timeout, body read)
    Http(String),
    /// Non-success HTTP status
    Status(u16),
    /// The API answered with GraphQL errors
    GraphQl(String),
    /// The response body did not have the expected shape
    Malformed(String),
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::NotConfigured => write!(
                f,
                "Remote not configured. Add remote.endpoint and remote.api_key to config."
            ),
            RemoteError::Http(e) => write!(f, "Network error: {}", e),
            RemoteError::Status(code) => write!(f, "Server returned status {}", code),
            RemoteError::GraphQl(e) => write!(f, "GraphQL error: {}", e),
            RemoteError::Malformed(e) => write!(f, "Malformed response: {}", e),
        }
    }
}

impl std::error::Error for RemoteError {}
