use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Illegal configuration: {0}")]
    IllegalConfiguration(String),

    #[error("Failed to list tools from {client}: {message}")]
    ToolListing { client: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool} - {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Reasoning classifier error: {0}")]
    Classifier(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool round limit of {0} exceeded")]
    ToolRoundLimit(u32),

    #[error("API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn illegal_configuration(message: impl Into<String>) -> Self {
        Self::IllegalConfiguration(message.into())
    }

    pub fn tool_listing(client: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolListing {
            client: client.into(),
            message: message.into(),
        }
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound(name.into())
    }

    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn classifier(message: impl Into<String>) -> Self {
        Self::Classifier(message.into())
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Errors raised before any model I/O has happened. These surface to the
    /// caller of `start()` instead of the asynchronous error handler.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::IllegalConfiguration(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::RateLimit(_) | Error::Stream(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::api(400, "Bad request");
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("Bad request"));

        let err = Error::tool_listing("weather-server", "connection refused");
        assert!(err.to_string().contains("weather-server"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_is_configuration() {
        assert!(Error::illegal_configuration("missing handler").is_configuration());
        assert!(!Error::tool_not_found("sum").is_configuration());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::network("timeout").is_retryable());
        assert!(Error::rate_limit("too many requests").is_retryable());
        assert!(Error::stream("transport error").is_retryable());
        assert!(!Error::auth("invalid key").is_retryable());
        assert!(!Error::tool_not_found("sum").is_retryable());
    }
}
