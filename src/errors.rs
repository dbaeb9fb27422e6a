use std::fmt;

/// Connector-specific error types, one variant per failure class.
#[derive(Debug)]
pub enum ConnectorError {
    /// Mandatory credential missing — raised before any network activity.
    MissingCredentials(String),
    /// Network/connection failure, or the transport gave up after retrying.
    Transport(String),
    /// The response parsed but carries an upstream business error code.
    Business { code: String, message: String },
    /// The response tree does not contain fields whose presence was assumed.
    Parse(String),
    /// Persistence layer failure.
    Store(String),
    /// File download/save failure.
    File(String),
}

impl ConnectorError {
    /// Transport errors abort the primary pipeline no matter which stage
    /// reported them; everything else follows the stage's declared policy.
    pub fn is_transport(&self) -> bool {
        matches!(self, ConnectorError::Transport(_))
    }

    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::Business {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::MissingCredentials(field) => {
                write!(f, "Missing credentials: {}", field)
            }
            ConnectorError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ConnectorError::Business { code, message } => {
                write!(f, "Business error {}: {}", code, message)
            }
            ConnectorError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ConnectorError::Store(msg) => write!(f, "Store error: {}", msg),
            ConnectorError::File(msg) => write!(f, "File error: {}", msg),
        }
    }
}

impl std::error::Error for ConnectorError {}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        ConnectorError::Transport(err.to_string())
    }
}

impl From<sqlx::Error> for ConnectorError {
    fn from(err: sqlx::Error) -> Self {
        ConnectorError::Store(err.to_string())
    }
}
