use thiserror::Error;

/// Boxed error returned by caller-supplied hooks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for LLM operations
#[derive(Error, Debug)]
pub enum LLMError {
    #[error("no messages provided")]
    NoMessages,

    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// Raised by a template through `raise_exception`; carries its message verbatim
    #[error("{0}")]
    TemplateViolation(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("usage callback failed: {0}")]
    Callback(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),
}

impl LLMError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Failure reported by a transport.
///
/// The core never interprets these beyond passing them up.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("stream error: {0}")]
    Stream(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LLMError>;
