//! Error types for the idp-core library.

use std::fmt;

use thiserror::Error;

/// Main error type returned by pipeline stages and the query facade.
///
/// Every variant maps to an [`ErrorKind`] tag. The triggering transport reads
/// that tag to decide whether a delivery is retried or dead-lettered.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad caller input. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Extraction engine unreachable or document unreadable.
    #[error("extraction unavailable for {key}: {reason}")]
    ExtractionUnavailable { key: String, reason: String },

    /// Persistence or lookup failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Publish or alert send failure.
    #[error("notification error: {0}")]
    Notification(#[from] NotificationError),
}

/// Explicit error-kind tag attached to every [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    ExtractionUnavailable,
    Store,
    Notification,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ExtractionUnavailable => "extraction_unavailable",
            ErrorKind::Store => "store",
            ErrorKind::Notification => "notification",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    /// Build an `InvalidRequest` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        PipelineError::InvalidRequest(message.into())
    }

    /// The error-kind tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PipelineError::ExtractionUnavailable { .. } => ErrorKind::ExtractionUnavailable,
            PipelineError::Store(_) => ErrorKind::Store,
            PipelineError::Notification(_) => ErrorKind::Notification,
        }
    }

    /// Whether the transport should redeliver after this error.
    pub fn is_retryable(&self) -> bool {
        self.kind() != ErrorKind::InvalidRequest
    }

    /// HTTP status used when this error crosses the facade boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::InvalidRequest(_) => 400,
            PipelineError::Store(StoreError::InvalidKey(_)) => 400,
            PipelineError::Store(StoreError::GrantRejected { .. })
            | PipelineError::Store(StoreError::GrantExpired { .. }) => 403,
            PipelineError::Store(StoreError::NotFound { .. }) => 404,
            _ => 500,
        }
    }
}

impl From<ExtractionError> for PipelineError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Unavailable { key, reason }
            | ExtractionError::Unparseable { key, reason } => {
                PipelineError::ExtractionUnavailable { key, reason }
            }
            ExtractionError::Document { key, source } => PipelineError::ExtractionUnavailable {
                key,
                reason: source.to_string(),
            },
        }
    }
}

/// Errors raised by object and record stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// The key is empty or escapes the store root.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// No matching upload grant was issued for this key.
    #[error("upload grant rejected for {key}")]
    GrantRejected { key: String },

    /// The upload grant exists but its window has closed.
    #[error("upload grant expired for {key}")]
    GrantExpired { key: String },

    /// The backing store refused or could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised while publishing messages.
#[derive(Error, Debug)]
pub enum NotificationError {
    /// The publisher does not serve the requested topic.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// The transport refused the message.
    #[error("publish rejected: {0}")]
    Rejected(String),

    /// The message payload could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to invoice field extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The document cannot be read at all.
    #[error("document {key} unavailable: {reason}")]
    Unavailable { key: String, reason: String },

    /// The document was read but no invoice fields could be found.
    #[error("document {key} unparseable: {reason}")]
    Unparseable { key: String, reason: String },

    /// Document decoding failed.
    #[error("document {key}: {source}")]
    Document {
        key: String,
        #[source]
        source: DocumentError,
    },
}

impl ExtractionError {
    /// Whether a fallback extractor may take over after this error.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, ExtractionError::Unavailable { .. })
    }
}

/// Errors related to turning document bytes into text.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// A non-PDF document is not valid UTF-8 text.
    #[error("document is not UTF-8 text")]
    NotText,
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for [`crate::IdpConfig`].
    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override could not be parsed.
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Result type for the idp library.
pub type Result<T> = std::result::Result<T, PipelineError>;
