//! Shared error type across pushprism crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed push.
    BadRequest,
    /// Invalid or unreadable configuration.
    BadConfig,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::BadConfig => "BAD_CONFIG",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PushPrismError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum PushPrismError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("metric family {0} has no metrics")]
    EmptyFamily(String),
    #[error("duplicate label {0}")]
    DuplicateLabel(String),
    /// Carries the rendered label set, e.g. `{__name__="x", job="a"}`.
    #[error("duplicate labels: {0}")]
    DuplicateLabels(String),
    #[error("incompatible metric definition: {0}")]
    IncompatibleMetricDefinition(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("config: {0}")]
    Config(String),
}

impl PushPrismError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            PushPrismError::Parse(_)
            | PushPrismError::BadRequest(_)
            | PushPrismError::EmptyFamily(_)
            | PushPrismError::DuplicateLabel(_)
            | PushPrismError::DuplicateLabels(_)
            | PushPrismError::IncompatibleMetricDefinition(_) => ClientCode::BadRequest,
            PushPrismError::Config(_) => ClientCode::BadConfig,
            PushPrismError::Encode(_) => ClientCode::Internal,
        }
    }

    /// Short label value for error counters.
    pub fn kind(&self) -> &'static str {
        match self {
            PushPrismError::Parse(_) => "parse",
            PushPrismError::BadRequest(_) => "bad_request",
            PushPrismError::EmptyFamily(_) => "empty_family",
            PushPrismError::DuplicateLabel(_) => "duplicate_label",
            PushPrismError::DuplicateLabels(_) => "duplicate_labels",
            PushPrismError::IncompatibleMetricDefinition(_) => "incompatible_definition",
            PushPrismError::Encode(_) => "encode",
            PushPrismError::Config(_) => "config",
        }
    }
}
