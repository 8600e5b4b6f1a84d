//! Error types for the extraction, embedding, and service layers.
//!
//! Store and plumbing code returns `anyhow::Result`; these typed errors
//! mark the boundaries where callers need to tell failures apart.

use thiserror::Error;

/// Content extraction failures. Raised synchronously at submission time;
/// the pipeline never starts for a document that failed extraction.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("document contains no extractable text")]
    EmptyDocument,

    #[error("extraction timed out after {0}s")]
    ExtractionTimeout(u64),

    #[error("document is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("unreadable document: {0}")]
    Unreadable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Embedding provider failures.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// Network or transport failure (connect, timeout, TLS).
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider answered with a non-success status.
    #[error("embedding provider returned {status}: {body}")]
    ProviderError { status: u16, body: String },

    /// The response body could not be parsed or carried no vector.
    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),
}

/// Errors surfaced synchronously by the document service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("document not found: {0}")]
    NotFound(String),

    /// A staged upload was cancelled or superseded before it finished.
    #[error("upload cancelled for owner {0}")]
    Cancelled(String),

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error("persistence error: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl ServiceError {
    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "bad_request",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Cancelled(_) => "cancelled",
            ServiceError::Extraction(ExtractError::UnsupportedFormat(_)) => "unsupported_format",
            ServiceError::Extraction(ExtractError::EmptyDocument) => "empty_document",
            ServiceError::Extraction(ExtractError::ExtractionTimeout(_)) => "extraction_timeout",
            ServiceError::Extraction(ExtractError::TooLarge { .. }) => "too_large",
            ServiceError::Extraction(_) => "extraction_failed",
            ServiceError::Persistence(_) => "internal",
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
