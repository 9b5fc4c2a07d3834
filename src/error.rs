//! Error types
//!
//! [`ApiError`] is what a provider call returns. [`InventoryError`] is what
//! every inventory operation returns; it separates hard API failures from
//! caller mistakes, missing resources and ambiguous lookups so callers can
//! decide whether a failure means "inventory unavailable" or "does not exist".

use std::fmt;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = InventoryError> = std::result::Result<T, E>;

/// A failed provider call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service}.{operation} failed in {region}: {code}: {message}")]
pub struct ApiError {
    pub service: String,
    pub operation: String,
    /// Region the client was bound to, or `global`
    pub region: String,
    /// HTTP status when the failure came from a response
    pub status: Option<u16>,
    /// Provider error code, e.g. `AccessDeniedException`
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        region: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            region: region.into(),
            status: None,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Top-level error type for inventory operations
#[derive(Debug, Error)]
pub enum InventoryError {
    /// A provider call failed with something other than a tolerated denial
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The region catalog could not be read
    #[error("could not enumerate regions: {0}")]
    Regions(#[source] ApiError),

    /// Caller supplied a missing or ill-shaped argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    /// A record did not carry a field its identity is derived from
    #[error("cannot derive identity for {kind}: field '{field}' is missing")]
    MissingIdentity { kind: String, field: String },

    #[error("{kind} with {attribute} = {value} does not exist")]
    NotFound {
        kind: String,
        attribute: String,
        value: String,
    },

    #[error("{count} {kind} resources match {attribute} = {value}, expected exactly one")]
    Ambiguous {
        kind: String,
        attribute: String,
        value: String,
        count: usize,
    },

    #[error("{operation} returned pagination token {token:?} twice")]
    RepeatedToken { operation: String, token: String },

    #[error("malformed response from {operation}: {reason}")]
    MalformedResponse { operation: String, reason: String },

    /// One or more pool jobs failed
    #[error(transparent)]
    Jobs(JobErrors),

    /// A job panicked or never reported an outcome
    #[error("job {index} did not complete: {reason}")]
    JobAborted { index: usize, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl InventoryError {
    /// The underlying provider error, if this is a direct API failure
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            InventoryError::Api(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, InventoryError::NotFound { .. })
    }
}

/// A failed job and its submission index
#[derive(Debug)]
pub struct JobFailure {
    pub index: usize,
    pub error: InventoryError,
}

/// Combined failures of a job pool; every individual message is kept
#[derive(Debug, Default)]
pub struct JobErrors {
    pub failures: Vec<JobFailure>,
}

impl JobErrors {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.error.to_string()).collect()
    }
}

impl fmt::Display for JobErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failures.as_slice() {
            [] => write!(f, "no job failures"),
            [only] => write!(f, "{}", only.error),
            many => {
                write!(f, "{} jobs failed: ", many.len())?;
                for (i, failure) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "[job {}] {}", failure.index, failure.error)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for JobErrors {}
