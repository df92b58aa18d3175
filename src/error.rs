use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable, transport-independent classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidOperation,
    InvalidInput,
    DuplicateResource,
    PaymentProcessing,
    Forbidden,
    Configuration,
    Internal,
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Every field error collected while validating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(pub Vec<FieldError>);

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// Turns the collected errors into `Err` when at least one was recorded.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::InvalidInput(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidOperation(String),
    #[error("invalid input: {0}")]
    InvalidInput(FieldErrors),
    #[error("{0}")]
    DuplicateResource(String),
    #[error("payment processing failed: {0}")]
    PaymentProcessing(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ServiceError {
    pub fn not_found(what: &str, id: impl fmt::Display) -> Self {
        Self::NotFound(format!("{what} {id} not found"))
    }

    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput(FieldErrors(vec![FieldError::new(field, message)]))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::DuplicateResource(_) => ErrorKind::DuplicateResource,
            Self::PaymentProcessing(_) => ErrorKind::PaymentProcessing,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Csv(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
