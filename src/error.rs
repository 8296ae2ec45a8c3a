use thiserror::Error;

use crate::registration::MIN_PASSWORD_LEN;

/// Bad user input, rejected before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter both the booking date (day-month-year) and the time.")]
    MissingBookingField,
    #[error("Booking date must be written as day-month-year, got `{0}`.")]
    MalformedDate(String),
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("Password must be at least {} characters.", MIN_PASSWORD_LEN)]
    PasswordTooShort,
    #[error("Password and confirmation do not match.")]
    PasswordMismatch,
    #[error("Service name and price are required.")]
    MissingServiceField,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("An account already exists for {0}.")]
    IdentityExists(String),
    #[error("Weak password: {0}")]
    WeakCredential(String),
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl AppError {
    /// Text shown to the user in the one-shot notice.
    ///
    /// Storage failures are reported with a generic message; the details only
    /// go to the log.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(err) => err.to_string(),
            AppError::Auth(err) => err.to_string(),
            AppError::Persistence(_) => "Something went wrong while saving. Please try again.".to_string(),
        }
    }
}
