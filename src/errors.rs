//! Standardized error types following the `error-accounts-<domain>-<number>` format.

use thiserror::Error;

/// Coarse classification shared by every manager error.
///
/// The transport layer maps these onto status codes; nothing in this crate
/// depends on the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    Internal,
    InvalidArgument,
}

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when version information is not available
    #[error("error-accounts-config-1 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when duration string cannot be parsed
    #[error("error-accounts-config-2 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when the password hash cost is not a number or out of range
    #[error("error-accounts-config-3 Invalid PASSWORD_HASH_COST '{0}': expected an integer between 4 and 31")]
    HashCostParsingFailed(String),

    /// Error when the default grant list is empty
    #[error("error-accounts-config-4 DEFAULT_USER_GRANTS must name at least one grant")]
    EmptyDefaultGrants,
}

/// Database/storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error when database connection fails
    #[error("error-accounts-storage-1 Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Error when query execution fails
    #[error("error-accounts-storage-2 Query execution failed: {0}")]
    QueryFailed(String),

    /// Error when data serialization fails
    #[error("error-accounts-storage-3 Data serialization failed: {0}")]
    SerializationFailed(String),

    /// Error when database operation fails
    #[error("error-accounts-storage-4 Database error: {0}")]
    DatabaseError(String),

    /// Error when stored data cannot be decoded
    #[error("error-accounts-storage-5 Invalid data: {0}")]
    InvalidData(String),

    /// The request was cancelled before the store call completed
    #[error("error-accounts-storage-6 Request cancelled")]
    Cancelled,

    /// The request deadline passed before the store call completed
    #[error("error-accounts-storage-7 Request deadline exceeded")]
    DeadlineExceeded,
}

impl StorageError {
    /// Whether the request context stopped the call, as opposed to a store fault
    pub fn is_interrupted(&self) -> bool {
        matches!(self, StorageError::Cancelled | StorageError::DeadlineExceeded)
    }
}

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordError {
    /// Error when the hashing backend fails
    #[error("error-accounts-password-1 Password hashing failed: {0}")]
    HashingFailed(String),

    /// Error when a stored hash cannot be parsed
    #[error("error-accounts-password-2 Stored password hash is malformed: {0}")]
    MalformedHash(String),

    /// Error when the blocking hashing task did not complete
    #[error("error-accounts-password-3 Password hashing task failed: {0}")]
    TaskFailed(String),

    /// Error when the password is longer than the hashing backend reads
    #[error("error-accounts-password-4 Password is {0} bytes, at most 72 are allowed")]
    TooLong(usize),
}

/// Client lifecycle errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// No active client matches the identifier
    #[error("error-accounts-client-1 Client not found: {0}")]
    NotFound(String),

    /// Unsupported status action
    #[error("error-accounts-client-2 Action not found, expected enable or disable: {0}")]
    InvalidAction(String),

    /// Inbound client payload failed validation
    #[error("error-accounts-client-3 Invalid client payload: {0}")]
    InvalidPayload(String),

    /// Underlying store failed
    #[error("error-accounts-client-4 Client storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::NotFound(_) => ErrorKind::NotFound,
            ClientError::InvalidAction(_) | ClientError::InvalidPayload(_) => {
                ErrorKind::InvalidArgument
            }
            ClientError::Storage(_) => ErrorKind::Internal,
        }
    }
}

/// User account errors
#[derive(Debug, Error)]
pub enum UserError {
    /// No active user matches the identifier
    #[error("error-accounts-user-1 User not found: {0}")]
    NotFound(String),

    /// An active user already holds the email
    #[error("error-accounts-user-2 Email already registered in the system: {0}")]
    EmailConflict(String),

    /// Current password did not verify
    #[error("error-accounts-user-3 Incorrect current password")]
    IncorrectPassword,

    /// The client referenced by an authorization is not active
    #[error("error-accounts-user-4 Client not found: {0}")]
    ClientNotFound(String),

    /// Inbound user payload failed validation
    #[error("error-accounts-user-5 Invalid user payload: {0}")]
    InvalidPayload(String),

    /// Password hashing failed
    #[error("error-accounts-user-6 {0}")]
    Password(#[from] PasswordError),

    /// Underlying store failed
    #[error("error-accounts-user-7 User storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl UserError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UserError::NotFound(_) | UserError::ClientNotFound(_) => ErrorKind::NotFound,
            UserError::EmailConflict(_) => ErrorKind::Conflict,
            UserError::IncorrectPassword => ErrorKind::Forbidden,
            UserError::InvalidPayload(_) => ErrorKind::InvalidArgument,
            UserError::Password(_) | UserError::Storage(_) => ErrorKind::Internal,
        }
    }
}
