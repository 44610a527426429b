//! Error taxonomy for archive operations

use thiserror::Error;

use crate::resolution::Status;

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Errors surfaced by the archive core.
///
/// Validation failures (`MalformedTranscript`, `InvalidInput`) are raised
/// before the store is touched. Storage failures are never retried here.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Transcript payload failed structural validation
    #[error("malformed transcript: {field}: {reason}")]
    MalformedTranscript { field: String, reason: String },

    /// No episode exists for the session id
    #[error("episode not found: {session_id}")]
    NotFound { session_id: String },

    /// Backing database could not be read or written, or holds corrupt data
    #[error("storage unavailable while {context}: {source}")]
    StorageUnavailable {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Requested status change is not defined by the resolution lifecycle
    #[error("cannot move episode {session_id} from {from} to {to}")]
    InvalidTransition {
        session_id: String,
        from: Status,
        to: Status,
    },

    /// Caller input that is not a transcript problem (empty id, unreadable file)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Config file named explicitly could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),
}

impl ArchiveError {
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTranscript {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound {
            session_id: session_id.into(),
        }
    }

    pub fn storage<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::StorageUnavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ArchiveError::MalformedTranscript { .. } => "malformed_transcript",
            ArchiveError::NotFound { .. } => "not_found",
            ArchiveError::StorageUnavailable { .. } => "storage_unavailable",
            ArchiveError::InvalidTransition { .. } => "invalid_transition",
            ArchiveError::InvalidInput(_) => "invalid_input",
            ArchiveError::Config(_) => "config",
        }
    }

    /// Process exit status for the command surface
    pub fn exit_code(&self) -> i32 {
        match self {
            ArchiveError::MalformedTranscript { .. }
            | ArchiveError::InvalidTransition { .. }
            | ArchiveError::InvalidInput(_)
            | ArchiveError::Config(_) => 2,
            ArchiveError::NotFound { .. } => 3,
            ArchiveError::StorageUnavailable { .. } => 4,
        }
    }
}

/// Attach storage context to rusqlite results.
pub(crate) trait StorageContext<T> {
    fn storage(self, context: &str) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, rusqlite::Error> {
    fn storage(self, context: &str) -> Result<T> {
        self.map_err(|e| ArchiveError::storage(context, e))
    }
}
