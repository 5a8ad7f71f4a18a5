//! Error taxonomy surfaced by the core.
//!
//! Local errors (storage, codec) are recovered close to where they happen.
//! Remote errors drive the sync state machine and are `Clone` so that a
//! single in-flight sync can hand the same outcome to every waiter.

use thiserror::Error;

/// Local persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Backing store missing or quota exceeded.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write would break an entity rule (lowering a counter, clearing `unlockedAt`, ...).
    #[error("write rejected: {0}")]
    Rejected(String),

    /// Encoding a value for storage failed.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Internal invariant violation. The operation was aborted and state left unchanged.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// A payload did not match the schema it was decoded against.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{schema}: {reason}")]
pub struct SchemaError {
    pub schema: &'static str,
    pub reason: String,
}

impl SchemaError {
    pub fn new(schema: &'static str, reason: impl Into<String>) -> Self {
        Self {
            schema,
            reason: reason.into(),
        }
    }
}

/// Errors reported by a remote adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl RemoteError {
    /// Transient errors are retried through the queue and backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::NetworkUnavailable(_)
                | RemoteError::RateLimited { .. }
                | RemoteError::ServerError(_)
        )
    }

    /// Short stable name, used in logs and persisted `lastError` fields.
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::NotAuthenticated => "NotAuthenticated",
            RemoteError::NetworkUnavailable(_) => "NetworkUnavailable",
            RemoteError::RateLimited { .. } => "RateLimited",
            RemoteError::Conflict(_) => "Conflict",
            RemoteError::NotFound(_) => "NotFound",
            RemoteError::ServerError(_) => "ServerError",
            RemoteError::SchemaMismatch(_) => "SchemaMismatch",
        }
    }
}

impl From<SchemaError> for RemoteError {
    fn from(e: SchemaError) -> Self {
        RemoteError::SchemaMismatch(e.to_string())
    }
}

/// Authentication failures from `sign_up` / `sign_in` / `sign_out`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("auth backend unavailable: {0}")]
    Unavailable(String),

    #[error("auth failed: {0}")]
    Other(String),
}

/// Errors returned by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// No authenticated identity, or the engine was disabled by `NotAuthenticated`.
    #[error("sync disabled")]
    Disabled,

    /// The active identity changed while the operation was running.
    #[error("cancelled by identity change")]
    Cancelled,

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl SyncError {
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, SyncError::Remote(RemoteError::NotAuthenticated))
    }
}

impl From<SchemaError> for SyncError {
    fn from(e: SchemaError) -> Self {
        SyncError::Storage(StorageError::Schema(e))
    }
}

/// Errors from the statistics aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("no active session")]
    NoActiveSession,

    #[error("attempt for game `{got}` while `{active}` session is active")]
    GameMismatch { active: String, got: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
pub type SyncResult<T> = std::result::Result<T, SyncError>;
