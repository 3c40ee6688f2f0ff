//! Failure classes for one poll-and-sync run.
//!
//! Every variant is either retriable (the next scheduled trigger may well
//! succeed) or fatal (an operator has to change something first). Nothing in
//! the crate retries in-process; the classification only drives logging and
//! the process exit code.

use thiserror::Error;

use crate::types::BookError;

/// Errors raised while fetching a book from the exchange.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Exchange unreachable, timed out or answered 5xx
    #[error("exchange network error: {0}")]
    Network(String),

    /// Exchange throttled the request
    #[error("exchange rate limit: {0}")]
    RateLimited(String),

    /// The exchange does not list the configured pair
    #[error("invalid pair: {0}")]
    InvalidPair(String),

    /// Response did not match the expected schema or violated book invariants
    #[error("malformed exchange response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::RateLimited(_))
    }
}

impl From<BookError> for FetchError {
    fn from(e: BookError) -> Self {
        FetchError::MalformedResponse(e.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::MalformedResponse(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Errors raised while writing to storage.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credentials rejected or expired
    #[error("storage auth error: {0}")]
    Auth(String),

    /// Storage quota or API rate limit hit
    #[error("storage quota error: {0}")]
    Quota(String),

    #[error("storage network error: {0}")]
    Network(String),

    /// Storage refused the request for a reason other than auth or quota
    #[error("storage rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("storage io error: {0}")]
    Io(String),

    /// The existing object could not be merged with
    #[error("existing object {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

impl SyncError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, SyncError::Quota(_) | SyncError::Network(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Network(e.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => SyncError::Auth(e.to_string()),
            _ => SyncError::Io(e.to_string()),
        }
    }
}

/// Errors raised while loading credential material.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credential configured (set CREDENTIAL_PATH, GDRIVE_SA_JSON or GDRIVE_ACCESS_TOKEN)")]
    Missing,

    #[error("cannot read credential file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("invalid service account key: {0}")]
    InvalidKey(String),
}

/// Terminal outcome of a failed run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("run exceeded its {0}s deadline")]
    TimedOut(u64),
}

/// `EX_TEMPFAIL` from sysexits.h
pub const EXIT_RETRIABLE: u8 = 75;
/// `EX_CONFIG` from sysexits.h
pub const EXIT_CONFIG: u8 = 78;
pub const EXIT_FATAL: u8 = 1;

impl RunError {
    pub fn is_retriable(&self) -> bool {
        match self {
            RunError::Config(_) | RunError::Credential(_) => false,
            RunError::Fetch(e) => e.is_retriable(),
            RunError::Sync(e) => e.is_retriable(),
            RunError::TimedOut(_) => true,
        }
    }

    /// Short label for log lines.
    pub fn class(&self) -> &'static str {
        match self {
            RunError::Config(_) => "config",
            RunError::Credential(_) => "credential",
            RunError::Fetch(FetchError::Network(_)) => "fetch.network",
            RunError::Fetch(FetchError::RateLimited(_)) => "fetch.rate_limit",
            RunError::Fetch(FetchError::InvalidPair(_)) => "fetch.invalid_pair",
            RunError::Fetch(FetchError::MalformedResponse(_)) => "fetch.malformed",
            RunError::Sync(SyncError::Auth(_)) => "sync.auth",
            RunError::Sync(SyncError::Quota(_)) => "sync.quota",
            RunError::Sync(SyncError::Network(_)) => "sync.network",
            RunError::Sync(SyncError::Rejected { .. }) => "sync.rejected",
            RunError::Sync(SyncError::Io(_)) => "sync.io",
            RunError::Sync(SyncError::Corrupt { .. }) => "sync.corrupt",
            RunError::TimedOut(_) => "timeout",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Config(_) | RunError::Credential(_) => EXIT_CONFIG,
            e if e.is_retriable() => EXIT_RETRIABLE,
            _ => EXIT_FATAL,
        }
    }
}
