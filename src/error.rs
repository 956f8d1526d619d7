//! Error types shared across the crate.
//!
//! Internally everything is an `anyhow::Error` (aliased as `Res`). At the public boundary, the
//! error is tagged with an `ErrorType` so callers (the HTTP layer, the periodic tasks, `main`)
//! can tell a store failure from a remote sheet failure without string matching.

use serde::{Deserialize, Serialize};

/// Internal result type.
pub(crate) type Res<T> = anyhow::Result<T>;

/// Public result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The broad category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Connection or query failure against the row store.
    Store,
    /// Auth, network or quota failure from the spreadsheet backend.
    RemoteSheet,
    /// Bad or missing configuration.
    Config,
    /// Failure of the process itself, e.g. binding the listener or calling an outside service.
    Service,
}

serde_plain::derive_display_from_serialize!(ErrorType);

/// An error with its `ErrorType`.
#[derive(Debug, thiserror::Error)]
#[error("{kind} error: {inner:#}")]
pub struct Error {
    kind: ErrorType,
    inner: anyhow::Error,
}

impl Error {
    pub fn new(kind: ErrorType, inner: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            inner: inner.into(),
        }
    }

    pub fn kind(&self) -> ErrorType {
        self.kind
    }
}

/// Converts an internal `Res` into a public `Result` by tagging the error.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, kind: ErrorType) -> Result<T>;
}

impl<T> IntoResult<T> for Res<T> {
    fn pub_result(self, kind: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(kind, e))
    }
}
