//! Error taxonomy for the snapshot lifecycle.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No automated/shared source exists to copy from, or a named snapshot is gone
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    /// Target name collision on copy
    #[error("snapshot already exists: {0}")]
    AlreadyExists(String),

    /// Provider API failure. `transient` covers throttling and network errors.
    #[error("{operation} failed{}: {message}", transient_tag(.transient))]
    Provider {
        operation: &'static str,
        transient: bool,
        message: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Only raised when the copy waiter was given a bound
    #[error("gave up waiting for {name} to become available after {attempts} polls")]
    WaitExhausted { name: String, attempts: u32 },
}

fn transient_tag(transient: &bool) -> &'static str {
    if *transient {
        " (transient)"
    } else {
        ""
    }
}

impl SnapshotError {
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            name: name.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider { transient: true, .. })
    }
}
