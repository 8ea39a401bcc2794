use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::profiles::StoreError;

/// Errors surfaced by the mount engine.
///
/// Only failures of the primary mount/unmount flow or its direct
/// preconditions appear here; automation, reconciliation and resolution
/// failures are logged and swallowed where they occur.
#[derive(Debug, Error)]
pub enum MountError {
    /// The profile's connection target is not a well-formed URL
    #[error("invalid connection target '{0}'")]
    InvalidTarget(String),

    #[error("failed to create mount point {path:?}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mount provider rejected or failed the attempt
    #[error("mount failed ({code}): {message}")]
    ProviderFailed { code: i32, message: String },

    /// The soft-mount attempt did not finish within the allowed window
    #[error("mount attempt timed out after {0} seconds")]
    Timeout(u64),

    #[error("unmount of {path:?} failed: {message}")]
    UnmountFailed { path: PathBuf, message: String },

    #[error("no profile with id {0}")]
    ProfileNotFound(Uuid),

    #[error("could not read the system mount table: {0}")]
    MountTable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MountError {
    /// Short form used for the ERROR status message shown to the user
    pub fn status_message(&self) -> String {
        self.to_string()
    }
}

pub type MountResult<T> = Result<T, MountError>;
