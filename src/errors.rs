//! Error taxonomy for topology, lifecycle and persistence operations.
//!
//! Validation errors are returned before any state is touched. Lifecycle
//! errors leave the brick in the state it had before the call.

use std::path::PathBuf;

/// Errors raised by the brick engine
#[derive(Debug, thiserror::Error)]
pub enum BrickError {
    /// Name fails the identifier grammar or is already taken
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Power-on attempted on a brick that is not fully configured
    #[error("Brick '{0}' is not configured")]
    BadConfig(String),

    /// A plug has no socket, or a loop was found while `error_on_loop` is set
    #[error("Brick '{0}' is not connected")]
    NotConnected(String),

    /// Reachability probe failed (cycle or dead dependency)
    #[error("Link check failed for brick '{0}'")]
    Linkloop(String),

    /// A non copy-on-write disk refers to a file held by another machine
    #[error("Disk base {0} already in use")]
    DiskLocked(PathBuf),

    /// Acquire/release of an image by an owner that does not hold it
    #[error("Image '{0}' is locked by another disk")]
    LockedImage(String),

    /// Event configured with both topology and shell actions
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Operation requested on an entity class it does not handle
    #[error("Unmanaged type: {0}")]
    UnmanagedType(String),

    /// Lookup of an entity or socket that does not exist
    #[error("No such entity: {0}")]
    NotFound(String),

    /// Command text that the dispatcher cannot interpret
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BrickError>;
