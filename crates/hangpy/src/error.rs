use std::path::PathBuf;

use thiserror::Error;

use crate::host::BoxError;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// Runtime materialization or keyword bootstrap failed. Terminal for the session.
    #[error("boot failed: {0}")]
    Boot(String),

    /// A run was requested before boot completed.
    #[error("runtime is not ready")]
    NotReady,

    #[error("session already booted")]
    AlreadyBooted,

    /// The guest program raised.
    #[error("{message}")]
    Guest { message: String },

    /// A line was requested while another request was still pending.
    #[error("input requested while another request is pending")]
    InputProtocolMisuse,

    /// The bridge went away before the pending request was answered.
    #[error("input request abandoned")]
    InputAbandoned,

    #[error("not a .kpy file: {}", path.display())]
    InvalidExtension { path: PathBuf },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Interpreter failure outside guest code (engine, host callback, output sink).
    #[error("runtime error: {0}")]
    Runtime(#[source] anyhow::Error),
}

impl Error {
    /// Wrap an error raised on the host side of a guest call.
    #[must_use]
    pub fn from_host(err: BoxError) -> Self {
        Self::Runtime(anyhow::Error::from_boxed(err))
    }

    /// Whether the error was raised by guest code rather than the host.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest { .. })
    }
}
