//! Engine Error Taxonomy
//!
//! Everything in here is an *infrastructure* failure: the toolchain or the
//! host environment could not do its part. A user's program failing inside a
//! working toolchain is never an `EngineError`; it becomes a `ToolError`
//! outcome instead (see [`crate::engine::report`]).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::language::Language;

/// Infrastructure-level failures raised by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested language name is not part of the closed language set.
    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),

    /// The language is known but no adapter was registered for it.
    #[error("no toolchain adapter registered for {0}")]
    AdapterMissing(Language),

    /// The adapter does not implement the requested auxiliary operation.
    #[error("{operation} is not supported for {language}")]
    Unsupported {
        operation: &'static str,
        language: Language,
    },

    /// A required executable is not on the execution path.
    #[error("required tool '{tool}' was not found on PATH")]
    ToolNotFound { tool: String },

    /// The executable exists but could not be started.
    #[error("failed to start '{tool}': {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// Scratch space could not be allocated. The path is kept for logs only.
    #[error("failed to allocate scratch space: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Bounded environment setup (e.g. writing a module manifest) failed.
    #[error("environment setup failed: {0}")]
    Setup(String),

    /// Waiting on or reading from a spawned process failed.
    #[error("process I/O failed for '{tool}': {source}")]
    ProcessIo {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// A package specification was rejected before any tool was invoked.
    #[error("invalid package specification '{0}'")]
    InvalidPackageSpec(String),
}

impl EngineError {
    /// Map a spawn failure to the right variant: a missing binary is
    /// reported as [`EngineError::ToolNotFound`].
    pub fn from_spawn(tool: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::ToolNotFound {
                tool: tool.to_string(),
            }
        } else {
            Self::Spawn {
                tool: tool.to_string(),
                source,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
