//! Workspace Manager - Per-Request Scratch Artifacts
//!
//! Every execution request gets its own directory:
//!
//! ```text
//! <scratch_root>/
//! └── <family>/            compiled-native | interpreted-dynamic | interpreted-scripting
//!     └── <token>/         one per request, removed on every exit path
//!         ├── <token>.go   source (suffix chosen by the adapter)
//!         └── <token>.bin  built artifact, compiled-native only
//! ```
//!
//! The token is a random v4 UUID, so identical concurrent requests never
//! collide. A [`ScratchArtifact`] is a scoped value: [`ScratchArtifact::release`]
//! consumes it, and `Drop` removes the tree if the owner never got that far
//! (panic or a cancelled future).
//!
//! Removal is best-effort. A failure is logged and swallowed because a leaked
//! directory is less severe than masking an execution outcome.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::language::LanguageFamily;

/// Allocates scratch artifacts under a fixed root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every artifact of one family.
    pub fn family_dir(&self, family: LanguageFamily) -> PathBuf {
        self.root.join(family.dir_name())
    }

    /// Create a fresh directory and write `contents` into `<token><suffix>`.
    ///
    /// Fails only when the backing storage refuses the directory or the file;
    /// nothing has been spawned at that point.
    pub fn acquire(
        &self,
        family: LanguageFamily,
        suffix: &str,
        contents: &str,
    ) -> Result<ScratchArtifact> {
        let token = Uuid::new_v4().simple().to_string();
        let root_dir = self.family_dir(family).join(&token);

        fs::create_dir_all(&root_dir).map_err(|source| EngineError::Scratch {
            path: root_dir.clone(),
            source,
        })?;

        let artifact = ScratchArtifact {
            source_path: root_dir.join(format!("{token}{suffix}")),
            suffix: suffix.to_string(),
            token,
            root_dir,
            built_path: None,
            released: false,
        };

        // The artifact already owns the directory; an early return drops it.
        fs::write(&artifact.source_path, contents).map_err(|source| EngineError::Scratch {
            path: artifact.root_dir.clone(),
            source,
        })?;

        debug!(
            family = %family,
            token = %artifact.token,
            "Acquired scratch artifact"
        );
        Ok(artifact)
    }
}

/// Transient on-disk state owned by exactly one in-flight request.
#[derive(Debug)]
pub struct ScratchArtifact {
    token: String,
    root_dir: PathBuf,
    source_path: PathBuf,
    suffix: String,
    built_path: Option<PathBuf>,
    released: bool,
}

impl ScratchArtifact {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn built_path(&self) -> Option<&Path> {
        self.built_path.as_deref()
    }

    /// Reserve the path the build step writes its output to.
    pub fn reserve_built_artifact(&mut self) -> PathBuf {
        let path = self.root_dir.join(format!("{}.bin", self.token));
        self.built_path = Some(path.clone());
        path
    }

    /// Name shown to users in place of the real source path.
    pub fn display_name(&self) -> String {
        format!("main{}", self.suffix)
    }

    /// Replace internal paths in tool output with neutral names.
    pub fn scrub(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let mut out = text.replace(
            self.source_path.to_string_lossy().as_ref(),
            &self.display_name(),
        );
        if let Some(built) = &self.built_path {
            out = out.replace(built.to_string_lossy().as_ref(), "main");
        }
        out.replace(self.root_dir.to_string_lossy().as_ref(), ".")
            .replace(&self.token, "main")
    }

    /// Remove the whole directory tree. Never fails.
    pub fn release(mut self) {
        self.remove_tree();
    }

    fn remove_tree(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match fs::remove_dir_all(&self.root_dir) {
            Ok(()) => debug!(token = %self.token, "Released scratch artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(token = %self.token, "Scratch artifact already removed")
            }
            Err(e) => warn!(
                token = %self.token,
                error = %e,
                "Failed to remove scratch artifact; leaving it behind"
            ),
        }
    }
}

impl Drop for ScratchArtifact {
    fn drop(&mut self) {
        if !self.released {
            debug!(token = %self.token, "Scratch artifact dropped without release");
            self.remove_tree();
        }
    }
}
