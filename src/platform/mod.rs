//! Platform launcher archive resolution and realm config generation.
//!
//! Both are collaborators of the booter: the session only needs the
//! resulting file locations.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{AppError, Result};

pub mod realm;

/// Default group of the platform launcher artifact.
pub const DEFAULT_GROUP_ID: &str = "org.sonatype.appbooter.plexus-platforms";

/// Default name of the platform launcher artifact.
pub const DEFAULT_ARTIFACT_ID: &str = "plexus-platform-base";

/// Default version of the platform launcher artifact.
pub const DEFAULT_VERSION: &str = "1.0-SNAPSHOT";

/// Coordinates of the platform launcher archive. The type is always `jar`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformArtifact {
    /// Artifact group.
    pub group_id: String,
    /// Artifact name.
    pub artifact_id: String,
    /// Artifact version.
    pub version: String,
}

impl Default for PlatformArtifact {
    fn default() -> Self {
        Self::new(DEFAULT_GROUP_ID, DEFAULT_ARTIFACT_ID, DEFAULT_VERSION)
    }
}

impl PlatformArtifact {
    /// Construct coordinates.
    #[must_use]
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            artifact_id: artifact_id.to_owned(),
            version: version.to_owned(),
        }
    }

    /// File name of the archive, e.g. `plexus-platform-base-1.0-SNAPSHOT.jar`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}-{}.jar", self.artifact_id, self.version)
    }
}

impl Display for PlatformArtifact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:jar:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Resolves platform coordinates to an archive on disk.
pub trait PlatformResolver: Send + Sync {
    /// Locate the archive for `artifact`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Resolution` when the archive cannot be found.
    fn resolve(&self, artifact: &PlatformArtifact) -> Result<PathBuf>;
}

/// Resolver reading a local repository laid out as
/// `<group as path>/<artifact>/<version>/<artifact>-<version>.jar`.
#[derive(Debug, Clone)]
pub struct LocalRepositoryResolver {
    root: PathBuf,
}

impl LocalRepositoryResolver {
    /// Create a resolver rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Repository root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `artifact` would live in this repository.
    #[must_use]
    pub fn artifact_path(&self, artifact: &PlatformArtifact) -> PathBuf {
        let mut path = self.root.clone();
        for segment in artifact.group_id.split('.').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path.push(&artifact.artifact_id);
        path.push(&artifact.version);
        path.push(artifact.file_name());
        path
    }
}

impl PlatformResolver for LocalRepositoryResolver {
    fn resolve(&self, artifact: &PlatformArtifact) -> Result<PathBuf> {
        let path = self.artifact_path(artifact);
        debug!(%artifact, path = %path.display(), "resolving platform artifact");
        if path.is_file() {
            Ok(path)
        } else {
            Err(AppError::Resolution(format!(
                "cannot find platform artifact {artifact} at {}",
                path.display()
            )))
        }
    }
}

/// Resolver that always answers with one fixed archive.
#[derive(Debug, Clone)]
pub struct FixedPathResolver {
    path: PathBuf,
}

impl FixedPathResolver {
    /// Create a resolver returning `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PlatformResolver for FixedPathResolver {
    fn resolve(&self, artifact: &PlatformArtifact) -> Result<PathBuf> {
        if self.path.is_file() {
            Ok(self.path.clone())
        } else {
            Err(AppError::Resolution(format!(
                "platform archive for {artifact} not found at {}",
                self.path.display()
            )))
        }
    }
}
