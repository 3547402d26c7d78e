//! Typed references to staged artifacts.
//!
//! Tasks hand data to each other through files on shared staging storage.
//! An [`ArtifactRef`] names one such file together with its expected format,
//! so producer/consumer pairs can be checked when the graph is built instead
//! of failing mid-run on a malformed or missing file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Expected on-disk format of a staged artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    /// Comma-separated values.
    Csv,
    /// Tab-separated values.
    Tsv,
    /// JSON document.
    Json,
    /// Plain text, including fixed-width records.
    Text,
    /// Compressed archive (tgz, zip, ...).
    Archive,
    /// Anything else, named by the caller.
    Other(String),
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactFormat::Csv => write!(f, "csv"),
            ArtifactFormat::Tsv => write!(f, "tsv"),
            ArtifactFormat::Json => write!(f, "json"),
            ArtifactFormat::Text => write!(f, "text"),
            ArtifactFormat::Archive => write!(f, "archive"),
            ArtifactFormat::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A typed reference to one staged artifact: a path plus its expected format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Location of the artifact on shared staging storage.
    pub path: PathBuf,
    /// Format the producer promises and the consumer expects.
    pub format: ArtifactFormat,
}

impl ArtifactRef {
    /// Create a new artifact reference.
    pub fn new(path: impl Into<PathBuf>, format: ArtifactFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Shorthand for a CSV artifact.
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ArtifactFormat::Csv)
    }

    /// Shorthand for a plain-text artifact.
    pub fn text(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ArtifactFormat::Text)
    }

    /// The artifact path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when `other` produces what this reference consumes: same path,
    /// same format.
    pub fn satisfied_by(&self, other: &ArtifactRef) -> bool {
        self.path == other.path && self.format == other.format
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.format)
    }
}
