//! Output writer: materialises completed artifacts under the destination.
//!
//! Each artifact lands at `destination/<output_path>`; parent directories are
//! created as needed and existing files are overwritten. Nothing under the
//! destination is ever deleted, so stale output from earlier builds survives
//! until the caller removes it.
//!
//! Writes run in parallel. A failure to write one artifact is recorded as a
//! [`TaskError`] for that artifact and does not stop the others.

use crate::artifact::{Artifact, ArtifactBody, ArtifactMap};
use crate::engine::{CancelToken, PipelineError, TaskError, TaskErrorKind};
use crate::reference::normalize;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the optional artifact manifest.
pub const MANIFEST_FILE: &str = "artifact-manifest.json";

#[derive(Debug, Clone)]
pub struct OutputWriter {
    destination: PathBuf,
    cancel: CancelToken,
}

impl OutputWriter {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Write every artifact, returning the per-artifact failures.
    ///
    /// Only a destination root that cannot be created, or cancellation,
    /// aborts the whole write.
    pub fn write_all(&self, artifacts: &[Artifact]) -> Result<Vec<TaskError>, PipelineError> {
        fs::create_dir_all(&self.destination)?;

        let errors: Vec<TaskError> = artifacts
            .par_iter()
            .filter_map(|artifact| {
                if self.cancel.is_cancelled() {
                    return None;
                }
                self.write_artifact(artifact).err()
            })
            .collect();

        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(errors)
    }

    /// Write one artifact. Output paths must already be normalised and stay
    /// below the destination.
    pub fn write_artifact(&self, artifact: &Artifact) -> Result<(), TaskError> {
        if normalize(&artifact.output_path).as_deref() != Some(artifact.output_path.as_str()) {
            warn!(path = %artifact.output_path, "refusing to write outside the destination");
            return Err(TaskError::new(
                artifact.identity.clone(),
                TaskErrorKind::InvalidOutputPath {
                    output_path: artifact.output_path.clone(),
                },
            ));
        }
        let target = self.destination.join(&artifact.output_path);
        let result = match &artifact.body {
            ArtifactBody::Directory => fs::create_dir_all(&target),
            ArtifactBody::File(bytes) => target
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|()| fs::write(&target, bytes)),
        };
        match result {
            Ok(()) => {
                debug!(path = %artifact.output_path, "wrote artifact");
                Ok(())
            }
            Err(source) => {
                warn!(path = %artifact.output_path, error = %source, "write failed");
                Err(TaskError::new(
                    artifact.identity.clone(),
                    TaskErrorKind::Write {
                        output_path: artifact.output_path.clone(),
                        source,
                    },
                ))
            }
        }
    }

    /// Write the artifact map as `artifact-manifest.json` at the root.
    pub fn write_manifest(&self, map: &ArtifactMap) -> Result<(), TaskError> {
        let to_error = |source: std::io::Error| {
            TaskError::new(
                MANIFEST_FILE,
                TaskErrorKind::Write {
                    output_path: MANIFEST_FILE.to_string(),
                    source,
                },
            )
        };
        let json = map.to_json().map_err(|e| to_error(e.into()))?;
        fs::write(self.destination.join(MANIFEST_FILE), json).map_err(to_error)
    }
}
