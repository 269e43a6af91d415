//! Completed artifacts and the artifact map.
//!
//! The [`ArtifactMap`] records, for every task that has finished its whole
//! transformer chain, where its output ended up. Later tasks consult it to
//! turn `@ref(...)` tokens into final URLs. It is append-only for the length
//! of a build: an identity is registered once, and two identities may not
//! claim the same output path. Output paths are normalised on the way in,
//! so `x.html` and `./x.html` are the same path.

use crate::reference::{normalize, output_url};
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("'{0}' is already registered in the artifact map")]
    DuplicateIdentity(String),
    #[error("'{identity}' and '{existing}' both produce {output_path}")]
    OutputCollision {
        identity: String,
        existing: String,
        output_path: String,
    },
    #[error("'{identity}' has an output path outside the destination: '{output_path}'")]
    InvalidOutputPath {
        identity: String,
        output_path: String,
    },
}

/// Source identity → final output path, for completed tasks.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ArtifactMap {
    entries: BTreeMap<String, String>,
    /// Reverse index used to reject output collisions. Never serialized.
    #[serde(skip)]
    outputs: BTreeMap<String, String>,
}

impl ArtifactMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        identity: impl Into<String>,
        output_path: impl Into<String>,
    ) -> Result<(), ArtifactError> {
        let identity = identity.into();
        let raw = output_path.into();
        let Some(output_path) = normalize(&raw) else {
            return Err(ArtifactError::InvalidOutputPath {
                identity,
                output_path: raw,
            });
        };

        if self.entries.contains_key(&identity) {
            return Err(ArtifactError::DuplicateIdentity(identity));
        }
        match self.outputs.entry(output_path.clone()) {
            Entry::Occupied(existing) => Err(ArtifactError::OutputCollision {
                identity,
                existing: existing.get().clone(),
                output_path,
            }),
            Entry::Vacant(slot) => {
                slot.insert(identity.clone());
                self.entries.insert(identity, output_path);
                Ok(())
            }
        }
    }

    /// Claim an output path for something that is not a source file.
    ///
    /// The path never appears in lookups or the serialized map, but a task
    /// producing it fails with [`ArtifactError::OutputCollision`] naming
    /// `owner`.
    pub fn reserve_output(&mut self, output_path: &str, owner: &str) {
        if let Some(path) = normalize(output_path) {
            self.outputs.entry(path).or_insert_with(|| owner.to_string());
        }
    }

    /// Final output path of a completed identity.
    pub fn get(&self, identity: &str) -> Option<&str> {
        self.entries.get(identity).map(String::as_str)
    }

    /// Root-relative URL (`/css/site.css`) of a completed identity.
    pub fn url(&self, identity: &str) -> Option<String> {
        self.get(identity).map(output_url)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by identity.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// What a completed task hands to the output writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactBody {
    File(Vec<u8>),
    Directory,
}

/// The final product of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Source identity of the task that produced it.
    pub identity: String,
    /// Destination-relative output path.
    pub output_path: String,
    pub body: ArtifactBody,
    /// Transformers that ran, in order. Empty for verbatim copies.
    pub applied: Vec<String>,
}

impl Artifact {
    pub fn is_dir(&self) -> bool {
        matches!(self.body, ArtifactBody::Directory)
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.body {
            ArtifactBody::File(bytes) => bytes,
            ArtifactBody::Directory => &[],
        }
    }
}
