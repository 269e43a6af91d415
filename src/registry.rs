//! Transformer registry.
//!
//! Registration order is the only precedence signal in the pipeline: a
//! utility-class CSS compiler registered before a CSS post-processor runs
//! before it, and swapping the two registrations is the supported way to
//! change that. Nothing is inferred from transformer types.
//!
//! The registry has two phases, expressed as two types:
//!
//! - [`TransformerRegistry`] is the mutable builder used while configuring.
//! - [`FrozenRegistry`] is the immutable snapshot a [`Pipeline`] runs with.
//!
//! [`TransformerRegistry::freeze`] consumes the builder, so once a pipeline
//! holds the registry there is no handle left to register through.
//!
//! [`Pipeline`]: crate::engine::Pipeline

use crate::classify::{Classification, classify};
use crate::rules::PathRules;
use crate::transform::Transformer;
use crate::types::{ContentType, SourceEntry};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Transformer '{0}' is already registered")]
    DuplicateIdentity(String),
    #[error("Unknown transformer '{0}'")]
    Unknown(String),
}

/// A registered transformer together with its precedence.
#[derive(Clone)]
pub struct TransformerDescriptor {
    pub identity: String,
    /// Position in registration order; lower runs first.
    pub priority: usize,
    pub produces: Option<ContentType>,
    transformer: Arc<dyn Transformer>,
}

impl TransformerDescriptor {
    pub fn applies_to(&self, path: &str, content_type: &ContentType) -> bool {
        self.transformer.applies_to(path, content_type)
    }

    pub fn transformer(&self) -> &dyn Transformer {
        self.transformer.as_ref()
    }
}

impl fmt::Debug for TransformerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerDescriptor")
            .field("identity", &self.identity)
            .field("priority", &self.priority)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}

/// Ordered list of transformers, open for registration.
#[derive(Debug, Clone, Default)]
pub struct TransformerRegistry {
    descriptors: Vec<TransformerDescriptor>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transformer at the lowest precedence so far.
    pub fn register<T>(&mut self, transformer: T) -> Result<(), RegistryError>
    where
        T: Transformer + 'static,
    {
        self.register_shared(Arc::new(transformer))
    }

    /// [`register`](Self::register) for a transformer that is already shared.
    pub fn register_shared(
        &mut self,
        transformer: Arc<dyn Transformer>,
    ) -> Result<(), RegistryError> {
        let identity = transformer.name().to_string();
        if self.descriptors.iter().any(|d| d.identity == identity) {
            return Err(RegistryError::DuplicateIdentity(identity));
        }
        self.descriptors.push(TransformerDescriptor {
            priority: self.descriptors.len(),
            produces: transformer.produces(),
            identity,
            transformer,
        });
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T>(mut self, transformer: T) -> Result<Self, RegistryError>
    where
        T: Transformer + 'static,
    {
        self.register(transformer)?;
        Ok(self)
    }

    /// Classify `entry` against the registrations made so far.
    pub fn resolve(&self, entry: &SourceEntry) -> Classification {
        classify(entry, &self.descriptors, &PathRules::empty())
    }

    pub fn descriptors(&self) -> &[TransformerDescriptor] {
        &self.descriptors
    }

    /// Close registration and hand out the immutable snapshot.
    pub fn freeze(self) -> FrozenRegistry {
        FrozenRegistry {
            descriptors: self.descriptors.into(),
        }
    }
}

/// Immutable transformer list for the lifetime of a build. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FrozenRegistry {
    descriptors: Arc<[TransformerDescriptor]>,
}

impl FrozenRegistry {
    pub fn resolve(&self, entry: &SourceEntry) -> Classification {
        classify(entry, &self.descriptors, &PathRules::empty())
    }

    pub fn descriptors(&self) -> &[TransformerDescriptor] {
        &self.descriptors
    }

    pub fn identities(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.identity.as_str()).collect()
    }
}
