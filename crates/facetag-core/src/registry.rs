//! Identity registry and nearest-neighbor matching.
//!
//! Every face embedding is resolved against the identities seen so far: the
//! nearest one wins if it lies strictly closer than the distance threshold,
//! otherwise the embedding is registered as a new identity labelled with the
//! current identity count ("0", "1", ...).

use crate::types::{Embedding, Identity, Resolution};
use crate::{DEFAULT_DISTANCE_THRESHOLD, EMBEDDING_DIM};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding contains non-finite values")]
    NonFinite,
}

/// Strategy for finding the registered identity closest to a probe.
pub trait Matcher {
    /// Index into `gallery` and distance of the nearest identity, or `None` if
    /// the gallery is empty.
    fn nearest(&self, probe: &Embedding, gallery: &[Identity]) -> Option<(usize, f32)>;
}

/// Euclidean nearest-neighbor search over the whole gallery.
///
/// Ties keep the earliest entry.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn nearest(&self, probe: &Embedding, gallery: &[Identity]) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;

        for (i, identity) in gallery.iter().enumerate() {
            let distance = probe.euclidean_distance(&identity.embedding);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((i, distance)),
            }
        }

        best
    }
}

/// In-memory set of known identities, in registration order.
///
/// Grows monotonically: there is no removal, which is what keeps the
/// count-based labels unique.
#[derive(Debug, Clone)]
pub struct Registry {
    identities: Vec<Identity>,
    threshold: f32,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_DISTANCE_THRESHOLD)
    }

    /// Registry matching at Euclidean distances strictly below `threshold`.
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            identities: Vec::new(),
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Registered labels in registration order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().map(|i| i.label.as_str())
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn get(&self, label: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.label == label)
    }

    /// Match `embedding` to a known identity or register it as a new one.
    pub fn resolve(&mut self, embedding: &Embedding) -> Result<Resolution, RegistryError> {
        check_embedding(embedding)?;

        let nearest = EuclideanMatcher.nearest(embedding, &self.identities);

        if let Some((idx, distance)) = nearest {
            if distance < self.threshold {
                let label = self.identities[idx].label.clone();
                tracing::debug!(label = %label, distance, "face matched known identity");
                return Ok(Resolution {
                    label,
                    distance: Some(distance),
                    is_new: false,
                });
            }
        }

        // Positional label: unique only because identities are never removed.
        let label = self.identities.len().to_string();
        self.identities.push(Identity {
            label: label.clone(),
            embedding: embedding.clone(),
        });

        let distance = nearest.map(|(_, d)| d);
        tracing::info!(
            label = %label,
            nearest_distance = ?distance,
            identities = self.identities.len(),
            "registered new identity"
        );

        Ok(Resolution {
            label,
            distance,
            is_new: true,
        })
    }

    /// Label-only form of [`resolve`](Self::resolve).
    pub fn identify(&mut self, embedding: &Embedding) -> Result<String, RegistryError> {
        self.resolve(embedding).map(|r| r.label)
    }
}

fn check_embedding(embedding: &Embedding) -> Result<(), RegistryError> {
    if embedding.dim() != EMBEDDING_DIM {
        return Err(RegistryError::DimensionMismatch {
            expected: EMBEDDING_DIM,
            actual: embedding.dim(),
        });
    }
    if embedding.values.iter().any(|v| !v.is_finite()) {
        return Err(RegistryError::NonFinite);
    }
    Ok(())
}

/// Registry shared across concurrent detection tasks.
///
/// The whole read-then-maybe-insert sequence runs under one lock, so two
/// unmatched faces can never claim the same label. No separate insert or
/// lookup is exposed.
#[derive(Debug, Default)]
pub struct SharedRegistry {
    inner: Mutex<Registry>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Mutex::new(registry),
        }
    }

    // Every mutation completes or fails before touching the Vec, so a
    // poisoned registry is still consistent.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically match or register `embedding`.
    pub fn lookup_or_register(&self, embedding: &Embedding) -> Result<Resolution, RegistryError> {
        self.lock().resolve(embedding)
    }

    /// Label-only form of [`lookup_or_register`](Self::lookup_or_register).
    pub fn identify(&self, embedding: &Embedding) -> Result<String, RegistryError> {
        self.lock().identify(embedding)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn threshold(&self) -> f32 {
        self.lock().threshold()
    }

    /// Snapshot of registered labels in registration order.
    pub fn labels(&self) -> Vec<String> {
        self.lock().labels().map(str::to_string).collect()
    }

    /// Snapshot of all identities.
    pub fn snapshot(&self) -> Vec<Identity> {
        self.lock().identities().to_vec()
    }
}
