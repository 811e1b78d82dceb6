//! Artifact store contract and the in-memory artifact arena.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::accessor::BoxFuture;
use crate::domain::{ArtifactId, ArtifactVersion, ModelArtifact, ModelFamily, Symbol};
use crate::EngineError;

/// Read-only storage of trained model artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Loads one immutable artifact. A missing artifact is an
    /// [`EngineError::ArtifactLoad`].
    fn load<'a>(&'a self, id: &'a ArtifactId) -> BoxFuture<'a, ModelArtifact>;

    /// Lists every known version of a (commodity, family) pair, in any order.
    fn list<'a>(
        &'a self,
        commodity: &'a Symbol,
        family: ModelFamily,
    ) -> BoxFuture<'a, Vec<ArtifactVersion>>;
}

#[derive(Debug, Clone)]
struct ArenaEntry {
    artifact: Arc<ModelArtifact>,
    active: bool,
}

/// Arena of immutable artifacts indexed by (commodity, family, version).
///
/// Only the `active` flag beside each record changes; artifacts themselves are
/// never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStore {
    arena: Arc<RwLock<BTreeMap<ArtifactId, ArenaEntry>>>,
    loads: Arc<AtomicUsize>,
    load_delay: Option<Duration>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates storage latency on every load.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn insert(&self, artifact: ModelArtifact, active: bool) {
        let id = artifact.id.clone();
        self.arena
            .write()
            .expect("artifact arena lock is not poisoned")
            .insert(
                id,
                ArenaEntry {
                    artifact: Arc::new(artifact),
                    active,
                },
            );
    }

    /// Returns false when the artifact is unknown.
    pub fn set_active(&self, id: &ArtifactId, active: bool) -> bool {
        let mut arena = self
            .arena
            .write()
            .expect("artifact arena lock is not poisoned");
        match arena.get_mut(id) {
            Some(entry) => {
                entry.active = active;
                true
            }
            None => false,
        }
    }

    /// Number of `load` calls served so far, including failed ones.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn load<'a>(&'a self, id: &'a ArtifactId) -> BoxFuture<'a, ModelArtifact> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.load_delay {
                tokio::time::sleep(delay).await;
            }

            let arena = self
                .arena
                .read()
                .expect("artifact arena lock is not poisoned");
            arena
                .get(id)
                .map(|entry| entry.artifact.as_ref().clone())
                .ok_or_else(|| EngineError::ArtifactLoad {
                    artifact: id.clone(),
                    reason: String::from("artifact not found in store"),
                })
        })
    }

    fn list<'a>(
        &'a self,
        commodity: &'a Symbol,
        family: ModelFamily,
    ) -> BoxFuture<'a, Vec<ArtifactVersion>> {
        Box::pin(async move {
            let arena = self
                .arena
                .read()
                .expect("artifact arena lock is not poisoned");
            Ok(arena
                .iter()
                .filter(|(id, _)| &id.commodity == commodity && id.family == family)
                .map(|(id, entry)| ArtifactVersion {
                    version: id.version,
                    trained_as_of: entry.artifact.trained_as_of,
                    active: entry.active,
                })
                .collect())
        })
    }
}
