//! Resolution of (commodity, family) pairs to concrete artifact versions.

use std::sync::Arc;

use serde::Serialize;

use crate::artifact::ArtifactStore;
use crate::domain::{ArtifactId, ArtifactVersion, ModelFamily, ModelVersion, Symbol, TradeDate};
use crate::EngineError;

/// Outcome of a registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModel {
    pub artifact_id: ArtifactId,
    pub version: ModelVersion,
    pub trained_as_of: TradeDate,
}

/// Finite, restartable listing of versions, newest first.
#[derive(Debug, Clone)]
pub struct VersionListing {
    versions: Arc<[ArtifactVersion]>,
}

impl VersionListing {
    /// Starts a fresh pass over the listing.
    pub fn iter(&self) -> std::slice::Iter<'_, ArtifactVersion> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl<'a> IntoIterator for &'a VersionListing {
    type Item = &'a ArtifactVersion;
    type IntoIter = std::slice::Iter<'a, ArtifactVersion>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Reads active flags from the artifact store at lookup time.
#[derive(Clone)]
pub struct ModelRegistry {
    store: Arc<dyn ArtifactStore>,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Most recent active version, ordered by training date then version.
    pub async fn resolve(
        &self,
        commodity: &Symbol,
        family: ModelFamily,
    ) -> Result<ResolvedModel, EngineError> {
        self.pick(commodity, family, |_| true).await
    }

    /// Most recent active version already trained on `as_of`.
    pub async fn resolve_as_of(
        &self,
        commodity: &Symbol,
        family: ModelFamily,
        as_of: TradeDate,
    ) -> Result<ResolvedModel, EngineError> {
        self.pick(commodity, family, |v| v.trained_as_of <= as_of)
            .await
    }

    pub async fn list_versions(
        &self,
        commodity: &Symbol,
        family: ModelFamily,
    ) -> Result<VersionListing, EngineError> {
        let mut versions = self.store.list(commodity, family).await?;
        versions.sort_by(|a, b| {
            (b.trained_as_of, b.version).cmp(&(a.trained_as_of, a.version))
        });
        Ok(VersionListing {
            versions: versions.into(),
        })
    }

    async fn pick(
        &self,
        commodity: &Symbol,
        family: ModelFamily,
        eligible: impl Fn(&ArtifactVersion) -> bool,
    ) -> Result<ResolvedModel, EngineError> {
        let versions = self.store.list(commodity, family).await?;
        versions
            .into_iter()
            .filter(|v| v.active && eligible(v))
            .max_by_key(|v| (v.trained_as_of, v.version))
            .map(|v| ResolvedModel {
                artifact_id: ArtifactId::new(commodity.clone(), family, v.version),
                version: v.version,
                trained_as_of: v.trained_as_of,
            })
            .ok_or_else(|| EngineError::ModelNotFound {
                commodity: commodity.clone(),
                family,
            })
    }
}
