use std::collections::BTreeMap;
use parking_lot::RwLock;
use tracing::{debug, warn};
use crate::core::error::{Error, Result};
use crate::core::types::{Namespace, Rank, Score};
use crate::storage::DocumentStore;
use crate::topology::Topology;

/// Id of the meta-record pinning a collection's configuration
pub const META_DOCUMENT_ID: &str = "meta";

/// Lifecycle of one engine instance
#[derive(Debug, Clone)]
pub enum EngineState {
    Uninitialized,
    Validated,
    Active,
    /// Configuration mismatch; the instance must be discarded
    Failed(Error),
}

/// Pins `(minScore, maxScore, branchFactor)` for a collection.
///
/// The first writer's configuration is authoritative; the check result is
/// cached on this instance only.
pub struct ConfigurationGuard {
    topology: Topology,
    state: RwLock<EngineState>,
}

impl ConfigurationGuard {
    pub fn new(topology: Topology) -> Self {
        ConfigurationGuard {
            topology,
            state: RwLock::new(EngineState::Uninitialized),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state.read().clone()
    }

    pub fn check_score(&self, score: Score) -> Result<()> {
        if !self.topology.contains(score) {
            return Err(Error::validation(format!(
                "Score must be >= {} and <= {}, got {}",
                self.topology.min_score, self.topology.max_score, score
            )));
        }
        Ok(())
    }

    pub fn check_rank(&self, rank: Rank) -> Result<()> {
        if rank < 1 {
            return Err(Error::validation("Rank must be >= 1"));
        }
        Ok(())
    }

    fn meta_values(&self) -> [(&'static str, i64); 3] {
        [
            ("minScore", self.topology.min_score),
            ("maxScore", self.topology.max_score),
            ("branchFactor", i64::from(self.topology.branch_factor)),
        ]
    }

    /// Compare against (or create) the persisted meta-record once.
    pub async fn ensure_validated<S: DocumentStore>(&self, store: &S, namespace: &Namespace) -> Result<()> {
        let current = self.state();
        match current {
            EngineState::Validated | EngineState::Active => return Ok(()),
            EngineState::Failed(err) => return Err(err),
            EngineState::Uninitialized => {}
        }

        let values: BTreeMap<String, i64> = self
            .meta_values()
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();
        let stored = store.upsert_set_on_insert(namespace, META_DOCUMENT_ID, &values).await?;

        for (name, value) in self.meta_values() {
            let existing = stored.get_field(name);
            if existing != Some(value) {
                let err = Error::configuration_mismatch(name, existing, value);
                warn!(namespace = %namespace, field = name, ?existing, current = value, "configuration mismatch");
                *self.state.write() = EngineState::Failed(err.clone());
                return Err(err);
            }
        }

        let mut state = self.state.write();
        if matches!(*state, EngineState::Uninitialized) {
            debug!(namespace = %namespace, "configuration validated");
            *state = EngineState::Validated;
        }
        Ok(())
    }

    pub fn mark_active(&self) {
        let mut state = self.state.write();
        if matches!(*state, EngineState::Validated) {
            *state = EngineState::Active;
        }
    }
}
