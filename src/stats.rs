//! Periodic recomputation of per-agent referral and production counters.
//!
//! The aggregator walks every agent, counts referred and added entities
//! across the directory, and overwrites the agent's snapshot wholesale.
//! Snapshots are derived state: always safe to discard and recompute, never
//! a source of truth. One agent failing to count never blocks the rest of
//! the batch, and a wall-clock budget can stop a run from starting new
//! agents while letting the in-flight one finish.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::directory::{
    DirectoryError, EntityDirectory, EntityFilter, EntityId, EntityKind, EntityRecord,
};

/// The seven production counters tracked per agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStatsSnapshot {
    pub referred_agents: u64,
    pub referred_customers: u64,
    pub added_investors: u64,
    pub added_skilled: u64,
    pub added_nris: u64,
    pub posted_properties: u64,
    pub approved_properties: u64,
    pub last_updated: DateTime<Utc>,
}

impl ReferralStatsSnapshot {
    /// The counters without the recompute timestamp, for idempotence checks.
    pub fn counters(&self) -> [u64; 7] {
        [
            self.referred_agents,
            self.referred_customers,
            self.added_investors,
            self.added_skilled,
            self.added_nris,
            self.posted_properties,
            self.approved_properties,
        ]
    }
}

/// Error enumeration for snapshot persistence.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

/// Storage seam for the per-agent snapshot substructure.
pub trait SnapshotStore: Send + Sync {
    fn write(&self, agent_id: &EntityId, snapshot: ReferralStatsSnapshot)
        -> Result<(), SnapshotError>;
    fn fetch(&self, agent_id: &EntityId) -> Result<Option<ReferralStatsSnapshot>, SnapshotError>;
}

/// Mutex-guarded in-memory snapshot store.
pub struct MemorySnapshotStore {
    snapshots: Mutex<std::collections::BTreeMap<EntityId, ReferralStatsSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(std::collections::BTreeMap::new()),
        }
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn write(
        &self,
        agent_id: &EntityId,
        snapshot: ReferralStatsSnapshot,
    ) -> Result<(), SnapshotError> {
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|_| SnapshotError::Unavailable("snapshot store poisoned".to_string()))?;
        snapshots.insert(agent_id.clone(), snapshot);
        Ok(())
    }

    fn fetch(&self, agent_id: &EntityId) -> Result<Option<ReferralStatsSnapshot>, SnapshotError> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| SnapshotError::Unavailable("snapshot store poisoned".to_string()))?;
        Ok(snapshots.get(agent_id).cloned())
    }
}

/// One agent the run could not recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentFailure {
    pub agent_id: EntityId,
    pub reason: String,
}

/// Outcome of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    pub processed: usize,
    pub failed: usize,
    /// Agents never started because the wall-clock budget ran out.
    pub skipped: usize,
    pub failures: Vec<AgentFailure>,
}

/// Error raised when a run cannot start at all (the agent roll itself is
/// unreadable). Per-agent faults never surface here.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("could not enumerate agents: {0}")]
    AgentRoll(#[from] DirectoryError),
}

#[derive(Debug, thiserror::Error)]
enum AgentRecomputeError {
    #[error(transparent)]
    Count(#[from] DirectoryError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub struct StatsAggregator<S> {
    directory: Arc<EntityDirectory>,
    store: Arc<S>,
    // Serializes overlapping runs (scheduled timer vs. on-demand trigger).
    run_guard: Mutex<()>,
}

impl<S> StatsAggregator<S>
where
    S: SnapshotStore + 'static,
{
    pub fn new(directory: Arc<EntityDirectory>, store: Arc<S>) -> Self {
        Self {
            directory,
            store,
            run_guard: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Recompute every agent's snapshot. With a budget, agents not started
    /// before the deadline are reported as skipped; the in-flight agent
    /// always finishes.
    pub fn recompute_all(
        &self,
        budget: Option<Duration>,
    ) -> Result<RecomputeReport, AggregatorError> {
        let _single_run = self
            .run_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let agents = self.directory.list_kind(EntityKind::Agent)?;
        let total = agents.len();
        let started = Instant::now();

        let mut processed = 0;
        let mut failures = Vec::new();
        let mut skipped = 0;

        for (index, agent) in agents.iter().enumerate() {
            if let Some(budget) = budget {
                if started.elapsed() >= budget {
                    skipped = total - index;
                    warn!(
                        skipped,
                        budget_secs = budget.as_secs(),
                        "aggregation budget exhausted; stopping early"
                    );
                    break;
                }
            }

            match self.recompute_agent(agent) {
                Ok(()) => processed += 1,
                Err(err) => {
                    warn!(agent_id = %agent.id.0, error = %err, "agent recompute failed; continuing");
                    failures.push(AgentFailure {
                        agent_id: agent.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let report = RecomputeReport {
            processed,
            failed: failures.len(),
            skipped,
            failures,
        };
        info!(
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            "referral stats recompute finished"
        );
        Ok(report)
    }

    fn recompute_agent(&self, agent: &EntityRecord) -> Result<(), AgentRecomputeError> {
        let by_code = |kind: EntityKind| -> Result<u64, DirectoryError> {
            match agent.referral_code.as_ref() {
                Some(code) => self
                    .directory
                    .count_where(kind, &EntityFilter::ReferredByCode(code.clone())),
                // An agent that never minted a code cannot be referred to.
                None => Ok(0),
            }
        };
        let by_phone = |kind: EntityKind| -> Result<u64, DirectoryError> {
            self.directory
                .count_where(kind, &EntityFilter::ReferredByPhone(agent.phone.clone()))
        };

        let snapshot = ReferralStatsSnapshot {
            referred_agents: by_code(EntityKind::Agent)?,
            referred_customers: by_code(EntityKind::Customer)?,
            added_investors: by_phone(EntityKind::Investor)?,
            added_skilled: by_phone(EntityKind::SkilledLabour)?,
            added_nris: by_phone(EntityKind::Nri)?,
            posted_properties: by_phone(EntityKind::Property)?,
            approved_properties: by_phone(EntityKind::ApprovedProperty)?,
            last_updated: Utc::now(),
        };

        self.store.write(&agent.id, snapshot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{CollectionError, EntityCollection, MemoryCollection, ReferrerRef};

    fn agent(id: &str, code: &str, phone: &str) -> EntityRecord {
        EntityRecord {
            id: EntityId(id.to_string()),
            kind: EntityKind::Agent,
            display_name: format!("Agent {id}"),
            phone: phone.to_string(),
            referral_code: Some(code.to_string()),
            referred_by: None,
        }
    }

    fn referred(kind: EntityKind, id: &str, referred_by: ReferrerRef) -> EntityRecord {
        EntityRecord {
            id: EntityId(id.to_string()),
            kind,
            display_name: format!("{id} name"),
            phone: format!("91{id}"),
            referral_code: None,
            referred_by: Some(referred_by),
        }
    }

    fn full_directory(records: Vec<EntityRecord>) -> Arc<EntityDirectory> {
        let mut directory = EntityDirectory::new();
        for kind in [
            EntityKind::Agent,
            EntityKind::Customer,
            EntityKind::CoreMember,
            EntityKind::Investor,
            EntityKind::SkilledLabour,
            EntityKind::Nri,
            EntityKind::Property,
            EntityKind::ApprovedProperty,
        ] {
            let collection = MemoryCollection::with_records(
                records
                    .iter()
                    .filter(|record| record.kind == kind)
                    .cloned()
                    .collect(),
            );
            directory = directory.register(kind, Arc::new(collection));
        }
        Arc::new(directory)
    }

    #[test]
    fn counts_all_seven_counters_for_an_agent() {
        let code = ReferrerRef::Code("WA123".to_string());
        let phone = ReferrerRef::Phone("9000000001".to_string());
        let directory = full_directory(vec![
            agent("a-1", "WA123", "9000000001"),
            referred(EntityKind::Agent, "a-2", code.clone()),
            referred(EntityKind::Customer, "c-1", code.clone()),
            referred(EntityKind::Customer, "c-2", code),
            referred(EntityKind::Investor, "i-1", phone.clone()),
            referred(EntityKind::SkilledLabour, "s-1", phone.clone()),
            referred(EntityKind::Nri, "n-1", phone.clone()),
            referred(EntityKind::Property, "p-1", phone.clone()),
            referred(EntityKind::Property, "p-2", phone.clone()),
            referred(EntityKind::ApprovedProperty, "p-1", phone),
        ]);

        let aggregator = StatsAggregator::new(directory, Arc::new(MemorySnapshotStore::new()));
        let report = aggregator.recompute_all(None).expect("roll readable");
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 0);

        let snapshot = aggregator
            .store()
            .fetch(&EntityId("a-1".to_string()))
            .expect("store reachable")
            .expect("snapshot written");
        assert_eq!(snapshot.counters(), [1, 2, 1, 1, 1, 2, 1]);
    }

    #[test]
    fn recompute_is_idempotent_over_unchanged_data() {
        let directory = full_directory(vec![
            agent("a-1", "WA123", "9000000001"),
            referred(
                EntityKind::Customer,
                "c-1",
                ReferrerRef::Code("WA123".to_string()),
            ),
        ]);
        let aggregator = StatsAggregator::new(directory, Arc::new(MemorySnapshotStore::new()));

        aggregator.recompute_all(None).expect("first run");
        let first = aggregator
            .store()
            .fetch(&EntityId("a-1".to_string()))
            .expect("store reachable")
            .expect("snapshot written");

        aggregator.recompute_all(None).expect("second run");
        let second = aggregator
            .store()
            .fetch(&EntityId("a-1".to_string()))
            .expect("store reachable")
            .expect("snapshot written");

        assert_eq!(first.counters(), second.counters());
        assert!(second.last_updated >= first.last_updated);
    }

    struct FlakyCollection {
        inner: MemoryCollection,
        fail_for_phone: String,
    }

    impl EntityCollection for FlakyCollection {
        fn find_by_referral_code(
            &self,
            code: &str,
        ) -> Result<Option<EntityRecord>, CollectionError> {
            self.inner.find_by_referral_code(code)
        }

        fn find_by_phone(&self, phone: &str) -> Result<Option<EntityRecord>, CollectionError> {
            self.inner.find_by_phone(phone)
        }

        fn count_where(&self, filter: &EntityFilter) -> Result<u64, CollectionError> {
            if matches!(filter, EntityFilter::ReferredByPhone(phone) if *phone == self.fail_for_phone)
            {
                return Err(CollectionError::Unavailable("query timed out".to_string()));
            }
            self.inner.count_where(filter)
        }

        fn list(&self) -> Result<Vec<EntityRecord>, CollectionError> {
            self.inner.list()
        }
    }

    #[test]
    fn one_failing_agent_does_not_block_the_batch() {
        let agents: Vec<EntityRecord> = (1..=10)
            .map(|n| agent(&format!("a-{n}"), &format!("WA{n:03}"), &format!("900000000{n}")))
            .collect();

        let mut directory = EntityDirectory::new();
        directory = directory.register(
            EntityKind::Agent,
            Arc::new(MemoryCollection::with_records(agents)),
        );
        for kind in [
            EntityKind::Customer,
            EntityKind::CoreMember,
            EntityKind::Nri,
            EntityKind::SkilledLabour,
            EntityKind::Property,
            EntityKind::ApprovedProperty,
        ] {
            directory = directory.register(kind, Arc::new(MemoryCollection::new()));
        }
        // Investor counts fail only for agent #3's phone.
        directory = directory.register(
            EntityKind::Investor,
            Arc::new(FlakyCollection {
                inner: MemoryCollection::new(),
                fail_for_phone: "9000000003".to_string(),
            }),
        );

        let aggregator =
            StatsAggregator::new(Arc::new(directory), Arc::new(MemorySnapshotStore::new()));
        let report = aggregator.recompute_all(None).expect("roll readable");

        assert_eq!(report.processed, 9);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failures[0].agent_id, EntityId("a-3".to_string()));

        // Neighbours on both sides of the failure still got snapshots.
        for id in ["a-2", "a-4", "a-10"] {
            assert!(aggregator
                .store()
                .fetch(&EntityId(id.to_string()))
                .expect("store reachable")
                .is_some());
        }
        assert!(aggregator
            .store()
            .fetch(&EntityId("a-3".to_string()))
            .expect("store reachable")
            .is_none());
    }

    #[test]
    fn zero_budget_skips_every_agent() {
        let directory = full_directory(vec![
            agent("a-1", "WA001", "9000000001"),
            agent("a-2", "WA002", "9000000002"),
        ]);
        let aggregator = StatsAggregator::new(directory, Arc::new(MemorySnapshotStore::new()));

        let report = aggregator
            .recompute_all(Some(Duration::ZERO))
            .expect("roll readable");
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 2);
    }
}
