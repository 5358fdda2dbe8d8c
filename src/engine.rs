//! Facade composing the directory, scheduler, resolver, and aggregator
//! behind the surface the registration handlers consume.

use std::sync::Arc;
use std::time::Duration;

use crate::directory::{EntityDirectory, EntityId};
use crate::dispatch::{
    AgentTriage, AssignmentDecision, AssignmentOutcome, DispatchError, DispatchScheduler,
    ExecutiveId, ExecutivePool, LeadType,
};
use crate::referral::{HouseAccount, ReferralResolver, ResolvedReferrer};
use crate::stats::{
    AggregatorError, RecomputeReport, ReferralStatsSnapshot, SnapshotError, SnapshotStore,
    StatsAggregator,
};

/// Lead intake engine: fair dispatch, referral resolution, and statistics
/// aggregation over shared storage seams.
pub struct LeadEngine<P, S> {
    scheduler: DispatchScheduler<P>,
    resolver: ReferralResolver,
    aggregator: StatsAggregator<S>,
    stats_budget: Option<Duration>,
}

impl<P, S> LeadEngine<P, S>
where
    P: ExecutivePool + 'static,
    S: SnapshotStore + 'static,
{
    pub fn new(
        directory: Arc<EntityDirectory>,
        pool: Arc<P>,
        snapshots: Arc<S>,
        house: HouseAccount,
        stats_budget: Option<Duration>,
    ) -> Self {
        Self {
            scheduler: DispatchScheduler::new(pool),
            resolver: ReferralResolver::new(Arc::clone(&directory), house),
            aggregator: StatsAggregator::new(directory, snapshots),
            stats_budget,
        }
    }

    /// Dispatch a durably created customer or property lead. `Ok(None)`
    /// means no active executive accepts the type right now; the lead stays
    /// unassigned and registration must not fail because of it.
    pub fn assign_lead(
        &self,
        lead_type: LeadType,
        lead_id: EntityId,
    ) -> Result<Option<AssignmentOutcome>, DispatchError> {
        self.scheduler.assign(lead_type, lead_id)
    }

    /// Park a freshly registered agent for human triage.
    pub fn request_agent_assignment(&self, agent_id: EntityId) -> AgentTriage {
        self.scheduler.request_agent_assignment(agent_id)
    }

    /// Apply an executive's accept/reject decision to a pending agent.
    pub fn decide_agent_assignment(
        &self,
        agent_id: &EntityId,
        executive_id: &ExecutiveId,
        decision: AssignmentDecision,
    ) -> Result<AgentTriage, DispatchError> {
        self.scheduler
            .decide_agent_assignment(agent_id, executive_id, decision)
    }

    /// Triage state for an agent, if an assignment was ever requested.
    pub fn agent_triage(&self, agent_id: &EntityId) -> Option<AgentTriage> {
        self.scheduler.agent_triage(agent_id)
    }

    /// Resolve who referred the entity registered under `phone`.
    pub fn resolve_referrer(&self, phone: &str) -> ResolvedReferrer {
        self.resolver.resolve_referrer(phone)
    }

    /// Last computed snapshot for an agent, if a run has reached it.
    pub fn stats_snapshot(
        &self,
        agent_id: &EntityId,
    ) -> Result<Option<ReferralStatsSnapshot>, SnapshotError> {
        self.aggregator.store().fetch(agent_id)
    }

    /// On-demand aggregation run, honoring the configured budget.
    pub fn trigger_recompute(&self) -> Result<RecomputeReport, AggregatorError> {
        self.aggregator.recompute_all(self.stats_budget)
    }
}
