//! Fair distribution of incoming leads across call-center executives.
//!
//! Customer and property leads are dispatched automatically at creation:
//! the scheduler picks the active executive accepting that lead type whose
//! watermark (`last_assigned_at`) is oldest, appends an assignment record,
//! and advances the watermark. Agent leads go through human triage first: a
//! registration parks the agent as pending, and an executive's accept or
//! reject decision completes (or declines) the assignment.
//!
//! Selection and the watermark write are guarded by one mutex per lead
//! type, so two leads arriving together can never both be routed to the
//! executive that merely looked least-recently-used at read time.

pub mod roster;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::directory::EntityId;

pub use roster::{RosterImportError, RosterImporter};

/// Lead categories routed through the call center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadType {
    Agent,
    Customer,
    Property,
}

impl LeadType {
    pub const ALL: [LeadType; 3] = [LeadType::Agent, LeadType::Customer, LeadType::Property];

    pub const fn label(self) -> &'static str {
        match self {
            LeadType::Agent => "agent",
            LeadType::Customer => "customer",
            LeadType::Property => "property",
        }
    }

    const fn lock_slot(self) -> usize {
        match self {
            LeadType::Agent => 0,
            LeadType::Customer => 1,
            LeadType::Property => 2,
        }
    }
}

/// Identifier wrapper for call-center executives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutiveId(pub String);

/// One entry in an executive's append-only assignment history. The lead id
/// is a weak reference; the executive never owns the lead's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub lead_type: LeadType,
    pub lead_id: EntityId,
    pub assigned_at: DateTime<Utc>,
}

/// A call-center executive and their dispatch state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executive {
    pub id: ExecutiveId,
    pub name: String,
    pub phone: String,
    pub accepts_type: LeadType,
    pub active: bool,
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub assignments: Vec<AssignmentRecord>,
}

impl Executive {
    pub fn new(id: &str, name: &str, phone: &str, accepts_type: LeadType) -> Self {
        Self {
            id: ExecutiveId(id.to_string()),
            name: name.to_string(),
            phone: phone.to_string(),
            accepts_type,
            active: true,
            last_assigned_at: None,
            assignments: Vec::new(),
        }
    }
}

/// Error enumeration for executive pool storage.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("executive already exists")]
    Conflict,
    #[error("executive not found")]
    NotFound,
    #[error("executive pool unavailable: {0}")]
    Unavailable(String),
}

/// Storage seam for the executive pool. `record_assignment` is the single
/// read-modify-write that appends a record and advances the watermark; the
/// watermark is monotonically non-decreasing.
pub trait ExecutivePool: Send + Sync {
    fn insert(&self, executive: Executive) -> Result<(), PoolError>;
    fn fetch(&self, id: &ExecutiveId) -> Result<Option<Executive>, PoolError>;
    /// Active executives accepting `lead_type`.
    fn candidates(&self, lead_type: LeadType) -> Result<Vec<Executive>, PoolError>;
    fn record_assignment(
        &self,
        id: &ExecutiveId,
        record: AssignmentRecord,
    ) -> Result<Executive, PoolError>;
}

/// Mutex-guarded in-memory pool.
pub struct MemoryExecutivePool {
    executives: Mutex<BTreeMap<ExecutiveId, Executive>>,
}

impl MemoryExecutivePool {
    pub fn new() -> Self {
        Self {
            executives: Mutex::new(BTreeMap::new()),
        }
    }

    fn guard(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<ExecutiveId, Executive>>, PoolError> {
        self.executives
            .lock()
            .map_err(|_| PoolError::Unavailable("executive pool poisoned".to_string()))
    }
}

impl Default for MemoryExecutivePool {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutivePool for MemoryExecutivePool {
    fn insert(&self, executive: Executive) -> Result<(), PoolError> {
        let mut executives = self.guard()?;
        if executives.contains_key(&executive.id) {
            return Err(PoolError::Conflict);
        }
        executives.insert(executive.id.clone(), executive);
        Ok(())
    }

    fn fetch(&self, id: &ExecutiveId) -> Result<Option<Executive>, PoolError> {
        let executives = self.guard()?;
        Ok(executives.get(id).cloned())
    }

    fn candidates(&self, lead_type: LeadType) -> Result<Vec<Executive>, PoolError> {
        let executives = self.guard()?;
        Ok(executives
            .values()
            .filter(|executive| executive.active && executive.accepts_type == lead_type)
            .cloned()
            .collect())
    }

    fn record_assignment(
        &self,
        id: &ExecutiveId,
        record: AssignmentRecord,
    ) -> Result<Executive, PoolError> {
        let mut executives = self.guard()?;
        let executive = executives.get_mut(id).ok_or(PoolError::NotFound)?;

        let assigned_at = record.assigned_at;
        executive.assignments.push(record);
        executive.last_assigned_at = Some(match executive.last_assigned_at {
            Some(current) => current.max(assigned_at),
            None => assigned_at,
        });
        Ok(executive.clone())
    }
}

/// Triage state for an agent lead awaiting (or past) human decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTriageStatus {
    Pending,
    Assigned,
    Rejected,
}

impl AgentTriageStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AgentTriageStatus::Pending => "pending",
            AgentTriageStatus::Assigned => "assigned",
            AgentTriageStatus::Rejected => "rejected",
        }
    }
}

/// One agent lead in the triage queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentTriage {
    pub agent_id: EntityId,
    pub status: AgentTriageStatus,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub executive_id: Option<ExecutiveId>,
}

/// Human decision on a pending agent lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentDecision {
    Accept,
    Reject,
}

/// The executive chosen for a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentOutcome {
    pub executive_id: ExecutiveId,
    pub executive_name: String,
}

/// Error raised by dispatch operations. Absence of capacity is not an
/// error; `assign` reports it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("agent '{0}' has no assignment request on file")]
    UnknownAgent(String),
    #[error("agent '{0}' was already decided")]
    AlreadyDecided(String),
    #[error("executive '{0}' not found")]
    UnknownExecutive(String),
    #[error("executive '{0}' is not active")]
    InactiveExecutive(String),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Fair lead scheduler over an [`ExecutivePool`].
pub struct DispatchScheduler<P> {
    pool: Arc<P>,
    // One lock per lead type: selection and the watermark write must act as
    // a single unit against concurrent assigns for the same type.
    type_locks: [Mutex<()>; 3],
    triage: Mutex<BTreeMap<EntityId, AgentTriage>>,
}

impl<P> DispatchScheduler<P>
where
    P: ExecutivePool + 'static,
{
    pub fn new(pool: Arc<P>) -> Self {
        Self {
            pool,
            type_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
            triage: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn pool(&self) -> &Arc<P> {
        &self.pool
    }

    /// Assign a lead to the least-recently-used active executive accepting
    /// its type. `Ok(None)` means no executive currently has capacity; the
    /// lead stays unassigned for manual triage.
    pub fn assign(
        &self,
        lead_type: LeadType,
        lead_id: EntityId,
    ) -> Result<Option<AssignmentOutcome>, DispatchError> {
        let _serialized = self.type_locks[lead_type.lock_slot()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut candidates = self.pool.candidates(lead_type)?;
        if candidates.is_empty() {
            info!(lead_type = lead_type.label(), lead_id = %lead_id.0, "no executive accepts this lead type");
            return Ok(None);
        }

        // Never-assigned executives sort first; ties break by id so the
        // choice is deterministic.
        candidates.sort_by(|a, b| {
            let by_watermark = match (a.last_assigned_at, b.last_assigned_at) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(left), Some(right)) => left.cmp(&right),
            };
            by_watermark.then_with(|| a.id.cmp(&b.id))
        });

        let chosen = &candidates[0];
        let updated = self.pool.record_assignment(
            &chosen.id,
            AssignmentRecord {
                lead_type,
                lead_id: lead_id.clone(),
                assigned_at: Utc::now(),
            },
        )?;

        info!(
            lead_type = lead_type.label(),
            lead_id = %lead_id.0,
            executive = %updated.id.0,
            "lead assigned"
        );

        Ok(Some(AssignmentOutcome {
            executive_id: updated.id,
            executive_name: updated.name,
        }))
    }

    /// Park an agent lead for human triage. Re-requesting an agent that is
    /// already on file returns its current triage state unchanged.
    pub fn request_agent_assignment(&self, agent_id: EntityId) -> AgentTriage {
        let mut triage = self
            .triage
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        triage
            .entry(agent_id.clone())
            .or_insert_with(|| AgentTriage {
                agent_id,
                status: AgentTriageStatus::Pending,
                requested_at: Utc::now(),
                decided_at: None,
                executive_id: None,
            })
            .clone()
    }

    /// Complete triage for a pending agent lead. Accept binds the lead to
    /// the chosen executive and advances that executive's watermark; reject
    /// leaves the agent unassigned and touches no executive state.
    pub fn decide_agent_assignment(
        &self,
        agent_id: &EntityId,
        executive_id: &ExecutiveId,
        decision: AssignmentDecision,
    ) -> Result<AgentTriage, DispatchError> {
        let mut triage = self
            .triage
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let entry = triage
            .get_mut(agent_id)
            .ok_or_else(|| DispatchError::UnknownAgent(agent_id.0.clone()))?;
        if entry.status != AgentTriageStatus::Pending {
            return Err(DispatchError::AlreadyDecided(agent_id.0.clone()));
        }

        match decision {
            AssignmentDecision::Reject => {
                entry.status = AgentTriageStatus::Rejected;
                entry.decided_at = Some(Utc::now());
                info!(agent_id = %agent_id.0, "agent lead rejected at triage");
                Ok(entry.clone())
            }
            AssignmentDecision::Accept => {
                let executive = self
                    .pool
                    .fetch(executive_id)?
                    .ok_or_else(|| DispatchError::UnknownExecutive(executive_id.0.clone()))?;
                if !executive.active {
                    return Err(DispatchError::InactiveExecutive(executive_id.0.clone()));
                }

                let _serialized = self.type_locks[LeadType::Agent.lock_slot()]
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                self.pool.record_assignment(
                    executive_id,
                    AssignmentRecord {
                        lead_type: LeadType::Agent,
                        lead_id: agent_id.clone(),
                        assigned_at: Utc::now(),
                    },
                )?;

                entry.status = AgentTriageStatus::Assigned;
                entry.decided_at = Some(Utc::now());
                entry.executive_id = Some(executive_id.clone());
                info!(agent_id = %agent_id.0, executive = %executive_id.0, "agent lead accepted");
                Ok(entry.clone())
            }
        }
    }

    /// Current triage state for an agent, if one was ever requested.
    pub fn agent_triage(&self, agent_id: &EntityId) -> Option<AgentTriage> {
        let triage = self
            .triage
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        triage.get(agent_id).cloned()
    }
}
