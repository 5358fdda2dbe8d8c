//! Read-only directory over the brokerage's typed entity collections.
//!
//! The registration platform persists eight collections keyed by referral
//! code and/or phone number. Lookups probe a fixed, declared order and the
//! first hit wins; a collection that fails to respond is treated as "not
//! found there" so callers always get a best-effort answer. Adding a ninth
//! entity kind means registering one more table row, not new branching.

pub mod memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use memory::MemoryCollection;

/// The entity kinds tracked by the brokerage network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Agent,
    Customer,
    CoreMember,
    Investor,
    SkilledLabour,
    Nri,
    Property,
    ApprovedProperty,
}

impl EntityKind {
    pub const fn label(self) -> &'static str {
        match self {
            EntityKind::Agent => "agent",
            EntityKind::Customer => "customer",
            EntityKind::CoreMember => "core_member",
            EntityKind::Investor => "investor",
            EntityKind::SkilledLabour => "skilled_labour",
            EntityKind::Nri => "nri",
            EntityKind::Property => "property",
            EntityKind::ApprovedProperty => "approved_property",
        }
    }

    /// Only these kinds mint referral codes others can name as referrer.
    pub const fn mints_referral_codes(self) -> bool {
        matches!(
            self,
            EntityKind::Agent | EntityKind::Customer | EntityKind::CoreMember
        )
    }
}

/// Identifier wrapper for directory entities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

/// Reference to the entity that sourced a record, kept as two explicit
/// keyspaces. Agents, customers, and core members are named by referral
/// code; NRIs, skilled labour, investors, and property posters are named by
/// phone number. The distinction is intentional and must not be unified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferrerRef {
    Code(String),
    Phone(String),
}

impl ReferrerRef {
    pub fn value(&self) -> &str {
        match self {
            ReferrerRef::Code(value) | ReferrerRef::Phone(value) => value,
        }
    }
}

/// Normalized view of one record from any of the eight collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    pub display_name: String,
    pub phone: String,
    pub referral_code: Option<String>,
    pub referred_by: Option<ReferrerRef>,
}

/// Data-driven predicate evaluated inside a single collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityFilter {
    ReferredByCode(String),
    ReferredByPhone(String),
}

impl EntityFilter {
    pub fn matches(&self, record: &EntityRecord) -> bool {
        match (self, record.referred_by.as_ref()) {
            (EntityFilter::ReferredByCode(code), Some(ReferrerRef::Code(value))) => value == code,
            (EntityFilter::ReferredByPhone(phone), Some(ReferrerRef::Phone(value))) => {
                value == phone
            }
            _ => false,
        }
    }
}

/// Error raised by a single underlying collection.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("collection unavailable: {0}")]
    Unavailable(String),
}

/// Storage seam for one typed collection. Implementations are read-only from
/// the engine's point of view.
pub trait EntityCollection: Send + Sync {
    fn find_by_referral_code(&self, code: &str) -> Result<Option<EntityRecord>, CollectionError>;
    fn find_by_phone(&self, phone: &str) -> Result<Option<EntityRecord>, CollectionError>;
    fn count_where(&self, filter: &EntityFilter) -> Result<u64, CollectionError>;
    fn list(&self) -> Result<Vec<EntityRecord>, CollectionError>;
}

/// Fixed collection-search orders used by referrer resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOrder {
    /// Agent, Customer, CoreMember.
    Primary,
    /// Nri, SkilledLabour, Investor.
    Secondary,
    /// Primary followed by Secondary.
    All,
}

const PRIMARY_ORDER: [EntityKind; 3] = [
    EntityKind::Agent,
    EntityKind::Customer,
    EntityKind::CoreMember,
];

const SECONDARY_ORDER: [EntityKind; 3] = [
    EntityKind::Nri,
    EntityKind::SkilledLabour,
    EntityKind::Investor,
];

const ALL_ORDER: [EntityKind; 6] = [
    EntityKind::Agent,
    EntityKind::Customer,
    EntityKind::CoreMember,
    EntityKind::Nri,
    EntityKind::SkilledLabour,
    EntityKind::Investor,
];

impl ProbeOrder {
    pub fn kinds(self) -> &'static [EntityKind] {
        match self {
            ProbeOrder::Primary => &PRIMARY_ORDER,
            ProbeOrder::Secondary => &SECONDARY_ORDER,
            ProbeOrder::All => &ALL_ORDER,
        }
    }
}

/// Error raised by directory operations that cannot degrade (counting and
/// enumeration). Probing lookups never raise; they log and move on.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("no collection registered for kind '{}'", .0.label())]
    UnknownKind(EntityKind),
    #[error(transparent)]
    Collection(#[from] CollectionError),
}

/// Ordered table of typed collection handles.
pub struct EntityDirectory {
    table: Vec<(EntityKind, Arc<dyn EntityCollection>)>,
}

impl EntityDirectory {
    pub fn new() -> Self {
        Self { table: Vec::new() }
    }

    /// Register a collection handle for a kind. Registration order is the
    /// tie-break when the same key exists in two collections of equal probe
    /// rank, which keeps duplicate hits deterministic.
    pub fn register(mut self, kind: EntityKind, collection: Arc<dyn EntityCollection>) -> Self {
        self.table.push((kind, collection));
        self
    }

    fn collection(&self, kind: EntityKind) -> Option<&Arc<dyn EntityCollection>> {
        self.table
            .iter()
            .find(|(registered, _)| *registered == kind)
            .map(|(_, collection)| collection)
    }

    /// Probe collections in `order` for a referral code; first hit wins.
    pub fn find_by_referral_code(&self, code: &str, order: ProbeOrder) -> Option<EntityRecord> {
        self.probe(order, |collection| collection.find_by_referral_code(code))
    }

    /// Probe collections in `order` for a phone number; first hit wins.
    pub fn find_by_phone(&self, phone: &str, order: ProbeOrder) -> Option<EntityRecord> {
        self.probe(order, |collection| collection.find_by_phone(phone))
    }

    fn probe<F>(&self, order: ProbeOrder, mut lookup: F) -> Option<EntityRecord>
    where
        F: FnMut(&dyn EntityCollection) -> Result<Option<EntityRecord>, CollectionError>,
    {
        for kind in order.kinds() {
            let Some(collection) = self.collection(*kind) else {
                continue;
            };
            match lookup(collection.as_ref()) {
                Ok(Some(record)) => return Some(record),
                Ok(None) => {}
                Err(err) => {
                    // Degrade to not-found in this collection; the probe
                    // continues so the caller still gets a best-effort hit.
                    warn!(kind = kind.label(), error = %err, "directory probe failed");
                }
            }
        }
        None
    }

    /// Count records of `kind` matching `filter`. Unlike the probing
    /// lookups this propagates the collection error so the caller can
    /// attribute the failure to the item being computed.
    pub fn count_where(&self, kind: EntityKind, filter: &EntityFilter) -> Result<u64, DirectoryError> {
        let collection = self
            .collection(kind)
            .ok_or(DirectoryError::UnknownKind(kind))?;
        Ok(collection.count_where(filter)?)
    }

    /// Enumerate every record of `kind`.
    pub fn list_kind(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, DirectoryError> {
        let collection = self
            .collection(kind)
            .ok_or(DirectoryError::UnknownKind(kind))?;
        Ok(collection.list()?)
    }
}

impl Default for EntityDirectory {
    fn default() -> Self {
        Self::new()
    }
}
