//! Two-hop referrer resolution over the entity directory.
//!
//! Hop one finds the lead's own record by phone (primary collections, then
//! secondary). Hop two resolves the record's referrer value, trying the
//! referral-code keyspace first and falling back to the phone keyspace.
//! Resolution never goes further, so a corrupted chain that loops back on
//! itself cannot cause unbounded walking, and it never fails: every path
//! degrades to the house sentinel.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::directory::{EntityDirectory, EntityKind, ProbeOrder};

/// Display name of the house account used when no referrer can be named.
pub const HOUSE_NAME: &str = "Wealth Associate";

/// The brokerage's default referrer of last resort.
#[derive(Debug, Clone)]
pub struct HouseAccount {
    pub referral_code: String,
    pub phone: String,
}

impl HouseAccount {
    /// True when `value` names the house account in either keyspace.
    fn owns(&self, value: &str) -> bool {
        value == self.referral_code || value == self.phone
    }
}

/// Outcome of a resolution; the sentinel variant is a normal terminal
/// state, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedReferrer {
    /// Display name of the lead itself, when its record was found.
    pub posted_by_name: Option<String>,
    pub referrer_name: String,
    pub referrer_phone: String,
    /// Collection the referrer was found in; `None` for the house sentinel.
    pub source_kind: Option<EntityKind>,
}

pub struct ReferralResolver {
    directory: Arc<EntityDirectory>,
    house: HouseAccount,
}

impl ReferralResolver {
    pub fn new(directory: Arc<EntityDirectory>, house: HouseAccount) -> Self {
        Self { directory, house }
    }

    /// Resolve who referred the entity registered under `phone`.
    pub fn resolve_referrer(&self, phone: &str) -> ResolvedReferrer {
        let lead = self
            .directory
            .find_by_phone(phone, ProbeOrder::Primary)
            .or_else(|| self.directory.find_by_phone(phone, ProbeOrder::Secondary));

        let Some(lead) = lead else {
            debug!(phone, "no directory record for lead; returning house sentinel");
            return self.sentinel(None);
        };

        let posted_by = lead.display_name.clone();
        let Some(referrer_ref) = lead.referred_by.as_ref() else {
            return self.sentinel(Some(posted_by));
        };

        let value = referrer_ref.value();
        if self.house.owns(value) {
            return self.sentinel(Some(posted_by));
        }

        // Code keyspace first, then phone, each over its fixed order.
        let referrer = self
            .directory
            .find_by_referral_code(value, ProbeOrder::Primary)
            .or_else(|| self.directory.find_by_phone(value, ProbeOrder::All));

        match referrer {
            Some(record) if record.phone == lead.phone => {
                // Self-referencing chain is a data-integrity violation;
                // bounded resolution just degrades to the sentinel.
                warn!(phone = %lead.phone, "referral chain points back at the lead");
                self.sentinel(Some(posted_by))
            }
            Some(record) => ResolvedReferrer {
                posted_by_name: Some(posted_by),
                referrer_name: record.display_name,
                referrer_phone: record.phone,
                source_kind: Some(record.kind),
            },
            None => self.sentinel(Some(posted_by)),
        }
    }

    fn sentinel(&self, posted_by_name: Option<String>) -> ResolvedReferrer {
        ResolvedReferrer {
            posted_by_name,
            referrer_name: HOUSE_NAME.to_string(),
            referrer_phone: self.house.phone.clone(),
            source_kind: None,
        }
    }
}
