//! The derived read-model: one immutable, possibly-partial reconstruction
//! of ledger state.
//!
//! Every field here is recomputable purely from ledger reads — no hidden
//! client-only state.  A read that failed or timed out leaves its field
//! `Unknown` and flips `partial` on the whole snapshot; downstream code must
//! treat `Unknown` as "don't know yet", never as `false` or empty.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::ledger::{Address, AidRequestDetail, Amount, Donation};

// ─────────────────────────────────────────────────────────
// Tri-state primitives
// ─────────────────────────────────────────────────────────

/// A ledger-derived boolean that may not have been readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    True,
    False,
    Unknown,
}

impl Flag {
    pub fn is_true(self) -> bool {
        self == Flag::True
    }

    pub fn is_false(self) -> bool {
        self == Flag::False
    }

    pub fn is_unknown(self) -> bool {
        self == Flag::Unknown
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        if value {
            Flag::True
        } else {
            Flag::False
        }
    }
}

/// A ledger-derived value that may not have been readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Fetched<T> {
    Known(T),
    Unknown,
}

impl<T> Fetched<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Fetched::Known(v) => Some(v),
            Fetched::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Fetched::Unknown)
    }
}

// ─────────────────────────────────────────────────────────
// Request records
// ─────────────────────────────────────────────────────────

/// One current-cycle aid request as seen by the aggregator.
///
/// When the per-address detail read fails, the record survives with every
/// derived field `Unknown` — the address list said it exists, so dropping it
/// would corrupt the array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AidRequestRecord {
    pub recipient: Address,
    pub reason: Fetched<String>,
    pub location: Fetched<String>,
    pub name: Fetched<String>,
    pub contact: Fetched<String>,
    /// Unix seconds.
    pub submitted_at: Fetched<i64>,
    pub approved: Flag,
    pub claimed: Flag,
    pub recipient_badge: Flag,
}

impl AidRequestRecord {
    pub fn from_detail(detail: AidRequestDetail, recipient_badge: Flag) -> Self {
        AidRequestRecord {
            recipient: detail.recipient,
            reason: Fetched::Known(detail.reason),
            location: Fetched::Known(detail.location),
            name: Fetched::Known(detail.name),
            contact: Fetched::Known(detail.contact),
            submitted_at: Fetched::Known(detail.submitted_at),
            approved: detail.approved.into(),
            claimed: detail.claimed.into(),
            recipient_badge,
        }
    }

    /// A record whose detail read failed: identity only, everything else
    /// explicitly unknown.
    pub fn unknown(recipient: Address) -> Self {
        AidRequestRecord {
            recipient,
            reason: Fetched::Unknown,
            location: Fetched::Unknown,
            name: Fetched::Unknown,
            contact: Fetched::Unknown,
            submitted_at: Fetched::Unknown,
            approved: Flag::Unknown,
            claimed: Flag::Unknown,
            recipient_badge: Flag::Unknown,
        }
    }

    pub fn has_unknown_fields(&self) -> bool {
        self.reason.is_unknown()
            || self.location.is_unknown()
            || self.name.is_unknown()
            || self.contact.is_unknown()
            || self.submitted_at.is_unknown()
            || self.approved.is_unknown()
            || self.claimed.is_unknown()
            || self.recipient_badge.is_unknown()
    }
}

// ─────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────

/// One reconstruction of application-level ledger state.
///
/// Fields within a snapshot are sampled independently and are not drawn
/// from one ledger height; callers tolerate one refresh interval of skew
/// and never treat a snapshot as atomic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractState {
    pub taken_at: DateTime<Utc>,
    /// True when any read in this refresh failed or timed out.
    pub partial: bool,

    pub total_donated: Fetched<Amount>,
    pub aid_amount: Fetched<Amount>,
    /// The single approved-and-unclaimed recipient, if any.
    pub active_recipient: Fetched<Option<Address>>,
    pub donations: Fetched<Vec<Donation>>,
    /// Current-cycle requests, in ledger list order.
    pub requests: Fetched<Vec<AidRequestRecord>>,

    /// Identity the caller-scoped flags below were resolved for.  With no
    /// caller, those flags default to `False` (not `Unknown` — there is
    /// nothing to fetch).
    pub caller: Option<Address>,
    pub user_has_applied: Flag,
    pub user_is_approved: Flag,
    pub user_has_claimed: Flag,
    pub user_has_donated: Flag,
    pub user_has_donor_badge: Flag,
    pub user_has_recipient_badge: Flag,
}

impl ContractState {
    /// The before-first-refresh placeholder: everything unknown.
    pub fn empty() -> Self {
        ContractState {
            taken_at: Utc::now(),
            partial: true,
            total_donated: Fetched::Unknown,
            aid_amount: Fetched::Unknown,
            active_recipient: Fetched::Unknown,
            donations: Fetched::Unknown,
            requests: Fetched::Unknown,
            caller: None,
            user_has_applied: Flag::Unknown,
            user_is_approved: Flag::Unknown,
            user_has_claimed: Flag::Unknown,
            user_has_donated: Flag::Unknown,
            user_has_donor_badge: Flag::Unknown,
            user_has_recipient_badge: Flag::Unknown,
        }
    }

    /// Look up the current-cycle record for an address, if the request list
    /// was readable at all.
    pub fn request(&self, addr: Address) -> Option<&AidRequestRecord> {
        self.requests
            .known()
            .and_then(|list| list.iter().find(|r| r.recipient == addr))
    }
}

// ─────────────────────────────────────────────────────────
// Snapshot store
// ─────────────────────────────────────────────────────────

/// Holds the latest published snapshot.
///
/// Refreshes build a complete new `ContractState` and swap it in whole; a
/// published snapshot is never mutated, so readers holding the previous
/// `Arc` see a consistent value for as long as they keep it.
pub struct SnapshotStore {
    current: RwLock<Arc<ContractState>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        SnapshotStore {
            current: RwLock::new(Arc::new(ContractState::empty())),
        }
    }

    pub async fn publish(&self, snapshot: ContractState) -> Arc<ContractState> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().await = Arc::clone(&snapshot);
        snapshot
    }

    pub async fn latest(&self) -> Arc<ContractState> {
        Arc::clone(&*self.current.read().await)
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
