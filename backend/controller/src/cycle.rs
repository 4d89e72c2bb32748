//! The aid-cycle state machine.
//!
//! Per recipient address, one cycle instance moves strictly forward:
//!
//! ```text
//! None ──► Pending ──► Approved ──► Claimed
//!              └──────► Rejected
//! ```
//!
//! `Rejected` and `Claimed` are terminal for the instance.  A global,
//! admin-only `ResetCycle` starts a new cycle: previously terminal addresses
//! may apply again (a fresh instance), while the retired record stays on the
//! ledger for history.  At most one address is `Approved`-and-unclaimed at
//! any time; that address is the cycle's active recipient.
//!
//! Everything here is pure — the ledger enforces the same transitions
//! atomically and remains the correctness authority (see `guard.rs`).

use serde::Serialize;

use crate::snapshot::{AidRequestRecord, Flag};

/// Where one address stands in the current cycle.
///
/// `Rejected` never appears in derived stages: the ledger removes a
/// rejected request from the current-cycle list, so the address reads back
/// as `None`.  The variant exists because the machine itself has the state
/// (reject is a valid transition out of `Pending`, and nothing transitions
/// out of `Rejected`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    None,
    Pending,
    Approved,
    Rejected,
    Claimed,
    /// The record's flags could not be read; the stage cannot be derived.
    Unknown,
}

/// The transitions that act on a single request instance.
///
/// `ResetCycle` and donor-badge minting are deliberately absent: reset is
/// global (not keyed by a request) and donor badges are donation-gated, not
/// cycle-gated.  Both are handled directly by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTransition {
    Apply,
    Approve,
    Reject,
    Claim,
    MintRecipientBadge,
}

/// Derive the stage of one current-cycle record.
///
/// `claimed` wins over `approved`: a claimed record is terminal regardless
/// of what the approval flag reads (the ledger invariant says it must be
/// true; the aggregator logs a violation, it does not mask it).
pub fn stage_of(record: &AidRequestRecord) -> CycleStage {
    match (record.claimed, record.approved) {
        (Flag::True, _) => CycleStage::Claimed,
        (Flag::Unknown, _) | (_, Flag::Unknown) => CycleStage::Unknown,
        (Flag::False, Flag::True) => CycleStage::Approved,
        (Flag::False, Flag::False) => CycleStage::Pending,
    }
}

/// The valid-transition matrix.  Forward-only; terminal stages admit
/// nothing except the recipient-badge mint on a claimed instance.
pub fn transition_allowed(stage: CycleStage, transition: CycleTransition) -> bool {
    matches!(
        (stage, transition),
        (CycleStage::None, CycleTransition::Apply)
            | (CycleStage::Pending, CycleTransition::Approve)
            | (CycleStage::Pending, CycleTransition::Reject)
            | (CycleStage::Approved, CycleTransition::Claim)
            | (CycleStage::Claimed, CycleTransition::MintRecipientBadge)
    )
}
