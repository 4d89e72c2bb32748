//! Pre-submission validation: every transition's precondition evaluated as
//! a pure function over the latest snapshot.
//!
//! A pass here is advisory, not a guarantee — the snapshot may be stale by
//! the time the ledger sequences the transaction, and the ledger's own
//! atomic check-and-set is the correctness boundary.  What the guard buys
//! is failing invalid operations synchronously and locally, before any
//! transaction cost is paid.
//!
//! Unknown preconditions block: a partial snapshot must never let an
//! operation through on a field that merely *failed to read* as false.

use serde::Serialize;
use std::fmt;

use crate::auth::AuthorizationPolicy;
use crate::cycle::{self, CycleStage, CycleTransition};
use crate::ledger::{Address, Operation};
use crate::snapshot::{ContractState, Fetched, Flag};

// ─────────────────────────────────────────────────────────
// Rejection values
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardReason {
    NotAuthorized,
    AlreadyApplied,
    /// Terminal request from this cycle still on record; an admin reset is
    /// required before this address can apply again.
    CycleNotReset,
    NoRequest,
    AlreadyApproved,
    NotApproved,
    AlreadyClaimed,
    NotYetClaimed,
    NotTheRecipient,
    ActiveCycleInProgress,
    NoDonationOnRecord,
    BadgeAlreadyHeld,
    ZeroAmount,
    ZeroAddressRecipient,
    /// A field this precondition depends on was unreadable in the snapshot.
    UnknownPrecondition,
}

impl GuardReason {
    fn describe(self) -> &'static str {
        match self {
            GuardReason::NotAuthorized => "caller is not authorized for this operation",
            GuardReason::AlreadyApplied => "a request for this address is already pending or active",
            GuardReason::CycleNotReset => "previous request is terminal; wait for a cycle reset",
            GuardReason::NoRequest => "no current-cycle request exists for this address",
            GuardReason::AlreadyApproved => "request is already approved",
            GuardReason::NotApproved => "request has not been approved",
            GuardReason::AlreadyClaimed => "aid has already been claimed",
            GuardReason::NotYetClaimed => "recipient has not claimed aid",
            GuardReason::NotTheRecipient => "caller is not the active recipient",
            GuardReason::ActiveCycleInProgress => "another recipient is approved and unclaimed",
            GuardReason::NoDonationOnRecord => "caller has no donation on record",
            GuardReason::BadgeAlreadyHeld => "a badge for this role is already held",
            GuardReason::ZeroAmount => "amount must be greater than zero",
            GuardReason::ZeroAddressRecipient => "recipient must be a non-zero address",
            GuardReason::UnknownPrecondition => {
                "a required field could not be read; refresh and retry"
            }
        }
    }
}

/// A local precondition failure.  Surfaced to the user immediately; the
/// operation is never submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuardRejection {
    pub operation: &'static str,
    pub reason: GuardReason,
}

impl fmt::Display for GuardRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rejected: {}", self.operation, self.reason.describe())
    }
}

type GuardResult = Result<(), GuardRejection>;

// ─────────────────────────────────────────────────────────
// Guard
// ─────────────────────────────────────────────────────────

pub struct OperationGuard<P> {
    policy: P,
}

impl<P: AuthorizationPolicy> OperationGuard<P> {
    pub fn new(policy: P) -> Self {
        OperationGuard { policy }
    }

    /// Evaluate the precondition for `op` as submitted by `caller` against
    /// `state`.  Synchronous and side-effect-free.
    pub fn check(&self, state: &ContractState, caller: Address, op: &Operation) -> GuardResult {
        let reject = |reason| Err(GuardRejection { operation: op.method(), reason });

        match op {
            Operation::Donate { amount, recipient, .. } => {
                if amount.is_zero() {
                    return reject(GuardReason::ZeroAmount);
                }
                if recipient.is_some_and(|r| r.is_zero()) {
                    return reject(GuardReason::ZeroAddressRecipient);
                }
                Ok(())
            }

            Operation::ApplyForAid { .. } => {
                let stage = match caller_stage(state, caller) {
                    Ok(stage) => stage,
                    Err(reason) => return reject(reason),
                };
                if cycle::transition_allowed(stage, CycleTransition::Apply) {
                    return Ok(());
                }
                reject(match stage {
                    CycleStage::Claimed => GuardReason::CycleNotReset,
                    CycleStage::Unknown => GuardReason::UnknownPrecondition,
                    _ => GuardReason::AlreadyApplied,
                })
            }

            Operation::ApproveRecipient { recipient } => {
                if !self.policy.is_authorized(caller) {
                    return reject(GuardReason::NotAuthorized);
                }
                let stage = match target_stage(state, *recipient) {
                    Ok(Some(stage)) => stage,
                    Ok(None) => return reject(GuardReason::NoRequest),
                    Err(reason) => return reject(reason),
                };
                if !cycle::transition_allowed(stage, CycleTransition::Approve) {
                    return reject(match stage {
                        CycleStage::Approved => GuardReason::AlreadyApproved,
                        CycleStage::Claimed => GuardReason::AlreadyClaimed,
                        _ => GuardReason::UnknownPrecondition,
                    });
                }
                // Single-active-recipient policy: nobody else may be
                // approved-and-unclaimed when this approval lands.
                match no_active_recipient(state) {
                    Ok(true) => Ok(()),
                    Ok(false) => reject(GuardReason::ActiveCycleInProgress),
                    Err(reason) => reject(reason),
                }
            }

            Operation::RejectRecipient { recipient } => {
                if !self.policy.is_authorized(caller) {
                    return reject(GuardReason::NotAuthorized);
                }
                let stage = match target_stage(state, *recipient) {
                    Ok(Some(stage)) => stage,
                    Ok(None) => return reject(GuardReason::NoRequest),
                    Err(reason) => return reject(reason),
                };
                if cycle::transition_allowed(stage, CycleTransition::Reject) {
                    return Ok(());
                }
                reject(match stage {
                    CycleStage::Approved => GuardReason::AlreadyApproved,
                    CycleStage::Claimed => GuardReason::AlreadyClaimed,
                    _ => GuardReason::UnknownPrecondition,
                })
            }

            Operation::ClaimAid => {
                // Looking the record up by the caller's own address is what
                // enforces caller == recipient.
                let stage = match target_stage(state, caller) {
                    Ok(Some(stage)) => stage,
                    Ok(None) => return reject(GuardReason::NoRequest),
                    Err(reason) => return reject(reason),
                };
                if !cycle::transition_allowed(stage, CycleTransition::Claim) {
                    return reject(match stage {
                        CycleStage::Pending => GuardReason::NotApproved,
                        CycleStage::Claimed => GuardReason::AlreadyClaimed,
                        _ => GuardReason::UnknownPrecondition,
                    });
                }
                match &state.active_recipient {
                    Fetched::Unknown => reject(GuardReason::UnknownPrecondition),
                    Fetched::Known(Some(active)) if *active != caller => {
                        reject(GuardReason::NotTheRecipient)
                    }
                    // Known(None) with an approved record is one-refresh
                    // skew; the record is the stronger signal and the
                    // ledger arbitrates on submission.
                    _ => Ok(()),
                }
            }

            Operation::MintDonorNft { holder } => {
                if *holder != caller {
                    return reject(GuardReason::NotAuthorized);
                }
                if state.caller != Some(caller) {
                    // Caller-scoped flags in this snapshot belong to
                    // someone else; nothing can be concluded from them.
                    return reject(GuardReason::UnknownPrecondition);
                }
                match state.user_has_donated {
                    Flag::Unknown => return reject(GuardReason::UnknownPrecondition),
                    Flag::False => return reject(GuardReason::NoDonationOnRecord),
                    Flag::True => {}
                }
                match state.user_has_donor_badge {
                    Flag::Unknown => reject(GuardReason::UnknownPrecondition),
                    Flag::True => reject(GuardReason::BadgeAlreadyHeld),
                    Flag::False => Ok(()),
                }
            }

            Operation::MintRecipientNft { recipient } => {
                if *recipient != caller && !self.policy.is_authorized(caller) {
                    return reject(GuardReason::NotAuthorized);
                }
                let record = match &state.requests {
                    Fetched::Unknown => return reject(GuardReason::UnknownPrecondition),
                    Fetched::Known(_) => state.request(*recipient),
                };
                let Some(record) = record else {
                    return reject(GuardReason::NotYetClaimed);
                };
                let stage = cycle::stage_of(record);
                if !cycle::transition_allowed(stage, CycleTransition::MintRecipientBadge) {
                    return reject(match stage {
                        CycleStage::Unknown => GuardReason::UnknownPrecondition,
                        _ => GuardReason::NotYetClaimed,
                    });
                }
                match record.recipient_badge {
                    Flag::Unknown => reject(GuardReason::UnknownPrecondition),
                    Flag::True => reject(GuardReason::BadgeAlreadyHeld),
                    Flag::False => Ok(()),
                }
            }

            Operation::ResetCycle => {
                if !self.policy.is_authorized(caller) {
                    return reject(GuardReason::NotAuthorized);
                }
                match no_active_recipient(state) {
                    Ok(true) => Ok(()),
                    Ok(false) => reject(GuardReason::ActiveCycleInProgress),
                    Err(reason) => reject(reason),
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────
// Snapshot queries
// ─────────────────────────────────────────────────────────

/// Stage of the caller's own current-cycle request; `CycleStage::None` when
/// no record exists.
fn caller_stage(state: &ContractState, caller: Address) -> Result<CycleStage, GuardReason> {
    target_stage(state, caller).map(|s| s.unwrap_or(CycleStage::None))
}

/// Stage of an arbitrary address's request, or `None` when the address has
/// no current-cycle record.
fn target_stage(state: &ContractState, addr: Address) -> Result<Option<CycleStage>, GuardReason> {
    match &state.requests {
        Fetched::Unknown => Err(GuardReason::UnknownPrecondition),
        Fetched::Known(_) => Ok(state.request(addr).map(cycle::stage_of)),
    }
}

/// True when the snapshot confirms that nobody is approved-and-unclaimed.
///
/// Both signals must agree: the `activeRecipient` read must say "nobody"
/// and no listed record may derive to `Approved`.  A record whose stage is
/// unreadable makes the answer unknowable.
fn no_active_recipient(state: &ContractState) -> Result<bool, GuardReason> {
    match &state.active_recipient {
        Fetched::Unknown => return Err(GuardReason::UnknownPrecondition),
        Fetched::Known(Some(_)) => return Ok(false),
        Fetched::Known(None) => {}
    }
    let records = match &state.requests {
        Fetched::Unknown => return Err(GuardReason::UnknownPrecondition),
        Fetched::Known(records) => records,
    };
    let mut any_unknown = false;
    for record in records {
        match cycle::stage_of(record) {
            CycleStage::Approved => return Ok(false),
            CycleStage::Unknown => any_unknown = true,
            _ => {}
        }
    }
    if any_unknown {
        Err(GuardReason::UnknownPrecondition)
    } else {
        Ok(true)
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
