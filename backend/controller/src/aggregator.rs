//! The read aggregator — builds one [`ContractState`] snapshot from the
//! fixed set of ledger reads.
//!
//! Reads are independent and side-effect-free, so the top-level set is
//! issued concurrently and joined, and per-address detail reads fan out one
//! task per listed address.  Each read is individually bounded by the
//! configured timeout; a failure or timeout downgrades its field to
//! `Unknown` and marks the snapshot partial instead of aborting the whole
//! refresh.
//!
//! Fields within a snapshot are sampled at independent ledger heights.
//! Callers must tolerate one refresh interval of skew.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::warn;

use crate::errors::Result;
use crate::ledger::{Address, LedgerGateway};
use crate::snapshot::{AidRequestRecord, ContractState, Fetched, Flag};

/// Run one read with a bounded wait, degrading any failure to `Unknown`.
async fn fetch<T, F>(field: &str, wait: Duration, read: F) -> Fetched<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(wait, read).await {
        Ok(Ok(value)) => Fetched::Known(value),
        Ok(Err(e)) => {
            warn!("read {field} failed, field downgraded to unknown: {e}");
            Fetched::Unknown
        }
        Err(_) => {
            warn!("read {field} timed out after {wait:?}, field downgraded to unknown");
            Fetched::Unknown
        }
    }
}

fn to_flag(fetched: Fetched<bool>) -> Flag {
    match fetched {
        Fetched::Known(b) => b.into(),
        Fetched::Unknown => Flag::Unknown,
    }
}

/// Rebuild the application-level view of the ledger.
///
/// With no caller, the caller-scoped flags default to `False` — there is
/// nothing to fetch, and "absent" is not the same as "unreadable".
pub async fn refresh<G>(
    gateway: &Arc<G>,
    caller: Option<Address>,
    read_timeout: Duration,
) -> ContractState
where
    G: LedgerGateway + 'static,
{
    let (total_donated, donations, request_list, aid_amount, active_recipient) = tokio::join!(
        fetch("totalDonated", read_timeout, gateway.total_donated()),
        fetch("getDonations", read_timeout, gateway.donations()),
        fetch("getAidRequests", read_timeout, gateway.aid_request_list()),
        fetch("AID_AMOUNT", read_timeout, gateway.aid_amount()),
        fetch("activeRecipient", read_timeout, gateway.active_recipient()),
    );

    // Caller-scoped reads.
    let mut user_has_applied = Flag::False;
    let mut user_is_approved = Flag::False;
    let mut user_has_claimed = Flag::False;
    let mut user_has_donated = Flag::False;
    let mut user_has_donor_badge = Flag::False;
    let mut user_has_recipient_badge = Flag::False;

    if let Some(addr) = caller {
        let (own_request, approved, claimed, donated, donor_badge, recipient_badge) = tokio::join!(
            fetch("aidRequests", read_timeout, gateway.aid_request(addr)),
            fetch("approvedRecipients", read_timeout, gateway.is_approved(addr)),
            fetch("hasClaimedAid", read_timeout, gateway.has_claimed(addr)),
            fetch("hasDonated", read_timeout, gateway.has_donated(addr)),
            fetch("hasDonorBadge", read_timeout, gateway.has_donor_badge(addr)),
            fetch("hasRecipientBadge", read_timeout, gateway.has_recipient_badge(addr)),
        );
        user_has_applied = match own_request {
            Fetched::Known(Some(_)) => Flag::True,
            Fetched::Known(None) => Flag::False,
            Fetched::Unknown => Flag::Unknown,
        };
        user_is_approved = to_flag(approved);
        user_has_claimed = to_flag(claimed);
        user_has_donated = to_flag(donated);
        user_has_donor_badge = to_flag(donor_badge);
        user_has_recipient_badge = to_flag(recipient_badge);
    }

    // Per-address detail fan-out.
    let requests = match &request_list {
        Fetched::Unknown => Fetched::Unknown,
        Fetched::Known(addresses) => {
            Fetched::Known(resolve_records(gateway, addresses, read_timeout).await)
        }
    };

    if let Fetched::Known(records) = &requests {
        for record in records {
            if record.claimed.is_true() && record.approved.is_false() {
                warn!(
                    recipient = %record.recipient,
                    "ledger anomaly: request claimed without approval"
                );
            }
        }
    }

    let mut partial = total_donated.is_unknown()
        || donations.is_unknown()
        || aid_amount.is_unknown()
        || active_recipient.is_unknown()
        || requests.is_unknown();
    if let Fetched::Known(records) = &requests {
        partial |= records.iter().any(AidRequestRecord::has_unknown_fields);
    }
    if caller.is_some() {
        partial |= [
            user_has_applied,
            user_is_approved,
            user_has_claimed,
            user_has_donated,
            user_has_donor_badge,
            user_has_recipient_badge,
        ]
        .iter()
        .any(|f| f.is_unknown());
    }

    ContractState {
        taken_at: Utc::now(),
        partial,
        total_donated,
        aid_amount,
        active_recipient,
        donations,
        requests,
        caller,
        user_has_applied,
        user_is_approved,
        user_has_claimed,
        user_has_donated,
        user_has_donor_badge,
        user_has_recipient_badge,
    }
}

/// Fetch per-address details concurrently, preserving ledger list order.
///
/// A failed detail read yields a record with every field `Unknown` — the
/// list said the address exists, so dropping it would corrupt the array.
async fn resolve_records<G>(
    gateway: &Arc<G>,
    addresses: &[Address],
    read_timeout: Duration,
) -> Vec<AidRequestRecord>
where
    G: LedgerGateway + 'static,
{
    let mut tasks = JoinSet::new();
    for (index, addr) in addresses.iter().copied().enumerate() {
        let gateway = Arc::clone(gateway);
        tasks.spawn(async move {
            let (detail, badge) = tokio::join!(
                fetch("aidRequests", read_timeout, gateway.aid_request(addr)),
                fetch(
                    "hasRecipientBadge",
                    read_timeout,
                    gateway.has_recipient_badge(addr)
                ),
            );
            let record = match detail {
                Fetched::Known(Some(detail)) => {
                    AidRequestRecord::from_detail(detail, to_flag(badge))
                }
                Fetched::Known(None) => {
                    // Listed but unreadable as a record: keep the identity,
                    // flag everything else unknown.
                    warn!(recipient = %addr, "listed address has no detail record");
                    AidRequestRecord::unknown(addr)
                }
                Fetched::Unknown => AidRequestRecord::unknown(addr),
            };
            (index, record)
        });
    }

    let mut slots: Vec<Option<AidRequestRecord>> = vec![None; addresses.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, record)) => slots[index] = Some(record),
            Err(e) => warn!("detail task failed: {e}"),
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.unwrap_or_else(|| AidRequestRecord::unknown(addresses[i])))
        .collect()
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
