//! End-to-end cycle scenarios: guard + aggregator against the in-memory
//! ledger, exercising the full apply → approve → claim → reset loop and the
//! stale-snapshot races the ledger must win.

use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::refresh;
use crate::auth::AllowList;
use crate::errors::ControllerError;
use crate::guard::{GuardReason, OperationGuard};
use crate::ledger::{Address, Amount, LedgerGateway, Operation};
use crate::snapshot::{ContractState, Fetched, Flag};
use crate::testledger::TestLedger;

const WAIT: Duration = Duration::from_millis(500);

struct Harness {
    ledger: Arc<TestLedger>,
    guard: OperationGuard<AllowList>,
    admin: Address,
}

impl Harness {
    fn new() -> Self {
        let admin = Address::from_low_byte(0xAD);
        let ledger = Arc::new(TestLedger::new(500));
        ledger.add_admin(admin);
        Harness {
            ledger,
            guard: OperationGuard::new(AllowList::new(vec![admin])),
            admin,
        }
    }

    async fn snapshot(&self, caller: Address) -> ContractState {
        refresh(&self.ledger, Some(caller), WAIT).await
    }

    /// The full client path: refresh, guard, submit.
    async fn execute(&self, caller: Address, op: Operation) -> Result<(), String> {
        let state = self.snapshot(caller).await;
        self.guard
            .check(&state, caller, &op)
            .map_err(|r| r.to_string())?;
        self.ledger
            .submit(&op, caller)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

fn apply() -> Operation {
    Operation::ApplyForAid {
        reason: "medical".to_string(),
        location: "1,2".to_string(),
        name: "R".to_string(),
        contact: "000".to_string(),
    }
}

#[tokio::test]
async fn full_cycle_and_reapply_after_reset() {
    let h = Harness::new();
    let recipient = Address::from_low_byte(2);

    // Apply.
    h.execute(recipient, apply()).await.unwrap();
    let state = h.snapshot(recipient).await;
    assert_eq!(state.user_has_applied, Flag::True);
    assert_eq!(state.user_is_approved, Flag::False);

    // Approve: the recipient becomes active.
    h.execute(h.admin, Operation::ApproveRecipient { recipient })
        .await
        .unwrap();
    let state = h.snapshot(recipient).await;
    assert_eq!(state.user_is_approved, Flag::True);
    assert_eq!(state.active_recipient, Fetched::Known(Some(recipient)));

    // Claim: exactly one payout of AID_AMOUNT, active recipient cleared.
    h.execute(recipient, Operation::ClaimAid).await.unwrap();
    let state = h.snapshot(recipient).await;
    assert_eq!(state.user_has_claimed, Flag::True);
    assert_eq!(state.active_recipient, Fetched::Known(None));
    assert_eq!(h.ledger.payouts(), vec![(recipient, 500)]);

    // Reset, then the same address applies again.
    h.execute(h.admin, Operation::ResetCycle).await.unwrap();
    h.execute(recipient, apply()).await.unwrap();

    let state = h.snapshot(recipient).await;
    let records = state.requests.known().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].approved, Flag::False);
    assert_eq!(records[0].claimed, Flag::False);

    // The claimed record from the retired cycle is still on the ledger.
    let history = h.ledger.history();
    assert_eq!(history.len(), 1);
    assert!(history[0].claimed);
    assert_eq!(history[0].recipient, recipient);
}

#[tokio::test]
async fn second_approval_is_refused_while_one_recipient_is_active() {
    let h = Harness::new();
    let r = Address::from_low_byte(2);
    let s = Address::from_low_byte(3);

    h.execute(r, apply()).await.unwrap();
    h.execute(s, apply()).await.unwrap();
    h.execute(h.admin, Operation::ApproveRecipient { recipient: r })
        .await
        .unwrap();

    // Guard sees the active recipient and refuses locally.
    let err = h
        .execute(h.admin, Operation::ApproveRecipient { recipient: s })
        .await
        .unwrap_err();
    assert!(err.contains("approved and unclaimed"), "{err}");

    // A second admin racing with a snapshot taken before the first
    // approval passes the guard but is refused by the ledger itself.
    let stale = {
        let mut state = h.snapshot(h.admin).await;
        state.active_recipient = Fetched::Known(None);
        if let Fetched::Known(records) = &mut state.requests {
            for record in records.iter_mut() {
                record.approved = Flag::False;
            }
        }
        state
    };
    let guard = OperationGuard::new(AllowList::new(vec![h.admin]));
    let op = Operation::ApproveRecipient { recipient: s };
    assert!(guard.check(&stale, h.admin, &op).is_ok());

    let refusal = h.ledger.submit(&op, h.admin).await.unwrap_err();
    assert!(matches!(refusal, ControllerError::LedgerRejected { .. }));
}

#[tokio::test]
async fn double_claim_is_refused_even_when_the_guard_is_raced() {
    let h = Harness::new();
    let recipient = Address::from_low_byte(2);

    h.execute(recipient, apply()).await.unwrap();
    h.execute(h.admin, Operation::ApproveRecipient { recipient })
        .await
        .unwrap();

    // Snapshot taken before the first claim lands (the rapid double-click).
    let stale = h.snapshot(recipient).await;

    h.ledger.submit(&Operation::ClaimAid, recipient).await.unwrap();

    // The stale snapshot still says approved-and-unclaimed, so the guard
    // passes; the ledger's atomic check-and-set is what refuses the replay.
    let guard = OperationGuard::new(AllowList::new(vec![h.admin]));
    assert!(guard.check(&stale, recipient, &Operation::ClaimAid).is_ok());

    let refusal = h
        .ledger
        .submit(&Operation::ClaimAid, recipient)
        .await
        .unwrap_err();
    assert!(matches!(refusal, ControllerError::LedgerRejected { .. }));

    // Exactly one payout happened.
    assert_eq!(h.ledger.payouts(), vec![(recipient, 500)]);

    // After a refresh, the guard refuses locally too.
    let fresh = h.snapshot(recipient).await;
    let rejection = guard
        .check(&fresh, recipient, &Operation::ClaimAid)
        .unwrap_err();
    assert_eq!(rejection.reason, GuardReason::AlreadyClaimed);
}

#[tokio::test]
async fn donor_badge_mints_once_per_holder() {
    let h = Harness::new();
    let donor = Address::from_low_byte(4);

    h.execute(
        donor,
        Operation::Donate {
            amount: Amount(50),
            recipient: None,
            confidential: false,
        },
    )
    .await
    .unwrap();

    h.execute(donor, Operation::MintDonorNft { holder: donor })
        .await
        .unwrap();

    // Once the mint is reflected in a refreshed snapshot, the second
    // attempt dies at the guard.
    let err = h
        .execute(donor, Operation::MintDonorNft { holder: donor })
        .await
        .unwrap_err();
    assert!(err.contains("already held"), "{err}");
}

#[tokio::test]
async fn recipient_badge_follows_the_claim() {
    let h = Harness::new();
    let recipient = Address::from_low_byte(2);

    h.execute(recipient, apply()).await.unwrap();
    h.execute(h.admin, Operation::ApproveRecipient { recipient })
        .await
        .unwrap();

    // Not yet claimed: refused locally.
    let err = h
        .execute(h.admin, Operation::MintRecipientNft { recipient })
        .await
        .unwrap_err();
    assert!(err.contains("not claimed"), "{err}");

    h.execute(recipient, Operation::ClaimAid).await.unwrap();
    h.execute(h.admin, Operation::MintRecipientNft { recipient })
        .await
        .unwrap();

    let state = h.snapshot(recipient).await;
    assert_eq!(state.user_has_recipient_badge, Flag::True);
}

#[tokio::test]
async fn partial_snapshot_blocks_cycle_operations() {
    let h = Harness::new();
    let recipient = Address::from_low_byte(2);
    h.execute(recipient, apply()).await.unwrap();

    h.ledger.fail("getAidRequests");
    let err = h.execute(recipient, apply()).await.unwrap_err();
    assert!(err.contains("could not be read"), "{err}");
}
