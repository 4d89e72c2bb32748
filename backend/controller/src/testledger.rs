//! In-memory ledger used by the async tests.
//!
//! Implements [`LedgerGateway`] over a single mutex so every submission is
//! an atomic check-and-set, the way the real contract behaves.  That makes
//! it the authority of record in tests: a guard pass with a stale snapshot
//! still gets refused here, which is exactly the TOCTOU contract the
//! controller documents.
//!
//! Individual read methods can be made to fail on demand (`fail`) to drive
//! the aggregator's degrade-to-unknown paths.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::Utc;

use crate::errors::{ControllerError, Result};
use crate::ledger::{
    Address, AidRequestDetail, Amount, Donation, LedgerGateway, Operation, Receipt,
};

#[derive(Default)]
struct Model {
    aid_amount: u128,
    total_donated: u128,
    donations: Vec<Donation>,
    /// Current-cycle requests in application order.
    requests: Vec<AidRequestDetail>,
    /// Requests retired by cycle resets; permanently retained.
    history: Vec<AidRequestDetail>,
    active: Option<Address>,
    donors: HashSet<Address>,
    donor_badges: HashSet<Address>,
    recipient_badges: HashSet<Address>,
    admins: HashSet<Address>,
    /// (recipient, amount) per executed claim.
    payouts: Vec<(Address, u128)>,
    failing: HashSet<&'static str>,
    clock: i64,
    nonce: u64,
}

pub struct TestLedger {
    inner: Mutex<Model>,
}

impl TestLedger {
    pub fn new(aid_amount: u128) -> Self {
        TestLedger {
            inner: Mutex::new(Model {
                aid_amount,
                clock: 1_704_067_200,
                ..Model::default()
            }),
        }
    }

    pub fn add_admin(&self, admin: Address) {
        self.inner.lock().unwrap().admins.insert(admin);
    }

    /// Make every read of `method` fail until healed.
    pub fn fail(&self, method: &'static str) {
        self.inner.lock().unwrap().failing.insert(method);
    }

    pub fn heal(&self, method: &'static str) {
        self.inner.lock().unwrap().failing.remove(method);
    }

    pub fn history(&self) -> Vec<AidRequestDetail> {
        self.inner.lock().unwrap().history.clone()
    }

    pub fn payouts(&self) -> Vec<(Address, u128)> {
        self.inner.lock().unwrap().payouts.clone()
    }

    fn guard_read(&self, method: &'static str) -> Result<std::sync::MutexGuard<'_, Model>> {
        let model = self.inner.lock().unwrap();
        if model.failing.contains(method) {
            return Err(ControllerError::Malformed(format!(
                "injected failure for {method}"
            )));
        }
        Ok(model)
    }
}

fn refused(method: &'static str, message: &str) -> ControllerError {
    ControllerError::LedgerRejected {
        method,
        code: 3,
        message: message.to_string(),
    }
}

impl LedgerGateway for TestLedger {
    async fn total_donated(&self) -> Result<Amount> {
        Ok(Amount(self.guard_read("totalDonated")?.total_donated))
    }

    async fn donations(&self) -> Result<Vec<Donation>> {
        Ok(self.guard_read("getDonations")?.donations.clone())
    }

    async fn aid_request_list(&self) -> Result<Vec<Address>> {
        Ok(self
            .guard_read("getAidRequests")?
            .requests
            .iter()
            .map(|r| r.recipient)
            .collect())
    }

    async fn aid_request(&self, addr: Address) -> Result<Option<AidRequestDetail>> {
        Ok(self
            .guard_read("aidRequests")?
            .requests
            .iter()
            .find(|r| r.recipient == addr)
            .cloned())
    }

    async fn is_approved(&self, addr: Address) -> Result<bool> {
        Ok(self
            .guard_read("approvedRecipients")?
            .requests
            .iter()
            .any(|r| r.recipient == addr && r.approved))
    }

    async fn has_claimed(&self, addr: Address) -> Result<bool> {
        Ok(self
            .guard_read("hasClaimedAid")?
            .requests
            .iter()
            .any(|r| r.recipient == addr && r.claimed))
    }

    async fn has_donated(&self, addr: Address) -> Result<bool> {
        Ok(self.guard_read("hasDonated")?.donors.contains(&addr))
    }

    async fn has_donor_badge(&self, addr: Address) -> Result<bool> {
        Ok(self.guard_read("hasDonorBadge")?.donor_badges.contains(&addr))
    }

    async fn has_recipient_badge(&self, addr: Address) -> Result<bool> {
        Ok(self
            .guard_read("hasRecipientBadge")?
            .recipient_badges
            .contains(&addr))
    }

    async fn aid_amount(&self) -> Result<Amount> {
        Ok(Amount(self.guard_read("AID_AMOUNT")?.aid_amount))
    }

    async fn active_recipient(&self) -> Result<Option<Address>> {
        Ok(self.guard_read("activeRecipient")?.active)
    }

    /// Atomic check-and-set for every transition; this is the enforcement
    /// the client-side guard merely mirrors.
    async fn submit(&self, op: &Operation, signer: Address) -> Result<Receipt> {
        let mut m = self.inner.lock().unwrap();
        let method = op.method();

        match op {
            Operation::Donate { amount, recipient, .. } => {
                if amount.is_zero() {
                    return Err(refused(method, "zero amount"));
                }
                m.total_donated += amount.0;
                m.clock += 1;
                let timestamp = m.clock;
                m.donations.push(Donation {
                    donor: signer,
                    recipient: *recipient,
                    amount: *amount,
                    timestamp,
                });
                m.donors.insert(signer);
            }

            Operation::ApplyForAid { reason, location, name, contact } => {
                if m.requests.iter().any(|r| r.recipient == signer) {
                    return Err(refused(method, "request already on record for this cycle"));
                }
                m.clock += 1;
                let submitted_at = m.clock;
                m.requests.push(AidRequestDetail {
                    recipient: signer,
                    reason: reason.clone(),
                    location: location.clone(),
                    name: name.clone(),
                    contact: contact.clone(),
                    submitted_at,
                    approved: false,
                    claimed: false,
                });
            }

            Operation::ApproveRecipient { recipient } => {
                if !m.admins.contains(&signer) {
                    return Err(refused(method, "unauthorized signer"));
                }
                if m.active.is_some() {
                    return Err(refused(method, "another recipient is active"));
                }
                let row = m
                    .requests
                    .iter_mut()
                    .find(|r| r.recipient == *recipient)
                    .ok_or_else(|| refused(method, "no such request"))?;
                if row.approved || row.claimed {
                    return Err(refused(method, "request is not pending"));
                }
                row.approved = true;
                m.active = Some(*recipient);
            }

            Operation::RejectRecipient { recipient } => {
                if !m.admins.contains(&signer) {
                    return Err(refused(method, "unauthorized signer"));
                }
                let idx = m
                    .requests
                    .iter()
                    .position(|r| r.recipient == *recipient && !r.approved && !r.claimed)
                    .ok_or_else(|| refused(method, "no pending request"))?;
                m.requests.remove(idx);
            }

            Operation::ClaimAid => {
                let aid_amount = m.aid_amount;
                let row = m
                    .requests
                    .iter_mut()
                    .find(|r| r.recipient == signer)
                    .ok_or_else(|| refused(method, "no such request"))?;
                if !row.approved {
                    return Err(refused(method, "not approved"));
                }
                if row.claimed {
                    return Err(refused(method, "already claimed"));
                }
                row.claimed = true;
                m.active = None;
                m.payouts.push((signer, aid_amount));
            }

            Operation::MintDonorNft { holder } => {
                if !m.donors.contains(holder) {
                    return Err(refused(method, "no donation on record"));
                }
                if !m.donor_badges.insert(*holder) {
                    return Err(refused(method, "donor badge already held"));
                }
            }

            Operation::MintRecipientNft { recipient } => {
                let claimed = m
                    .requests
                    .iter()
                    .any(|r| r.recipient == *recipient && r.claimed);
                if !claimed {
                    return Err(refused(method, "recipient has not claimed"));
                }
                if !m.recipient_badges.insert(*recipient) {
                    return Err(refused(method, "recipient badge already held"));
                }
            }

            Operation::ResetCycle => {
                if !m.admins.contains(&signer) {
                    return Err(refused(method, "unauthorized signer"));
                }
                if m.active.is_some() {
                    return Err(refused(method, "active recipient has not claimed"));
                }
                let retired = std::mem::take(&mut m.requests);
                m.history.extend(retired);
            }
        }

        m.nonce += 1;
        Ok(Receipt {
            tx_hash: format!("0x{:064x}", m.nonce),
            block: m.nonce,
            confirmed_at: Utc::now(),
        })
    }
}
