//! Admin authorization as an injected capability.
//!
//! The guard only ever asks "may this identity administrate?" — it does not
//! care whether the answer comes from a static allow-list, an on-ledger role
//! registry, or a multi-sig policy.  Swapping the policy never touches the
//! guard.

use crate::ledger::Address;

pub trait AuthorizationPolicy: Send + Sync {
    fn is_authorized(&self, identity: Address) -> bool;
}

/// Static allow-list policy, populated from configuration.
///
/// Addresses are compared in decoded byte form, so the hex casing used in
/// the environment variable is irrelevant.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    admins: Vec<Address>,
}

impl AllowList {
    pub fn new(admins: Vec<Address>) -> Self {
        AllowList { admins }
    }
}

impl AuthorizationPolicy for AllowList {
    fn is_authorized(&self, identity: Address) -> bool {
        self.admins.contains(&identity)
    }
}
