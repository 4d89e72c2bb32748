//! The ledger gateway surface: wire types and the capability trait.
//!
//! These mirror the AidChain contract ABI (the contract source itself lives
//! elsewhere; only its call surface is consumed here).  The gateway is the
//! single source of transaction ordering — everything in this process treats
//! it as the authority of record and its own checks as advisory.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::errors::Result;

// ─────────────────────────────────────────────────────────
// Address
// ─────────────────────────────────────────────────────────

/// A 20-byte account address, hex-encoded with a `0x` prefix on the wire.
///
/// The all-zero address is the ledger's "no address" sentinel; reads that
/// can return "nobody" (e.g. `activeRecipient`) map it to `None` at the
/// gateway boundary instead of leaking it upward.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

#[derive(Debug, Error)]
#[error("invalid address: {0}")]
pub struct AddressParseError(String);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    #[cfg(test)]
    pub fn from_low_byte(b: u8) -> Self {
        let mut bytes = [0u8; 20];
        bytes[19] = b;
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Accepts `0x`-prefixed, 40-hex-digit strings in either case.
    /// Mixed-case inputs are normalised by decoding to bytes, so address
    /// comparison is always case-insensitive.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix("0x")
            .ok_or_else(|| AddressParseError(s.to_string()))?;
        let bytes = hex::decode(hex_part).map_err(|_| AddressParseError(s.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| AddressParseError(s.to_string()))?;
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────
// Amount
// ─────────────────────────────────────────────────────────

/// A currency amount in the smallest unit.
///
/// Travels as a decimal string in JSON (amounts overflow the interoperable
/// JSON number range); accepts plain numbers on input for convenience.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(pub u128);

impl Amount {
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct AmountVisitor;

        impl serde::de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal string or integer amount")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<Amount, E> {
                v.parse::<u128>().map(Amount).map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<Amount, E> {
                Ok(Amount(v as u128))
            }

            fn visit_u128<E: serde::de::Error>(self, v: u128) -> std::result::Result<Amount, E> {
                Ok(Amount(v))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

// ─────────────────────────────────────────────────────────
// Ledger records
// ─────────────────────────────────────────────────────────

/// One accepted contribution, append-only on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donation {
    pub donor: Address,
    /// Targeted recipient, if any.  The ledger encodes "untargeted" as the
    /// zero address; that is decoded to `None` here.
    #[serde(default, deserialize_with = "de_zero_is_none")]
    pub recipient: Option<Address>,
    pub amount: Amount,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Per-address aid request detail as returned by `aidRequests(address)`.
///
/// The ledger returns a zeroed struct for addresses with no record; the
/// gateway maps that to `None` (see [`LedgerGateway::aid_request`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AidRequestDetail {
    pub recipient: Address,
    pub reason: String,
    pub location: String,
    pub name: String,
    pub contact: String,
    /// Unix seconds.
    pub submitted_at: i64,
    pub approved: bool,
    pub claimed: bool,
}

/// Receipt for a confirmed state-changing submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: String,
    pub block: u64,
    #[serde(default = "Utc::now")]
    pub confirmed_at: DateTime<Utc>,
}

fn de_zero_is_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Address>, D::Error> {
    let addr = Option::<Address>::deserialize(deserializer)?;
    Ok(addr.filter(|a| !a.is_zero()))
}

// ─────────────────────────────────────────────────────────
// Operations
// ─────────────────────────────────────────────────────────

/// Every state-changing operation on the contract surface.
///
/// Donate is not a cycle transition (it never touches an `AidRequest`), but
/// it submits through the same gateway and guard path as the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Donate {
        amount: Amount,
        recipient: Option<Address>,
        /// Route through the confidentiality-preserving ledger endpoint.
        /// Semantics are identical; only observability differs.
        confidential: bool,
    },
    ApplyForAid {
        reason: String,
        location: String,
        name: String,
        contact: String,
    },
    ApproveRecipient {
        recipient: Address,
    },
    RejectRecipient {
        recipient: Address,
    },
    ClaimAid,
    MintDonorNft {
        holder: Address,
    },
    MintRecipientNft {
        recipient: Address,
    },
    ResetCycle,
}

impl Operation {
    /// The ABI method name this operation submits as.
    pub fn method(&self) -> &'static str {
        match self {
            Operation::Donate { .. } => "donate",
            Operation::ApplyForAid { .. } => "applyForAid",
            Operation::ApproveRecipient { .. } => "approveRecipient",
            Operation::RejectRecipient { .. } => "rejectRecipient",
            Operation::ClaimAid => "claimAid",
            Operation::MintDonorNft { .. } => "mintDonorNFT",
            Operation::MintRecipientNft { .. } => "mintRecipientNFT",
            Operation::ResetCycle => "resetCycle",
        }
    }
}

// ─────────────────────────────────────────────────────────
// Gateway capability
// ─────────────────────────────────────────────────────────

/// Read and submit access to the AidChain ledger.
///
/// Reads are independent and side-effect-free; none of them is guaranteed
/// to observe the same ledger height as another.  `submit` is single-shot:
/// implementations must not retry a refused operation.
pub trait LedgerGateway: Send + Sync {
    fn total_donated(&self) -> impl Future<Output = Result<Amount>> + Send;

    fn donations(&self) -> impl Future<Output = Result<Vec<Donation>>> + Send;

    /// Addresses with a request record in the current cycle.
    fn aid_request_list(&self) -> impl Future<Output = Result<Vec<Address>>> + Send;

    /// Detail for one address; `None` when the address has no current record.
    fn aid_request(
        &self,
        addr: Address,
    ) -> impl Future<Output = Result<Option<AidRequestDetail>>> + Send;

    fn is_approved(&self, addr: Address) -> impl Future<Output = Result<bool>> + Send;

    fn has_claimed(&self, addr: Address) -> impl Future<Output = Result<bool>> + Send;

    fn has_donated(&self, addr: Address) -> impl Future<Output = Result<bool>> + Send;

    fn has_donor_badge(&self, addr: Address) -> impl Future<Output = Result<bool>> + Send;

    fn has_recipient_badge(&self, addr: Address) -> impl Future<Output = Result<bool>> + Send;

    /// The fixed per-cycle payout parameter (`AID_AMOUNT`).
    fn aid_amount(&self) -> impl Future<Output = Result<Amount>> + Send;

    /// The single approved-and-unclaimed recipient, if any.
    fn active_recipient(&self) -> impl Future<Output = Result<Option<Address>>> + Send;

    /// Submit a signed state-changing operation.  A ledger refusal surfaces
    /// as [`crate::errors::ControllerError::LedgerRejected`].
    fn submit(
        &self,
        op: &Operation,
        signer: Address,
    ) -> impl Future<Output = Result<Receipt>> + Send;
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
