//! Wire schema for authenticated payment headers.
//!
//! Every dispersal request carries a [`PaymentHeader`]; the disperser
//! re-derives the billable symbol count and cumulative payment with the same
//! metering formulas and rejects headers that diverge from its own ledger.
//! Signing itself lives with the external key holder, which consumes the
//! domain-separated digest exposed here.

use crate::quorum::QuorumId;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network identifier used across all MERIDIAN-DA deployments.
pub const NETWORK_ID: &str = "MERIDIAN-DA";
/// Schema identifier for payment headers.
pub const SCHEMA_PAYMENT_HEADER: &str = "meridian.pay.header.v1";

const HEADER_DOMAIN: &[u8] = b"MERIDIAN_PAY_HEADER";

type Blake2b256 = Blake2b<U32>;

/// Payment metadata attached to one dispersal request.
///
/// A zero `cumulative_payment` marks a reservation charge; a nonzero value
/// is the account's post-charge on-demand total, strictly greater than every
/// previously accepted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHeader {
    /// Hex-encoded account identifier.
    pub account_id: String,
    /// Nanosecond Unix timestamp the accountant chose for the request.
    pub timestamp: i64,
    /// Post-charge cumulative on-demand payment, zero for reservation
    /// charges.
    pub cumulative_payment: u128,
    /// Billable symbol count after minimum and alignment rounding.
    pub symbol_count_billed: u32,
    /// Quorums the request disperses to.
    pub quorums: Vec<QuorumId>,
}

impl PaymentHeader {
    /// Domain-separated Blake2b-256 digest over the canonical header
    /// payload, for the external signer.
    pub fn signing_digest(&self) -> Result<[u8; 32], HeaderCodecError> {
        let payload = self.canonical_payload()?;
        let mut hasher = Blake2b256::new();
        hasher.update(HEADER_DOMAIN);
        hasher.update(&payload);
        Ok(hasher.finalize().into())
    }

    /// Hex form of [`Self::signing_digest`].
    pub fn digest_hex(&self) -> Result<String, HeaderCodecError> {
        Ok(hex::encode(self.signing_digest()?))
    }

    fn canonical_payload(&self) -> Result<Vec<u8>, HeaderCodecError> {
        #[derive(Serialize)]
        struct Canonical<'a> {
            account_id: &'a str,
            timestamp: i64,
            cumulative_payment: u128,
            symbol_count_billed: u32,
            quorums: &'a [QuorumId],
        }
        serde_json::to_vec(&Canonical {
            account_id: &self.account_id,
            timestamp: self.timestamp,
            cumulative_payment: self.cumulative_payment,
            symbol_count_billed: self.symbol_count_billed,
            quorums: &self.quorums,
        })
        .map_err(|err| HeaderCodecError::Canonical(err.to_string()))
    }
}

/// Machine-readable payment header as sent to the disperser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentHeaderJson {
    /// Schema identifier (`meridian.pay.header.v1`).
    pub schema: String,
    /// Network identifier (`MERIDIAN-DA`).
    pub network: String,
    /// Hex-encoded account identifier.
    pub account_id: String,
    /// Nanosecond Unix timestamp of the request.
    pub timestamp: i64,
    /// Post-charge cumulative on-demand payment.
    pub cumulative_payment: u128,
    /// Billable symbol count after rounding.
    pub symbol_count_billed: u32,
    /// Quorums the request disperses to.
    pub quorums: Vec<QuorumId>,
}

impl PaymentHeaderJson {
    /// Wraps a header in its schema-tagged wire form.
    pub fn from_header(header: &PaymentHeader) -> Self {
        Self {
            schema: SCHEMA_PAYMENT_HEADER.to_string(),
            network: NETWORK_ID.to_string(),
            account_id: header.account_id.clone(),
            timestamp: header.timestamp,
            cumulative_payment: header.cumulative_payment,
            symbol_count_billed: header.symbol_count_billed,
            quorums: header.quorums.clone(),
        }
    }

    /// Validates the schema tags and unwraps the header.
    pub fn into_header(self) -> Result<PaymentHeader, HeaderCodecError> {
        self.validate()?;
        Ok(PaymentHeader {
            account_id: self.account_id,
            timestamp: self.timestamp,
            cumulative_payment: self.cumulative_payment,
            symbol_count_billed: self.symbol_count_billed,
            quorums: self.quorums,
        })
    }

    /// Ensures the header belongs to this network and schema version.
    pub fn validate(&self) -> Result<(), HeaderCodecError> {
        if self.schema != SCHEMA_PAYMENT_HEADER {
            return Err(HeaderCodecError::InvalidSchema {
                expected: SCHEMA_PAYMENT_HEADER,
                found: self.schema.clone(),
            });
        }
        if self.network != NETWORK_ID {
            return Err(HeaderCodecError::InvalidNetwork {
                expected: NETWORK_ID,
                found: self.network.clone(),
            });
        }
        Ok(())
    }

    /// Serialises the header to JSON text.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialises a header from JSON text.
    pub fn from_json_str(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

/// Errors produced while encoding or validating payment headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderCodecError {
    /// Unexpected schema identifier.
    InvalidSchema {
        /// Expected schema.
        expected: &'static str,
        /// Found schema.
        found: String,
    },
    /// Unexpected network identifier.
    InvalidNetwork {
        /// Expected network.
        expected: &'static str,
        /// Found network.
        found: String,
    },
    /// The canonical payload failed to serialise.
    Canonical(String),
}

impl fmt::Display for HeaderCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSchema { expected, found } => {
                write!(f, "invalid schema: expected {expected}, found {found}")
            }
            Self::InvalidNetwork { expected, found } => {
                write!(f, "invalid network: expected {expected}, found {found}")
            }
            Self::Canonical(err) => write!(f, "canonical payload error: {err}"),
        }
    }
}

impl std::error::Error for HeaderCodecError {}
