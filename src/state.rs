//! Account entitlement, on-demand pot, and pricing snapshots.
//!
//! These are the inputs the accountant loads at construction and never
//! mutates afterwards. [`PaymentStateJson`] mirrors the disperser's
//! payment-state reply so a client can hydrate an accountant from a fetched
//! snapshot or from a cached JSON file on disk.

use crate::quorum::QuorumId;
use crate::schema::NETWORK_ID;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Schema identifier for payment-state snapshots.
pub const SCHEMA_PAYMENT_STATE: &str = "meridian.pay.state.v1";

/// Smallest ring size at which *current*, *previous*, and *overflow* bins
/// never alias.
pub const MIN_NUM_BINS: u32 = 3;

/// Default ring size.
pub const DEFAULT_NUM_BINS: u32 = 3;

/// Constant-rate reservation entitlement for one account.
///
/// A zero `symbols_per_second` means the account holds no reservation and
/// every request is billed on-demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedPayment {
    /// Reserved throughput in symbols per second.
    pub symbols_per_second: u64,
    /// Second-precision Unix timestamp at which the entitlement activates.
    pub start_timestamp: u64,
    /// Second-precision Unix timestamp at which the entitlement expires.
    pub end_timestamp: u64,
    /// Quorums this reservation may disperse to.
    pub quorum_numbers: Vec<QuorumId>,
    /// Per-quorum bandwidth split percentages. Informational only; the
    /// charging math never consults them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quorum_splits: Vec<u8>,
}

/// Prepaid on-demand pot for one account.
///
/// Deposits happen externally (on-chain); the accountant only ever reads the
/// deposited total and tracks its own spend against it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnDemandDeposit {
    /// Total funds deposited so far, monotonically non-decreasing.
    pub deposited_cumulative: u128,
}

/// Static pricing parameters for one payment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Reservation bin width in seconds.
    pub reservation_window_seconds: u32,
    /// On-demand unit cost per billable symbol.
    pub price_per_symbol: u64,
    /// Quantum to which billable symbol counts are rounded up.
    pub min_symbols: u32,
    /// Number of slots in the period ring.
    #[serde(default = "default_num_bins")]
    pub num_bins: u32,
    /// Quorums the on-demand path may disperse to.
    #[serde(default = "default_on_demand_quorums")]
    pub on_demand_quorums: Vec<QuorumId>,
}

impl PricingConfig {
    /// Builds a config with the default ring size and on-demand quorum set.
    pub fn new(reservation_window_seconds: u32, price_per_symbol: u64, min_symbols: u32) -> Self {
        Self {
            reservation_window_seconds,
            price_per_symbol,
            min_symbols,
            num_bins: DEFAULT_NUM_BINS,
            on_demand_quorums: default_on_demand_quorums(),
        }
    }

    /// Rejects parameter combinations the charging math cannot support.
    pub fn validate(&self) -> Result<(), StateCodecError> {
        if self.reservation_window_seconds == 0 {
            return Err(StateCodecError::InvalidPricing(
                "reservation window must be at least one second",
            ));
        }
        if self.min_symbols == 0 {
            return Err(StateCodecError::InvalidPricing(
                "minimum symbol count must be nonzero",
            ));
        }
        if self.num_bins < MIN_NUM_BINS {
            return Err(StateCodecError::InvalidPricing(
                "period ring needs at least three bins",
            ));
        }
        Ok(())
    }
}

fn default_num_bins() -> u32 {
    DEFAULT_NUM_BINS
}

fn default_on_demand_quorums() -> Vec<QuorumId> {
    vec![0, 1]
}

/// Machine-readable payment-state snapshot for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStateJson {
    /// Schema identifier (`meridian.pay.state.v1`).
    pub schema: String,
    /// Network identifier (`MERIDIAN-DA`).
    pub network: String,
    /// Hex-encoded account identifier.
    pub account_id: String,
    /// Reservation entitlement; defaults to none.
    #[serde(default)]
    pub reservation: ReservedPayment,
    /// On-demand pot totals.
    pub on_demand: OnDemandDeposit,
    /// Pricing parameters for the session.
    pub pricing: PricingConfig,
    /// Cumulative on-demand spend the server has already accepted for this
    /// account; seeds the accountant's counter on hydration.
    #[serde(default)]
    pub spent_cumulative: u128,
    /// Millisecond timestamp at which the snapshot was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

impl PaymentStateJson {
    /// Wraps raw account state in a schema-tagged snapshot.
    pub fn from_parts(
        account_id: impl Into<String>,
        reservation: ReservedPayment,
        on_demand: OnDemandDeposit,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            schema: SCHEMA_PAYMENT_STATE.to_string(),
            network: NETWORK_ID.to_string(),
            account_id: account_id.into(),
            reservation,
            on_demand,
            pricing,
            spent_cumulative: 0,
            timestamp_ms: None,
        }
    }

    /// Ensures the snapshot belongs to this network and carries usable
    /// pricing parameters.
    pub fn validate(&self) -> Result<(), StateCodecError> {
        if self.schema != SCHEMA_PAYMENT_STATE {
            return Err(StateCodecError::InvalidSchema {
                expected: SCHEMA_PAYMENT_STATE,
                found: self.schema.clone(),
            });
        }
        if self.network != NETWORK_ID {
            return Err(StateCodecError::InvalidNetwork {
                expected: NETWORK_ID,
                found: self.network.clone(),
            });
        }
        self.pricing.validate()
    }

    /// Serialises the snapshot to JSON text.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialises a snapshot from JSON text.
    pub fn from_json_str(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

/// Reads and validates a payment-state snapshot from a JSON file.
pub fn load_payment_state(path: &Path) -> Result<PaymentStateJson, StateCodecError> {
    let contents = fs::read_to_string(path).map_err(|err| StateCodecError::Io(err.to_string()))?;
    let state = PaymentStateJson::from_json_str(&contents)
        .map_err(|err| StateCodecError::Parse(err.to_string()))?;
    state.validate()?;
    Ok(state)
}

/// Errors produced while decoding or validating payment state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateCodecError {
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
    /// Pricing parameters the charging math cannot support.
    InvalidPricing(&'static str),
    /// File-system failure while loading a snapshot.
    Io(String),
    /// Snapshot failed to parse.
    Parse(String),
}

impl fmt::Display for StateCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSchema { expected, found } => {
                write!(f, "invalid schema: expected {expected}, found {found}")
            }
            Self::InvalidNetwork { expected, found } => {
                write!(f, "invalid network: expected {expected}, found {found}")
            }
            Self::InvalidPricing(reason) => write!(f, "invalid pricing: {reason}"),
            Self::Io(err) => write!(f, "payment state I/O error: {err}"),
            Self::Parse(err) => write!(f, "payment state parse error: {err}"),
        }
    }
}

impl std::error::Error for StateCodecError {}
