#![deny(missing_docs)]

//! # meridian_pay
//!
//! Client-side payment accounting for MERIDIAN-DA blob dispersal.
//!
//! Every dispersal request must carry an authenticated payment header, and
//! two billing modes coexist per account: a prepaid constant-rate
//! **reservation** bucketed into time bins, and a monotonically increasing
//! **on-demand** payment counter drawn against a prepaid pot. The
//! [`Accountant`] decides which mode each request charges, updates its
//! bin-rotating usage ledger under a single mutex, and emits the
//! [`PaymentHeader`] the disperser independently re-derives before accepting
//! the blob. Client and server must arrive at the same period index and the
//! same rounded symbol count for every request, which is why the metering
//! formulas in [`meter`] are shared verbatim by both sides.
//!
//! Reservation bins may borrow once from the bin two periods ahead; a bin
//! that borrowed blocks its successor from borrowing again. When the
//! reservation cannot absorb a request the accountant falls back to the
//! on-demand pot, and when both modes refuse, the request fails without any
//! partial charge.
//!
//! ## Usage
//!
//! ```rust
//! use meridian_pay::{Accountant, OnDemandDeposit, PricingConfig, ReservedPayment};
//!
//! let reservation = ReservedPayment {
//!     symbols_per_second: 200,
//!     start_timestamp: 1_600_000_000,
//!     end_timestamp: 1_900_000_000,
//!     quorum_numbers: vec![0, 1],
//!     quorum_splits: vec![50, 50],
//! };
//! let accountant = Accountant::new(
//!     "04fa1d",
//!     reservation,
//!     OnDemandDeposit { deposited_cumulative: 1_000 },
//!     PricingConfig::new(5, 1, 100),
//! )
//! .unwrap();
//!
//! // 300 symbols fit the 1000-symbol bin: charged to the reservation.
//! let header = accountant
//!     .account_blob(1_700_000_000_000_000_000, 300, &[0, 1])
//!     .unwrap();
//! assert_eq!(header.cumulative_payment, 0);
//! assert_eq!(header.symbol_count_billed, 300);
//! ```

pub mod accountant;
pub mod clock;
pub mod ledger;
pub mod meter;
pub mod quorum;
pub mod schema;
pub mod state;

pub use accountant::{AccountError, Accountant};
pub use clock::{Clock, SystemClock};
pub use ledger::{PeriodLedger, PeriodRecord};
pub use meter::{
    billable_symbols, bin_limit, on_demand_increment, reservation_period,
    reservation_period_from_nanos,
};
pub use quorum::{check_quorums, QuorumError, QuorumId};
pub use schema::{
    HeaderCodecError, PaymentHeader, PaymentHeaderJson, NETWORK_ID, SCHEMA_PAYMENT_HEADER,
};
pub use state::{
    load_payment_state, OnDemandDeposit, PaymentStateJson, PricingConfig, ReservedPayment,
    StateCodecError, DEFAULT_NUM_BINS, MIN_NUM_BINS, SCHEMA_PAYMENT_STATE,
};
