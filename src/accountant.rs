//! Client-side payment accountant for blob dispersal.
//!
//! One accountant owns the payment state of a single account: the
//! reservation entitlement, the on-demand pot, the pricing parameters, and
//! the mutable usage ledger. Every outgoing request passes through
//! [`Accountant::account_blob`], which decides the billing mode under one
//! mutex and emits the payment header the disperser re-derives and
//! validates.

use std::sync::{Mutex, MutexGuard};

use log::{debug, warn};
use thiserror::Error;

use crate::clock::Clock;
use crate::ledger::PeriodLedger;
use crate::meter::{
    billable_symbols, bin_limit, on_demand_increment, reservation_period,
    reservation_period_from_nanos,
};
use crate::quorum::{check_quorums, QuorumError, QuorumId};
use crate::schema::PaymentHeader;
use crate::state::{
    OnDemandDeposit, PaymentStateJson, PricingConfig, ReservedPayment, StateCodecError,
};

/// Errors returned by the accountant.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    /// The request named no quorums, or one outside the allowed set.
    Quorum(#[from] QuorumError),
    #[error("neither reservation nor on-demand payment is available")]
    /// Both billing modes refused the request.
    NoCapacity,
    #[error("insufficient on-demand deposit: charge would reach {required} of {deposited}")]
    /// The on-demand arm refused for lack of balance. Surfaces from
    /// [`Accountant::account_blob`] as [`AccountError::NoCapacity`].
    InsufficientFunds {
        /// Cumulative total the charge would have reached.
        required: u128,
        /// Funds deposited so far.
        deposited: u128,
    },
    #[error("invalid payment state: {0}")]
    /// Construction snapshot failed validation.
    State(#[from] StateCodecError),
    #[error("accountant usage lock poisoned")]
    /// A previous caller panicked while holding the usage lock.
    LockPoisoned,
}

/// Mutable usage state guarded by the accountant's mutex.
#[derive(Debug)]
struct UsageState {
    ledger: PeriodLedger,
    spent_cumulative: u128,
}

/// Payment accountant for one account.
///
/// Entitlement and pricing are immutable for the accountant's lifetime; the
/// period ledger and cumulative on-demand spend mutate only under the
/// internal mutex, so concurrent [`Self::account_blob`] calls serialise into
/// a total order. Nothing inside the critical section blocks or performs
/// I/O.
#[derive(Debug)]
pub struct Accountant {
    account_id: String,
    reservation: ReservedPayment,
    on_demand: OnDemandDeposit,
    pricing: PricingConfig,
    usage: Mutex<UsageState>,
}

impl Accountant {
    /// Builds an accountant from its constituent snapshots.
    pub fn new(
        account_id: impl Into<String>,
        reservation: ReservedPayment,
        on_demand: OnDemandDeposit,
        pricing: PricingConfig,
    ) -> Result<Self, AccountError> {
        pricing.validate()?;
        let ledger = PeriodLedger::new(pricing.num_bins);
        Ok(Self {
            account_id: account_id.into(),
            reservation,
            on_demand,
            pricing,
            usage: Mutex::new(UsageState {
                ledger,
                spent_cumulative: 0,
            }),
        })
    }

    /// Hydrates an accountant from a server payment-state snapshot,
    /// seeding the cumulative spend the server has already accepted.
    pub fn from_payment_state(state: PaymentStateJson) -> Result<Self, AccountError> {
        state.validate()?;
        let PaymentStateJson {
            account_id,
            reservation,
            on_demand,
            pricing,
            spent_cumulative,
            ..
        } = state;
        let accountant = Self::new(account_id, reservation, on_demand, pricing)?;
        accountant.lock()?.spent_cumulative = spent_cumulative;
        Ok(accountant)
    }

    /// Account identifier this accountant charges for.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Decides the billing mode for one blob and commits the charge.
    ///
    /// Attempts the reservation first; when the reservation cannot absorb
    /// the billable count, falls back to the on-demand pot. Returns the
    /// payment header to attach to the request, with `cumulative_payment`
    /// zero for reservation charges. The charge is all-or-nothing: a failed
    /// request leaves ledger and counter untouched, and each success
    /// mutates state, so retries must treat the returned header as the
    /// authoritative receipt.
    pub fn account_blob(
        &self,
        timestamp_ns: i64,
        raw_symbols: u32,
        quorums: &[QuorumId],
    ) -> Result<PaymentHeader, AccountError> {
        if quorums.is_empty() {
            return Err(QuorumError::Empty.into());
        }
        let billable = billable_symbols(raw_symbols, self.pricing.min_symbols);
        let increment = on_demand_increment(billable, self.pricing.price_per_symbol);
        let period =
            reservation_period_from_nanos(timestamp_ns, self.pricing.reservation_window_seconds);

        let mut usage = self.lock()?;

        if self.reservation_open(period)
            && check_quorums(quorums, &self.reservation.quorum_numbers).is_ok()
            && usage.ledger.charge(period, billable, self.bin_limit())
        {
            debug!(
                "account {}: reserved {billable} symbols in period {period}",
                self.account_id
            );
            return Ok(self.header(timestamp_ns, 0, billable, quorums));
        }

        check_quorums(quorums, &self.pricing.on_demand_quorums)?;
        match debit_on_demand(&mut usage, self.on_demand.deposited_cumulative, increment) {
            Ok(new_spent) => {
                debug!(
                    "account {}: on-demand charge of {increment}, cumulative {new_spent}",
                    self.account_id
                );
                Ok(self.header(timestamp_ns, new_spent, billable, quorums))
            }
            Err(err) => {
                warn!("account {}: {err}", self.account_id);
                Err(AccountError::NoCapacity)
            }
        }
    }

    /// [`Self::account_blob`] stamped with the given clock's current time.
    pub fn account_blob_now(
        &self,
        clock: &dyn Clock,
        raw_symbols: u32,
        quorums: &[QuorumId],
    ) -> Result<PaymentHeader, AccountError> {
        self.account_blob(clock.now_nanos(), raw_symbols, quorums)
    }

    /// On-demand funds still unspent.
    pub fn on_demand_remaining(&self) -> Result<u128, AccountError> {
        let usage = self.lock()?;
        Ok(self
            .on_demand
            .deposited_cumulative
            .saturating_sub(usage.spent_cumulative))
    }

    /// Cumulative on-demand payment committed so far.
    pub fn spent_cumulative(&self) -> Result<u128, AccountError> {
        Ok(self.lock()?.spent_cumulative)
    }

    /// Per-slot reservation usages in ring order.
    pub fn reservation_usage(&self) -> Result<Vec<u64>, AccountError> {
        Ok(self.lock()?.ledger.usages())
    }

    fn bin_limit(&self) -> u64 {
        bin_limit(
            self.reservation.symbols_per_second,
            self.pricing.reservation_window_seconds,
        )
    }

    /// Whether the entitlement covers `period` at all.
    fn reservation_open(&self, period: u64) -> bool {
        if self.bin_limit() == 0 {
            return false;
        }
        let window = self.pricing.reservation_window_seconds;
        let start = reservation_period(self.reservation.start_timestamp, window);
        let end = reservation_period(self.reservation.end_timestamp, window);
        period >= start && period < end
    }

    fn header(
        &self,
        timestamp_ns: i64,
        cumulative_payment: u128,
        billable: u64,
        quorums: &[QuorumId],
    ) -> PaymentHeader {
        PaymentHeader {
            account_id: self.account_id.clone(),
            timestamp: timestamp_ns,
            cumulative_payment,
            symbol_count_billed: u32::try_from(billable).unwrap_or(u32::MAX),
            quorums: quorums.to_vec(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, UsageState>, AccountError> {
        self.usage.lock().map_err(|_| AccountError::LockPoisoned)
    }
}

/// Commits `increment` against the pot, or refuses without mutating.
fn debit_on_demand(
    usage: &mut UsageState,
    deposited: u128,
    increment: u128,
) -> Result<u128, AccountError> {
    let new_spent = match usage.spent_cumulative.checked_add(increment) {
        Some(total) => total,
        None => {
            return Err(AccountError::InsufficientFunds {
                required: u128::MAX,
                deposited,
            })
        }
    };
    if new_spent > deposited {
        return Err(AccountError::InsufficientFunds {
            required: new_spent,
            deposited,
        });
    }
    usage.spent_cumulative = new_spent;
    Ok(new_spent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::NANOS_PER_SECOND;

    const START_S: u64 = 1_600_000_000;
    const END_S: u64 = 1_900_000_000;
    const BASE_S: u64 = 1_700_000_000;

    fn nanos(seconds: u64) -> i64 {
        (seconds * NANOS_PER_SECOND as u64) as i64
    }

    fn reservation(symbols_per_second: u64) -> ReservedPayment {
        ReservedPayment {
            symbols_per_second,
            start_timestamp: START_S,
            end_timestamp: END_S,
            quorum_numbers: vec![0, 1],
            quorum_splits: vec![50, 50],
        }
    }

    fn accountant(symbols_per_second: u64, window: u32, deposit: u128) -> Accountant {
        Accountant::new(
            "04fa1d",
            reservation(symbols_per_second),
            OnDemandDeposit {
                deposited_cumulative: deposit,
            },
            PricingConfig::new(window, 1, 100),
        )
        .unwrap()
    }

    /// Ring states are compared up to cyclic rotation, since the slot an
    /// absolute period lands in depends on the period index modulo the ring
    /// size.
    fn is_rotation(expected: &[u64], actual: &[u64]) -> bool {
        if expected.len() != actual.len() {
            return false;
        }
        let n = expected.len();
        (0..n).any(|shift| (0..n).all(|i| expected[(shift + i) % n] == actual[i]))
    }

    fn assert_ring(accountant: &Accountant, expected: &[u64]) {
        let usages = accountant.reservation_usage().unwrap();
        assert!(
            is_rotation(expected, &usages),
            "expected rotation of {expected:?}, got {usages:?}"
        );
    }

    #[test]
    fn new_accountant_starts_zeroed() {
        let accountant = accountant(100, 6, 500);
        assert_eq!(accountant.account_id(), "04fa1d");
        assert_eq!(accountant.reservation_usage().unwrap(), vec![0, 0, 0]);
        assert_eq!(accountant.spent_cumulative().unwrap(), 0);
        assert_eq!(accountant.on_demand_remaining().unwrap(), 500);
    }

    #[test]
    fn invalid_pricing_is_rejected_at_construction() {
        let err = Accountant::new(
            "04fa1d",
            reservation(100),
            OnDemandDeposit::default(),
            PricingConfig::new(0, 1, 100),
        )
        .unwrap_err();
        assert!(matches!(err, AccountError::State(_)));
    }

    #[test]
    fn reservation_then_overflow_then_on_demand() {
        let accountant = accountant(200, 5, 500);
        let now = nanos(BASE_S);
        let quorums = [0, 1];

        let header = accountant.account_blob(now, 500, &quorums).unwrap();
        assert_eq!(header.cumulative_payment, 0);
        assert_eq!(header.symbol_count_billed, 500);
        assert_ring(&accountant, &[500, 0, 0]);

        let header = accountant.account_blob(now, 700, &quorums).unwrap();
        assert_eq!(header.cumulative_payment, 0);
        assert_ring(&accountant, &[1200, 0, 200]);

        let header = accountant.account_blob(now, 300, &quorums).unwrap();
        assert_eq!(header.cumulative_payment, 300);
        assert_ring(&accountant, &[1200, 0, 200]);
    }

    #[test]
    fn oversized_request_skips_the_reservation() {
        let accountant = accountant(200, 5, 1500);
        let header = accountant
            .account_blob(nanos(BASE_S), 1500, &[0, 1])
            .unwrap();
        assert_eq!(header.cumulative_payment, 1500);
        assert_ring(&accountant, &[0, 0, 0]);
        assert_eq!(accountant.spent_cumulative().unwrap(), 1500);
    }

    #[test]
    fn no_capacity_when_both_modes_refuse() {
        let accountant = Accountant::new(
            "04fa1d",
            ReservedPayment::default(),
            OnDemandDeposit {
                deposited_cumulative: 500,
            },
            PricingConfig::new(60, 100, 100),
        )
        .unwrap();
        let err = accountant
            .account_blob(nanos(BASE_S), 2000, &[0, 1])
            .unwrap_err();
        assert!(matches!(err, AccountError::NoCapacity));
        assert!(err
            .to_string()
            .contains("neither reservation nor on-demand payment is available"));
        // Nothing was committed.
        assert_eq!(accountant.spent_cumulative().unwrap(), 0);
        assert_ring(&accountant, &[0, 0, 0]);
    }

    #[test]
    fn call_series_exhausts_reservation_then_pot() {
        let accountant = accountant(200, 5, 1000);
        let now = nanos(BASE_S);
        let quorums = [0, 1];

        let header = accountant.account_blob(now, 800, &quorums).unwrap();
        assert_eq!(header.cumulative_payment, 0);

        let header = accountant.account_blob(now, 300, &quorums).unwrap();
        assert_eq!(header.cumulative_payment, 0);
        assert_ring(&accountant, &[1100, 0, 100]);

        let header = accountant.account_blob(now, 500, &quorums).unwrap();
        assert_eq!(header.cumulative_payment, 500);

        let err = accountant.account_blob(now, 600, &quorums).unwrap_err();
        assert!(matches!(err, AccountError::NoCapacity));
    }

    #[test]
    fn bins_rotate_as_periods_advance() {
        let accountant = accountant(1000, 1, 1000);
        let quorums = [0, 1];
        let mut now = nanos(BASE_S);

        accountant.account_blob(now, 800, &quorums).unwrap();
        assert_ring(&accountant, &[800, 0, 0]);

        now += NANOS_PER_SECOND;
        accountant.account_blob(now, 300, &quorums).unwrap();
        assert_ring(&accountant, &[800, 300, 0]);

        accountant.account_blob(now, 500, &quorums).unwrap();
        assert_ring(&accountant, &[800, 800, 0]);
    }

    #[test]
    fn one_overflow_per_bin() {
        let accountant = accountant(200, 5, 1000);
        let now = nanos(BASE_S);
        let quorums = [0, 1];

        let header = accountant.account_blob(now, 800, &quorums).unwrap();
        assert_eq!(header.cumulative_payment, 0);
        assert_ring(&accountant, &[800, 0, 0]);

        let header = accountant.account_blob(now, 500, &quorums).unwrap();
        assert_eq!(header.cumulative_payment, 0);
        assert_ring(&accountant, &[1300, 0, 300]);

        // The bin already borrowed once; the next request goes on-demand.
        let header = accountant.account_blob(now, 200, &quorums).unwrap();
        assert_eq!(header.cumulative_payment, 200);
        assert_ring(&accountant, &[1300, 0, 300]);
    }

    #[test]
    fn exactly_full_bin_recovers_after_rotation() {
        let accountant = accountant(1000, 1, 1000);
        let quorums = [0, 1];
        let mut now = nanos(BASE_S);

        accountant.account_blob(now, 1000, &quorums).unwrap();
        assert_ring(&accountant, &[1000, 0, 0]);

        let header = accountant.account_blob(now, 500, &quorums).unwrap();
        assert_eq!(header.cumulative_payment, 500);
        assert_ring(&accountant, &[1000, 0, 0]);

        now += NANOS_PER_SECOND;
        accountant.account_blob(now, 500, &quorums).unwrap();
        assert_ring(&accountant, &[1000, 500, 0]);
    }

    #[test]
    fn concurrent_charges_serialise_under_the_mutex() {
        let accountant = accountant(1000, 1, 1000);
        let now = nanos(BASE_S);
        std::thread::scope(|scope| {
            for _ in 0..10 {
                scope.spawn(|| {
                    accountant.account_blob(now, 100, &[0, 1]).unwrap();
                });
            }
        });
        let usages = accountant.reservation_usage().unwrap();
        assert_eq!(usages.iter().sum::<u64>(), 1000);
        assert_eq!(usages.len(), 3);
        assert_eq!(accountant.spent_cumulative().unwrap(), 0);
    }

    #[test]
    fn empty_quorums_are_rejected_before_any_charge() {
        let accountant = accountant(200, 5, 1000);
        let err = accountant.account_blob(nanos(BASE_S), 100, &[]).unwrap_err();
        assert!(err.to_string().contains("no quorum numbers provided"));
        assert_ring(&accountant, &[0, 0, 0]);
    }

    #[test]
    fn disallowed_quorum_is_reported() {
        let accountant = accountant(200, 5, 1000);
        let err = accountant
            .account_blob(nanos(BASE_S), 100, &[0, 2])
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("provided quorum number 2 not allowed"));
        assert_ring(&accountant, &[0, 0, 0]);
        assert_eq!(accountant.spent_cumulative().unwrap(), 0);
    }

    #[test]
    fn reservation_quorum_mismatch_falls_through_to_on_demand() {
        let mut entitlement = reservation(200);
        entitlement.quorum_numbers = vec![0];
        let accountant = Accountant::new(
            "04fa1d",
            entitlement,
            OnDemandDeposit {
                deposited_cumulative: 1000,
            },
            PricingConfig::new(5, 1, 100),
        )
        .unwrap();
        let header = accountant
            .account_blob(nanos(BASE_S), 100, &[0, 1])
            .unwrap();
        assert_eq!(header.cumulative_payment, 100);
        assert_ring(&accountant, &[0, 0, 0]);
    }

    #[test]
    fn expired_entitlement_charges_on_demand() {
        let accountant = accountant(200, 5, 1000);
        // Before the entitlement window opens.
        let header = accountant
            .account_blob(nanos(START_S - 10), 100, &[0, 1])
            .unwrap();
        assert_eq!(header.cumulative_payment, 100);
        // After it closes.
        let header = accountant
            .account_blob(nanos(END_S + 10), 100, &[0, 1])
            .unwrap();
        assert_eq!(header.cumulative_payment, 200);
        assert_ring(&accountant, &[0, 0, 0]);
    }

    #[test]
    fn on_demand_payments_strictly_increase() {
        let accountant = Accountant::new(
            "04fa1d",
            ReservedPayment::default(),
            OnDemandDeposit {
                deposited_cumulative: 10_000,
            },
            PricingConfig::new(5, 1, 100),
        )
        .unwrap();
        let now = nanos(BASE_S);
        let mut last = 0u128;
        for raw in [100, 1, 250] {
            let header = accountant.account_blob(now, raw, &[0, 1]).unwrap();
            assert!(header.cumulative_payment > last);
            last = header.cumulative_payment;
        }
        assert_eq!(last, 500);
        assert_eq!(accountant.spent_cumulative().unwrap(), 500);
        assert_eq!(accountant.on_demand_remaining().unwrap(), 9_500);
    }

    #[test]
    fn hydration_seeds_the_spent_counter() {
        let mut state = PaymentStateJson::from_parts(
            "04fa1d",
            ReservedPayment::default(),
            OnDemandDeposit {
                deposited_cumulative: 1000,
            },
            PricingConfig::new(5, 1, 100),
        );
        state.spent_cumulative = 400;
        let accountant = Accountant::from_payment_state(state).unwrap();
        assert_eq!(accountant.on_demand_remaining().unwrap(), 600);

        let header = accountant
            .account_blob(nanos(BASE_S), 100, &[0, 1])
            .unwrap();
        assert_eq!(header.cumulative_payment, 500);
    }

    #[test]
    fn insufficient_funds_leaves_the_counter_untouched() {
        let accountant = Accountant::new(
            "04fa1d",
            ReservedPayment::default(),
            OnDemandDeposit {
                deposited_cumulative: 250,
            },
            PricingConfig::new(5, 1, 100),
        )
        .unwrap();
        let now = nanos(BASE_S);
        accountant.account_blob(now, 200, &[0, 1]).unwrap();
        let err = accountant.account_blob(now, 100, &[0, 1]).unwrap_err();
        assert!(matches!(err, AccountError::NoCapacity));
        assert_eq!(accountant.spent_cumulative().unwrap(), 200);
        assert_eq!(accountant.on_demand_remaining().unwrap(), 50);
    }
}
