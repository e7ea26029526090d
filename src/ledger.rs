//! Reservation usage ledger: a fixed ring of period bins with one-shot
//! overflow into the bin two periods ahead.
//!
//! Slot `k` of the ring holds the record for absolute period `i` iff
//! `i % num_bins == k`, so bins rotate in place and stale records are reset
//! lazily on first access for a newer index. No background rotator runs. The
//! ring needs at least three slots so that *current*, *previous* (index −1)
//! and *overflow* (index +2) never alias.

/// Usage record for one absolute reservation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodRecord {
    /// Absolute period index this slot currently represents.
    pub index: u64,
    /// Billable symbols already charged against this period.
    pub usage: u64,
}

/// Fixed-size ring of [`PeriodRecord`]s implementing the reservation ledger.
///
/// A record whose `usage` exceeds the bin limit marks a period that exercised
/// its one-time borrow from a later bin; while visible as the *previous*
/// record it forbids the next period from borrowing again.
#[derive(Debug, Clone)]
pub struct PeriodLedger {
    records: Vec<PeriodRecord>,
}

impl PeriodLedger {
    /// Creates a ledger of `num_bins` zeroed records, slot `k` seeded with
    /// index `k`.
    pub fn new(num_bins: u32) -> Self {
        let records = (0..u64::from(num_bins))
            .map(|index| PeriodRecord { index, usage: 0 })
            .collect();
        Self { records }
    }

    /// Number of slots in the ring; constant for the ledger's lifetime.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Usage recorded for `period`, without rotating the slot.
    ///
    /// Returns zero when the slot currently holds a different index, so idle
    /// gaps read as unused periods.
    pub fn usage(&self, period: u64) -> u64 {
        let record = &self.records[self.slot(period)];
        if record.index == period {
            record.usage
        } else {
            0
        }
    }

    /// Snapshot of per-slot usages in ring order.
    pub fn usages(&self) -> Vec<u64> {
        self.records.iter().map(|record| record.usage).collect()
    }

    /// Attempts to charge `billable` symbols against `period`.
    ///
    /// Charges that fit the bin's remaining room always commit. A charge that
    /// does not fit may still commit by borrowing the shortfall from the bin
    /// two periods ahead, provided the previous bin did not itself borrow,
    /// the current bin is not already at its limit, and the charge alone
    /// would fit an empty bin. Returns `false` without mutating any usage
    /// when the reservation cannot absorb the request.
    pub fn charge(&mut self, period: u64, billable: u64, bin_limit: u64) -> bool {
        let prev_usage = period
            .checked_sub(1)
            .map(|prev| self.usage(prev))
            .unwrap_or(0);
        let current_usage = self.record_mut(period).usage;
        let room = bin_limit.saturating_sub(current_usage);
        if billable <= room {
            self.record_mut(period).usage += billable;
            return true;
        }
        if prev_usage > bin_limit || current_usage >= bin_limit || billable > bin_limit {
            return false;
        }
        let spill = billable - room;
        self.record_mut(period).usage += billable;
        self.record_mut(period + 2).usage += spill;
        true
    }

    fn slot(&self, period: u64) -> usize {
        (period % self.records.len() as u64) as usize
    }

    /// Slot for `period`, reset in place when it still holds an older index.
    fn record_mut(&mut self, period: u64) -> &mut PeriodRecord {
        let slot = self.slot(period);
        let record = &mut self.records[slot];
        if record.index != period {
            *record = PeriodRecord { index: period, usage: 0 };
        }
        record
    }
}
