//! Metering formulas shared by the client accountant and the disperser's
//! server-side meterer.
//!
//! Both sides evaluate these exact functions so that period indices and
//! billable symbol counts agree without any bin numbers being exchanged on
//! the wire. Divergence on either causes the disperser to reject the
//! request, so everything here is integer arithmetic only.

/// Nanoseconds per second, for timestamp conversions.
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Maps a second-precision Unix timestamp to its reservation-period index.
///
/// The bin boundary falls every `window_seconds` of wall time counted from
/// epoch zero, so the index is plain integer division. A zero window yields
/// period zero; [`crate::PricingConfig::validate`] rejects such configs
/// before an accountant is built.
pub fn reservation_period(timestamp_s: u64, window_seconds: u32) -> u64 {
    if window_seconds == 0 {
        return 0;
    }
    timestamp_s / u64::from(window_seconds)
}

/// Maps a nanosecond Unix timestamp to its reservation-period index.
///
/// Agrees with [`reservation_period`] for every instant: the timestamp is
/// truncated to whole seconds first, then divided by the window.
pub fn reservation_period_from_nanos(timestamp_ns: i64, window_seconds: u32) -> u64 {
    let seconds = if timestamp_ns <= 0 {
        0
    } else {
        (timestamp_ns / NANOS_PER_SECOND) as u64
    };
    reservation_period(seconds, window_seconds)
}

/// Rounds a raw symbol length up to the billable count.
///
/// The result is `max(raw_symbols, min_symbols)` rounded up to the nearest
/// multiple of `min_symbols`, performed exactly once per request before any
/// charging decision.
///
/// ```
/// use meridian_pay::meter::billable_symbols;
///
/// assert_eq!(billable_symbols(0, 100), 100);
/// assert_eq!(billable_symbols(101, 100), 200);
/// assert_eq!(billable_symbols(500, 100), 500);
/// ```
pub fn billable_symbols(raw_symbols: u32, min_symbols: u32) -> u64 {
    if min_symbols == 0 {
        return u64::from(raw_symbols);
    }
    let quantum = u64::from(min_symbols);
    let raw = u64::from(raw_symbols.max(min_symbols));
    (raw + quantum - 1) / quantum * quantum
}

/// Cost of a billable symbol count against the on-demand pot.
pub fn on_demand_increment(billable_symbols: u64, price_per_symbol: u64) -> u128 {
    u128::from(billable_symbols) * u128::from(price_per_symbol)
}

/// Per-bin reservation capacity: `symbols_per_second * window_seconds`.
pub fn bin_limit(symbols_per_second: u64, window_seconds: u32) -> u64 {
    symbols_per_second.saturating_mul(u64::from(window_seconds))
}
