//! DS-TWR time-of-flight computation.
//!
//! A pure function over the six timestamps of the current and previous
//! exchange between this node and one peer. No state lives here; the
//! peer table in [`crate::peer`] owns the timestamps and calls into
//! this module once per successful counter-protocol exchange.

use crate::timestamp::{Ticks, SPEED_OF_LIGHT_M_PER_S};

/// Lower bound of the physically plausible range window, meters.
pub const RANGE_MIN_M: f32 = -10.0;

/// Upper bound (exclusive) of the physically plausible range window.
pub const RANGE_MAX_M: f32 = 1000.0;

/// The six timestamps needed for one DS-TWR computation, named exactly
/// as in the peer-record field table.
#[derive(Debug, Clone, Copy)]
pub struct Exchange {
    pub t_device_prev_sent: Ticks,
    pub t_prev_received: Ticks,
    pub t_sent: Ticks,
    pub t_device_received: Ticks,
    pub t_device_sent: Ticks,
    pub t_received: Ticks,
}

/// Computes the range for one exchange, applying the sanity gate:
/// `round1 > reply1 && round2 > reply2`, and the result in
/// `[RANGE_MIN_M, RANGE_MAX_M)`. Returns `None` if either check fails.
/// See DESIGN.md for why both checks are kept.
pub fn compute_range_m(exchange: &Exchange) -> Option<f32> {
    let round1 = (exchange.t_device_received - exchange.t_device_prev_sent).raw();
    let reply1 = (exchange.t_sent - exchange.t_prev_received).raw();
    let round2 = (exchange.t_received - exchange.t_sent).raw();
    let reply2 = (exchange.t_device_sent - exchange.t_device_received).raw();

    if !(round1 > reply1 && round2 > reply2) {
        return None;
    }

    let numerator = (round1 as i128) * (round2 as i128) - (reply1 as i128) * (reply2 as i128);
    let denominator = round1 as i128 + round2 as i128 + reply1 as i128 + reply2 as i128;
    if denominator == 0 {
        return None;
    }
    let tof_ticks = numerator / denominator;

    let range_m = tof_ticks as f64 * crate::timestamp::TICK_PERIOD_SECONDS * SPEED_OF_LIGHT_M_PER_S;
    let range_m = range_m as f32;

    if range_m >= RANGE_MIN_M && range_m < RANGE_MAX_M {
        Some(range_m)
    } else {
        None
    }
}
