//! 40-bit wrap-aware radio timestamps.
//!
//! The UWB radio's timer is a 40-bit free-running counter clocked at
//! 499.2 MHz * 128, giving a tick period of roughly 15.65 ps. [`Ticks`]
//! wraps that counter and provides the modular arithmetic the ranging
//! engine needs without ever reasoning about the wraparound itself.

use core::ops::{Add, Div, Mul, Sub};

/// Mask selecting the low 40 bits of a `u64`.
const MASK_40: u64 = (1u64 << 40) - 1;

/// Tick period of the radio clock, in seconds.
pub const TICK_PERIOD_SECONDS: f64 = 1.0 / (499.2e6 * 128.0);

/// Speed of light, m/s.
pub const SPEED_OF_LIGHT_M_PER_S: f64 = 299_792_458.0;

/// Unit a raw count may be expressed in when constructing a [`Ticks`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Ticks,
    Micros,
    Millis,
}

/// An opaque 40-bit count of radio ticks.
///
/// All arithmetic wraps modulo 2^40. Construction from a raw value masks
/// off any bits above bit 39; there is no way to observe bits 40..64.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Ticks(u64);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    /// Builds a timestamp from a raw 5-byte little-endian buffer, as
    /// transmitted on the wire.
    pub fn from_le_bytes(bytes: [u8; 5]) -> Self {
        let mut buf = [0u8; 8];
        buf[..5].copy_from_slice(&bytes);
        Ticks(u64::from_le_bytes(buf) & MASK_40)
    }

    /// Serializes into a 5-byte little-endian buffer preserving the low
    /// 40 bits.
    pub fn to_le_bytes(self) -> [u8; 5] {
        let buf = self.0.to_le_bytes();
        [buf[0], buf[1], buf[2], buf[3], buf[4]]
    }

    /// Builds a timestamp from a count expressed in the given unit.
    pub fn from_count(count: u64, unit: Unit) -> Self {
        let ticks = match unit {
            Unit::Ticks => count,
            Unit::Micros => {
                // ticks = count_us * 1e-6 / tick_period
                let ticks_per_us = 1e-6 / TICK_PERIOD_SECONDS;
                (count as f64 * ticks_per_us) as u64
            }
            Unit::Millis => {
                let ticks_per_ms = 1e-3 / TICK_PERIOD_SECONDS;
                (count as f64 * ticks_per_ms) as u64
            }
        };
        Ticks(ticks & MASK_40)
    }

    /// Raw 40-bit value, for debugging / logging only.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Normalizes a signed tick difference into `[0, 2^40)`.
    ///
    /// Used whenever the DS-TWR math subtracts two timestamps that may
    /// have wrapped across the 40-bit boundary between observation and
    /// use.
    pub fn wrap(diff: i64) -> u64 {
        (diff.rem_euclid(1i64 << 40)) as u64
    }

    /// Converts a tick count into meters via `ticks * tick_period * c`.
    pub fn as_meters(self) -> f64 {
        self.0 as f64 * TICK_PERIOD_SECONDS * SPEED_OF_LIGHT_M_PER_S
    }
}

impl Add for Ticks {
    type Output = Ticks;
    fn add(self, rhs: Ticks) -> Ticks {
        Ticks((self.0 + rhs.0) & MASK_40)
    }
}

impl Sub for Ticks {
    type Output = Ticks;
    /// Modular subtraction in 40-bit space. For a subtraction that may
    /// be negative in the "true" timeline (the minuend logically
    /// precedes the subtrahend), use [`Ticks::wrap`] on the signed
    /// difference instead, which this impl delegates to.
    fn sub(self, rhs: Ticks) -> Ticks {
        let diff = self.0 as i64 - rhs.0 as i64;
        Ticks(Ticks::wrap(diff))
    }
}

impl Mul<u64> for Ticks {
    type Output = Ticks;
    /// Multiplication in 64-bit intermediate space, masked back to 40
    /// bits. Overflow of the 64-bit intermediate is the caller's
    /// responsibility to avoid (operands here are always sub-2^40
    /// tick counts, so the product fits comfortably).
    fn mul(self, rhs: u64) -> Ticks {
        Ticks((self.0 * rhs) & MASK_40)
    }
}

impl Div<u64> for Ticks {
    type Output = Ticks;
    /// Division rounds toward zero (Rust's native integer division
    /// semantics). Dividing by zero is undefined behavior on the
    /// caller's part.
    fn div(self, rhs: u64) -> Ticks {
        Ticks(self.0 / rhs)
    }
}
