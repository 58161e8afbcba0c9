//! Radio driver contract and interrupt flag plumbing.
//!
//! The UWB radio itself is an external collaborator, out of scope for
//! this crate: this module only names the interface [`crate::node`]
//! depends on, grounded on the teacher's own minimal `Radio` trait
//! (`device.rs`: `eui`, `recv_enable`) generalized to a
//! scheduled-transmission, timestamp-query contract.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::timestamp::Ticks;

/// Transient radio-level failures: always logged and discarded, never
/// propagated past the main loop.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// The hardware-error interrupt fired.
    Hardware,
    /// The receive-failed interrupt fired (e.g. a CRC or PHY header
    /// error on an incoming frame).
    ReceiveFailed,
}

/// The driver contract this crate consumes. Implemented by a board
/// support crate; never implemented here.
pub trait Radio {
    /// Configures this node's device address and network ID.
    fn configure(&mut self, device_id: u8, network_id: u16) -> Result<(), RadioError>;

    /// Puts the radio into receive-permanently mode: it keeps listening
    /// without per-frame re-arming.
    fn start_receiving(&mut self) -> Result<(), RadioError>;

    /// Copies the most recently received frame into `buf`, returning
    /// its length. Returns `None` if no frame is currently buffered.
    fn take_received(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// The 40-bit tick timestamp the most recently received frame was
    /// captured at, aligned with transmit timestamps.
    fn rx_timestamp(&self) -> Ticks;

    /// Schedules transmission of `frame` after `delay_us` microseconds
    /// and returns the absolute send timestamp the radio committed to,
    /// so the caller can patch it into the frame header before it goes
    /// out.
    fn schedule_send(&mut self, frame: &[u8], delay_us: u32) -> Result<Ticks, RadioError>;
}

/// One-bit flags set by interrupt handlers and drained by the main
/// loop. Reads/clears use `SeqCst`: these fire at most a few times per
/// slot, far from any hot path, so there's no reason to reach for a
/// weaker ordering.
pub struct InterruptFlags {
    received: AtomicBool,
    sent: AtomicBool,
    error: AtomicBool,
    receive_failed: AtomicBool,
}

impl Default for InterruptFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptFlags {
    pub const fn new() -> Self {
        InterruptFlags {
            received: AtomicBool::new(false),
            sent: AtomicBool::new(false),
            error: AtomicBool::new(false),
            receive_failed: AtomicBool::new(false),
        }
    }

    /// Called from the receive-complete ISR.
    pub fn set_received(&self) {
        self.received.store(true, Ordering::SeqCst);
    }

    /// Called from the send-complete ISR.
    pub fn set_sent(&self) {
        self.sent.store(true, Ordering::SeqCst);
    }

    /// Called from the hardware-error ISR.
    pub fn set_error(&self) {
        self.error.store(true, Ordering::SeqCst);
    }

    /// Called from the receive-failed ISR.
    pub fn set_receive_failed(&self) {
        self.receive_failed.store(true, Ordering::SeqCst);
    }

    /// Atomically reads and clears the receive-complete flag.
    pub fn take_received(&self) -> bool {
        self.received.swap(false, Ordering::SeqCst)
    }

    /// Atomically reads and clears the send-complete flag.
    pub fn take_sent(&self) -> bool {
        self.sent.swap(false, Ordering::SeqCst)
    }

    /// Atomically reads and clears the hardware-error flag.
    pub fn take_error(&self) -> bool {
        self.error.swap(false, Ordering::SeqCst)
    }

    /// Atomically reads and clears the receive-failed flag.
    pub fn take_receive_failed(&self) -> bool {
        self.receive_failed.swap(false, Ordering::SeqCst)
    }

    /// Unconditionally clears the receive-complete flag, discarding any
    /// reception that raced with it. Called right after handing a
    /// frame off for scheduled transmission, since the shared frame
    /// buffer means such a reception may already be corrupted.
    pub fn clear_received(&self) {
        self.received.store(false, Ordering::SeqCst);
    }
}
