//! Error taxonomy.
//!
//! Nothing in this crate panics outside of tests. Every fallible
//! operation returns one of these small, non-allocating enums, in the
//! style of the teacher's `PhyPayloadDecodeError` / `JoinRequestParseError`.
//! None of these are meant to be propagated past the main loop; they
//! exist so the caller can log and move on.

/// Frame codec parse failures.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameParseError {
    /// Frame shorter than the 6-byte minimum header.
    TooShort { have: usize, need: usize },
    /// The per-peer report section isn't a whole number of 11-byte
    /// tuples.
    TruncatedReport { remaining: usize },
}

/// Frame codec serialize failures.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncodeError {
    /// The caller-owned buffer is smaller than the encoded frame.
    BufferTooSmall { have: usize, need: usize },
}

/// Peer-table mutation failures.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// The table already holds `num_devices` peers; logged and
    /// ignored, frame dropped without mutating `tx_order`.
    TableFull,
    /// The sender's ID collides with our own: a frame cannot be
    /// addressed from a peer sharing our ID.
    SelfLoopback,
}

/// Non-fatal inconsistencies in the MAC state machine that are logged
/// but never halt processing.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacFault {
    /// `expected_tx_idx` pointed at an ID with no peer-table entry.
    UnknownExpectedTransmitter { id: u8 },
    /// A received frame claimed our own ID as sender.
    SelfLoopback,
}
