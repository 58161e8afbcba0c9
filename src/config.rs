//! Build-time configuration.
//!
//! Mirrors the teacher's split between corpus-recommended defaults
//! (`recommended`) and the per-deployment [`Config`] a node is
//! constructed with.

/// Recommended default values, consistent across deployments unless a
/// specific installation has a reason to differ.
pub mod recommended {
    /// Consecutive missed slots before a peer is evicted.
    pub const EVICTION_THRESHOLD: u8 = 5;

    /// Base per-device start-up silence, multiplied by `num_devices`.
    pub const START_UP_DELAY_PER_DEVICE_US: u64 = 100_000;
}

/// Role derived from `our_id`: anchors are placed at known locations
/// and do not re-emit relayed ranges; tags forward observed pairwise
/// ranges for downstream positioning.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Anchor,
    Tag,
}

impl Role {
    /// IDs below 5 are anchors, the rest are tags.
    pub fn from_id(id: u8) -> Role {
        if id < 5 {
            Role::Anchor
        } else {
            Role::Tag
        }
    }

    pub fn is_tag(self) -> bool {
        matches!(self, Role::Tag)
    }
}

/// A reserved peer ID marking end-of-round in `tx_order`. Never
/// assignable to a real node.
pub const DUMMY_ID: u8 = 255;

/// Per-node configuration, constructed once by the embedder at startup.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// This node's identifier (1..=254).
    pub our_id: u8,

    /// Maximum number of peers this node tracks; governs the fixed
    /// storage capacity of the peer table.
    pub num_devices: usize,

    /// Scheduled-transmit lead time, in microseconds: how far in the
    /// future a frame's `t_sent` is placed when handed to the radio, to
    /// give the host time to assemble and program the frame before the
    /// scheduled instant.
    pub delay_time_us: u32,

    /// Base slot timeout, in microseconds, before the expected
    /// transmitter is presumed to have missed its slot. Derived from
    /// preamble length and bit rate rather than hardcoded, via
    /// [`Config::slot_timeout_us`].
    pub delay_until_assumed_lost_us: u64,

    /// Consecutive missed slots before a peer is evicted.
    pub eviction_threshold: u8,

    /// Per-node constant correction applied to every local timestamp
    /// this node reports or consumes, folding TX/RX antenna delay into
    /// the ranging math.
    pub antenna_delay_ticks: i64,
}

impl Config {
    /// Builds a `Config` with the recommended defaults for everything
    /// except `our_id` and `num_devices`, which every deployment must
    /// decide for itself.
    pub fn new(our_id: u8, num_devices: usize) -> Self {
        Config {
            our_id,
            num_devices,
            delay_time_us: Self::default_delay_time_us(num_devices),
            delay_until_assumed_lost_us: Self::default_slot_timeout_us(num_devices),
            eviction_threshold: recommended::EVICTION_THRESHOLD,
            antenna_delay_ticks: 0,
        }
    }

    pub fn role(&self) -> Role {
        Role::from_id(self.our_id)
    }

    /// `NUM_DEVICES * 100ms`, the silent period at boot before entering
    /// the network.
    pub fn start_up_delay_us(&self) -> u64 {
        self.num_devices as u64 * recommended::START_UP_DELAY_PER_DEVICE_US
    }

    /// Slot timeout threshold for a ring of `cur_num_devices` live
    /// peers: `delay_until_assumed_lost_us + cur_num_devices * k`,
    /// where `k` scales with frame time so that a larger ring still
    /// gives a slot reasonable room to complete before being presumed
    /// lost.
    pub fn slot_timeout_us(&self, cur_num_devices: usize) -> u64 {
        self.delay_until_assumed_lost_us + cur_num_devices as u64 * self.frame_time_margin_us()
    }

    /// Per-device margin folded into the slot timeout: one frame's
    /// worth of airtime plus assembly overhead, so that growing the
    /// ring doesn't starve the timeout.
    fn frame_time_margin_us(&self) -> u64 {
        self.delay_time_us as u64 / 4
    }

    /// Derives a default scheduled-transmit lead time from the worst
    /// case frame size (up to `6 + num_devices * 11` bytes) plus fixed
    /// host/radio programming overhead and a safety margin, rather than
    /// a hardcoded constant tuned to one radio mode.
    fn default_delay_time_us(num_devices: usize) -> u32 {
        const PREAMBLE_US: u32 = 1024; // MODE_LONGDATA_RANGE_ACCURACY-class preamble
        const FIXED_OVERHEAD_US: u32 = 600; // SPI/host programming overhead
        const US_PER_BYTE: u32 = 8; // conservative bytes-per-frame factor
        const MARGIN_US: u32 = 400;

        let max_frame_bytes = 6 + num_devices as u32 * 11;
        PREAMBLE_US + FIXED_OVERHEAD_US + max_frame_bytes * US_PER_BYTE + MARGIN_US
    }

    fn default_slot_timeout_us(num_devices: usize) -> u64 {
        // A slot must survive at least one full frame's preamble + body
        // + the scheduled lead time, with margin for scheduling jitter.
        Self::default_delay_time_us(num_devices) as u64 * 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_boundary_at_five() {
        assert_eq!(Role::from_id(1), Role::Anchor);
        assert_eq!(Role::from_id(4), Role::Anchor);
        assert_eq!(Role::from_id(5), Role::Tag);
        assert_eq!(Role::from_id(254), Role::Tag);
    }

    #[test]
    fn start_up_delay_scales_with_device_count() {
        let cfg = Config::new(1, 6);
        assert_eq!(cfg.start_up_delay_us(), 600_000);
    }

    #[test]
    fn slot_timeout_grows_with_ring_size() {
        let cfg = Config::new(1, 6);
        assert!(cfg.slot_timeout_us(6) > cfg.slot_timeout_us(2));
    }
}
