//! Distributed token-passing MAC.
//!
//! A software TDMA layer: nodes transmit in strictly ascending ID order
//! around a shared `tx_order` ring terminated by the sentinel
//! [`crate::config::DUMMY_ID`], with no central coordinator and no
//! explicit tokens. The "turn" is implicit in `expected_tx_idx`, which
//! every node advances by observing the air.
//!
//! Timers here are plain microsecond counts; the radio's hardware
//! clock (40-bit tick timestamps used for ranging) is a separate axis
//! handled by [`crate::timestamp`] and the [`crate::radio::Radio`]
//! trait.

use heapless::Vec;

use crate::config::{Config, DUMMY_ID};
use crate::error::MacFault;
use crate::peer::PeerTable;

/// The local node's lifecycle state.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// First `NUM_DEVICES * 100ms` of life: stay silent to avoid
    /// jamming.
    StartUp,
    /// Listening; waiting to identify the round boundary.
    EnteringNetwork,
    /// Steady state: transmit whenever it's our slot.
    InTheRound,
}

/// What the caller should do as a result of polling the MAC layer.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do this tick.
    None,
    /// It's our slot (or we're joining for the first time): assemble
    /// and hand off a frame for scheduled transmission.
    Transmit,
}

/// The token-passing MAC state machine for one node.
///
/// `R` is the maximum `tx_order` ring capacity: at most
/// `NUM_DEVICES + 2` entries (every peer, plus our own ID once joined,
/// plus the sentinel).
pub struct Mac<const R: usize> {
    state: LifecycleState,
    tx_order: Vec<u8, R>,
    expected_tx_idx: usize,
    took_turn: bool,
    tx_timer_start_us: u64,
    our_id: u8,
}

impl<const R: usize> Mac<R> {
    /// Builds a fresh MAC state machine. `boot_us` is the host clock
    /// reading at construction time, used to time the `START_UP`
    /// silence period.
    pub fn new(our_id: u8, boot_us: u64) -> Self {
        let mut tx_order = Vec::new();
        let _ = tx_order.push(DUMMY_ID);
        Mac {
            state: LifecycleState::StartUp,
            tx_order,
            expected_tx_idx: 0,
            took_turn: false,
            tx_timer_start_us: boot_us,
            our_id,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn tx_order(&self) -> &[u8] {
        &self.tx_order
    }

    pub fn expected_tx_idx(&self) -> usize {
        self.expected_tx_idx
    }

    /// Advances `START_UP` to `ENTERING_NETWORK` once the silent period
    /// has elapsed. Call once per main-loop iteration before
    /// [`Mac::poll_transmit`].
    pub fn poll_lifecycle(&mut self, now_us: u64, boot_us: u64, cfg: &Config) {
        if self.state == LifecycleState::StartUp
            && now_us.wrapping_sub(boot_us) >= cfg.start_up_delay_us()
        {
            self.state = LifecycleState::EnteringNetwork;
        }
    }

    /// Decides whether to transmit this tick, driving the
    /// `ENTERING_NETWORK -> IN_THE_ROUND` join transition when the
    /// round boundary is observed.
    pub fn poll_transmit(&mut self) -> Action {
        match self.state {
            LifecycleState::StartUp => Action::None,
            LifecycleState::EnteringNetwork => {
                if self.tx_order.get(self.expected_tx_idx) == Some(&DUMMY_ID) {
                    if insert_sorted(&mut self.tx_order, self.our_id).is_ok() {
                        self.expected_tx_idx = self.tx_order.len() - 1;
                    }
                    self.state = LifecycleState::InTheRound;
                    Action::Transmit
                } else {
                    Action::None
                }
            }
            LifecycleState::InTheRound => {
                if !self.took_turn && self.tx_order.get(self.expected_tx_idx) == Some(&self.our_id)
                {
                    Action::Transmit
                } else {
                    Action::None
                }
            }
        }
    }

    /// Marks that we've claimed this slot; call immediately after
    /// handing a frame off for scheduled transmission, before the send
    /// completes.
    pub fn mark_took_turn(&mut self) {
        self.took_turn = true;
    }

    /// Whether inbound processing should be suppressed this tick,
    /// because we've claimed the current slot and outbound frame
    /// assembly may be sharing the receive buffer.
    pub fn suppress_receive(&self) -> bool {
        self.took_turn
    }

    /// Updates the ring on receiving a frame from `sender_id`.
    ///
    /// `is_new_peer` must reflect whether the peer table already held
    /// an entry for this sender *before* this frame was processed.
    /// `now_us_before_parse` must be captured before the frame is
    /// decoded, since decoding consumes budget that belongs to the
    /// next slot.
    pub fn on_receive(&mut self, sender_id: u8, is_new_peer: bool, now_us_before_parse: u64) {
        if is_new_peer {
            if insert_sorted(&mut self.tx_order, sender_id).is_ok() {
                self.expected_tx_idx = self.tx_order.len() - 1;
            }
        } else if let Some(idx) = self.tx_order.iter().position(|&id| id == sender_id) {
            self.expected_tx_idx = (idx + 1) % self.tx_order.len();
            self.tx_timer_start_us = now_us_before_parse;
        }
    }

    /// Updates the ring on send completion.
    pub fn on_send_complete(&mut self, now_us: u64) {
        let was_our_slot = self.tx_order.get(self.expected_tx_idx) == Some(&self.our_id);
        self.took_turn = false;
        self.tx_timer_start_us = now_us;
        if was_our_slot {
            self.expected_tx_idx = (self.expected_tx_idx + 1) % self.tx_order.len();
        }
    }

    /// Checks the slot timeout and evicts the expected transmitter if
    /// it has exceeded the eviction threshold. Returns the evicted
    /// peer ID, if any; returns a [`MacFault`] (never a panic) if
    /// `tx_order` and the peer table have diverged.
    pub fn check_slot_timeout<const N: usize>(
        &mut self,
        now_us: u64,
        cfg: &Config,
        peers: &mut PeerTable<N>,
    ) -> Result<Option<u8>, MacFault> {
        let timeout = cfg.slot_timeout_us(peers.len());
        if now_us.wrapping_sub(self.tx_timer_start_us) <= timeout {
            return Ok(None);
        }

        let expected_id = match self.tx_order.get(self.expected_tx_idx) {
            Some(&id) => id,
            None => return Ok(None),
        };

        self.tx_timer_start_us = now_us;
        self.took_turn = false;

        if expected_id == DUMMY_ID || expected_id == self.our_id {
            // The ring and our own transmit bookkeeping disagree about
            // whose turn it is; there's nobody to time out here.
            self.expected_tx_idx = (self.expected_tx_idx + 1) % self.tx_order.len();
            return Ok(None);
        }

        let missed = match peers.get(expected_id) {
            Some(peer) => peer.missed + 1,
            None => return Err(MacFault::UnknownExpectedTransmitter { id: expected_id }),
        };

        if missed > cfg.eviction_threshold {
            peers.evict(expected_id);
            remove_ordered(&mut self.tx_order, expected_id);
            Ok(Some(expected_id))
        } else {
            peers.set_missed(expected_id, missed);
            self.expected_tx_idx = (self.expected_tx_idx + 1) % self.tx_order.len();
            Ok(None)
        }
    }

    /// Checks the ring invariants that must hold after every main-loop
    /// iteration. Intended for tests and debug assertions, not the hot
    /// path.
    pub fn invariants_hold<const N: usize>(&self, peers: &PeerTable<N>) -> bool {
        let sorted = self
            .tx_order
            .windows(2)
            .all(|w| w[0] < w[1] || (w[0] != DUMMY_ID && w[1] == DUMMY_ID));
        let one_sentinel = self.tx_order.iter().filter(|&&id| id == DUMMY_ID).count() == 1;
        let ends_in_sentinel = self.tx_order.last() == Some(&DUMMY_ID);
        let has_own_id = self.tx_order.contains(&self.our_id);
        let own_id_iff_in_round = has_own_id == (self.state == LifecycleState::InTheRound);

        let expected_len =
            peers.len() + 1 + usize::from(self.state == LifecycleState::InTheRound);
        let len_matches = self.tx_order.len() == expected_len;

        let every_ring_id_has_peer = self
            .tx_order
            .iter()
            .all(|&id| id == DUMMY_ID || id == self.our_id || peers.get(id).is_some());
        let every_peer_in_ring = peers.iter().all(|p| self.tx_order.contains(&p.id));

        let idx_in_bounds = self.expected_tx_idx < self.tx_order.len();

        sorted
            && one_sentinel
            && ends_in_sentinel
            && own_id_iff_in_round
            && len_matches
            && every_ring_id_has_peer
            && every_peer_in_ring
            && idx_in_bounds
    }
}

/// Inserts `id` into `tx_order` at its sorted position, ahead of the
/// sentinel, returning its index. Fails if the ring is at capacity.
fn insert_sorted<const R: usize>(tx_order: &mut Vec<u8, R>, id: u8) -> Result<usize, ()> {
    let pos = tx_order
        .iter()
        .position(|&x| x == DUMMY_ID || x > id)
        .unwrap_or(tx_order.len());

    tx_order.push(0).map_err(|_| ())?;
    let mut i = tx_order.len() - 1;
    while i > pos {
        tx_order[i] = tx_order[i - 1];
        i -= 1;
    }
    tx_order[pos] = id;
    Ok(pos)
}

/// Removes `id` from `tx_order`, shifting subsequent entries down to
/// preserve sort order (unlike the peer table's swap-remove, the ring's
/// order is load-bearing).
fn remove_ordered<const R: usize>(tx_order: &mut Vec<u8, R>, id: u8) -> Option<usize> {
    let pos = tx_order.iter().position(|&x| x == id)?;
    for i in pos..tx_order.len() - 1 {
        tx_order[i] = tx_order[i + 1];
    }
    tx_order.pop();
    Some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerTable;
    use crate::timestamp::Ticks;

    const R: usize = 8;

    #[test]
    fn starts_silent_then_enters_network() {
        let cfg = Config::new(1, 6);
        let mut mac: Mac<R> = Mac::new(1, 0);
        assert_eq!(mac.state(), LifecycleState::StartUp);
        mac.poll_lifecycle(cfg.start_up_delay_us() - 1, 0, &cfg);
        assert_eq!(mac.state(), LifecycleState::StartUp);
        mac.poll_lifecycle(cfg.start_up_delay_us(), 0, &cfg);
        assert_eq!(mac.state(), LifecycleState::EnteringNetwork);
    }

    #[test]
    fn joins_on_round_boundary_and_points_at_sentinel() {
        let mut mac: Mac<R> = Mac::new(5, 0);
        mac.state = LifecycleState::EnteringNetwork;
        // Ring already has peers 1..4 and a trailing sentinel; the
        // observed boundary is expected_tx_idx pointing at DUMMY_ID.
        for id in [1, 2, 3, 4] {
            assert!(insert_sorted(&mut mac.tx_order, id).is_ok());
        }
        mac.expected_tx_idx = mac.tx_order.len() - 1;
        assert_eq!(mac.tx_order(), &[1, 2, 3, 4, DUMMY_ID]);

        let action = mac.poll_transmit();
        assert_eq!(action, Action::Transmit);
        assert_eq!(mac.state(), LifecycleState::InTheRound);
        assert_eq!(mac.tx_order(), &[1, 2, 3, 4, 5, DUMMY_ID]);
        assert_eq!(mac.expected_tx_idx(), mac.tx_order().len() - 1);
    }

    #[test]
    fn new_peer_receive_points_expected_idx_at_sentinel() {
        let mut mac: Mac<R> = Mac::new(1, 0);
        mac.state = LifecycleState::InTheRound;
        insert_sorted(&mut mac.tx_order, 1).unwrap();
        mac.on_receive(2, true, 100);
        assert_eq!(mac.tx_order(), &[1, 2, DUMMY_ID]);
        assert_eq!(mac.expected_tx_idx(), 2);
    }

    #[test]
    fn known_peer_receive_advances_past_sender() {
        let mut mac: Mac<R> = Mac::new(1, 0);
        for id in [1, 2, 3] {
            insert_sorted(&mut mac.tx_order, id).unwrap();
        }
        mac.on_receive(2, false, 100);
        assert_eq!(mac.expected_tx_idx(), 2); // index of 3
    }

    #[test]
    fn slot_timeout_evicts_after_threshold() {
        let cfg = Config::new(1, 6);
        let mut mac: Mac<R> = Mac::new(1, 0);
        let mut peers: PeerTable<6> = PeerTable::new();
        peers
            .observe_frame(1, 3, Ticks::ZERO, Ticks::ZERO, core::iter::empty())
            .unwrap();
        insert_sorted(&mut mac.tx_order, 1).unwrap();
        insert_sorted(&mut mac.tx_order, 3).unwrap();

        let timeout_instant = cfg.slot_timeout_us(1) + 1;
        let mut evicted = None;
        // Re-point expected_tx_idx at peer 3 before each check: this test
        // isolates the missed-count/eviction logic from ring traversal,
        // which is covered separately.
        for _ in 0..=cfg.eviction_threshold {
            mac.expected_tx_idx = mac.tx_order.iter().position(|&x| x == 3).unwrap();
            mac.tx_timer_start_us = 0;
            evicted = mac
                .check_slot_timeout(timeout_instant, &cfg, &mut peers)
                .unwrap();
            if evicted.is_some() {
                break;
            }
        }
        assert_eq!(evicted, Some(3));
        assert!(peers.get(3).is_none());
        assert!(!mac.tx_order().contains(&3));
    }

    #[test]
    fn tx_order_removal_preserves_sort_order() {
        let mut v: Vec<u8, R> = Vec::new();
        for id in [1, 2, 3, 4, DUMMY_ID] {
            v.push(id).unwrap();
        }
        remove_ordered(&mut v, 2);
        assert_eq!(v.as_slice(), &[1, 3, 4, DUMMY_ID]);
    }
}
