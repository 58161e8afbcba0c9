//! Peer table and ranging engine.
//!
//! Owns the per-peer timestamp bookkeeping, runs the shared counter
//! protocol, and calls into [`crate::ranging`] once an exchange is
//! consistent enough to trust. No heap: `PeerTable` is backed by a
//! fixed-capacity `heapless::Vec`, mirroring the teacher's array-backed
//! approach to bounded collections.

use heapless::Vec;

use crate::error::JoinError;
use crate::frame::Report;
use crate::ranging::{self, Exchange};
use crate::timestamp::Ticks;

/// Holds the full DS-TWR state for one neighbor.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct Peer {
    pub id: u8,
    pub tx_count: u8,
    pub missed: u8,
    pub has_replied: bool,

    pub t_device_prev_sent: Ticks,
    pub t_prev_received: Ticks,

    pub t_sent: Ticks,
    pub t_device_received: Ticks,
    pub t_device_sent: Ticks,
    pub t_received: Ticks,

    pub last_range_m: f32,
}

impl Peer {
    fn new(id: u8) -> Self {
        Peer {
            id,
            tx_count: 1,
            missed: 0,
            has_replied: false,
            t_device_prev_sent: Ticks::ZERO,
            t_prev_received: Ticks::ZERO,
            t_sent: Ticks::ZERO,
            t_device_received: Ticks::ZERO,
            t_device_sent: Ticks::ZERO,
            t_received: Ticks::ZERO,
            last_range_m: 0.0,
        }
    }

    fn exchange(&self) -> Exchange {
        Exchange {
            t_device_prev_sent: self.t_device_prev_sent,
            t_prev_received: self.t_prev_received,
            t_sent: self.t_sent,
            t_device_received: self.t_device_received,
            t_device_sent: self.t_device_sent,
            t_received: self.t_received,
        }
    }

    /// Runs the counter protocol for one report addressed to us from
    /// this peer, updating our bookkeeping and returning a range if the
    /// exchange resolved as consistent and sane.
    ///
    /// `their_send_ts` / `our_recv_ts` are this exchange's locally- and
    /// peer-observed timestamps (`t_device_sent`, `t_received`);
    /// `report` is the tuple this peer addressed to us, carrying their
    /// view of our last counter (`c_their`) and their last receive time
    /// from us (`t_device_received`).
    fn observe_report(&mut self, their_send_ts: Ticks, our_recv_ts: Ticks, report: &Report) -> Option<f32> {
        self.t_device_sent = their_send_ts;
        self.t_received = our_recv_ts;
        self.t_device_received = report.last_recv_ts;

        let c_their = report.tx_count;
        let mut range = None;

        if c_their == 0 {
            // Peer is signalling a desync; reset and skip ranging.
            self.tx_count = 1;
        } else if c_their == self.tx_count {
            if self.tx_count > 1 {
                range = ranging::compute_range_m(&self.exchange());
                if let Some(r) = range {
                    self.last_range_m = r;
                }
            }
            self.tx_count = self.tx_count.wrapping_add(1);
        } else {
            // Counters diverged; signal desync on our next transmission.
            self.tx_count = 0;
        }

        // Unconditionally prime the next cycle.
        self.t_device_prev_sent = self.t_device_sent;
        self.t_prev_received = self.t_received;

        range
    }
}

/// Outcome of [`PeerTable::observe_frame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeUpdate {
    pub peer_id: u8,
    pub meters: f32,
}

/// Result of processing one received frame against the peer table.
#[derive(Debug, Default)]
pub struct ObserveOutcome {
    /// Set if the sender had no prior entry and one was allocated.
    pub is_new_peer: bool,
    /// Ranges computed locally against the sender this cycle (normally
    /// at most one, since a sender addresses at most one report to us,
    /// but the wire format doesn't forbid duplicates).
    pub ranges: Vec<RangeUpdate, 4>,
}

/// Fixed-capacity mapping from peer ID to per-peer ranging state.
///
/// `N` is `NUM_DEVICES`: the maximum number of peers this node ever
/// tracks, fixed at compile time so storage never allocates.
pub struct PeerTable<const N: usize> {
    peers: Vec<Peer, N>,
}

impl<const N: usize> Default for PeerTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PeerTable<N> {
    pub fn new() -> Self {
        PeerTable { peers: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn get(&self, id: u8) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == id)
    }

    /// Sets the consecutive-missed-slot counter for a peer, used by the
    /// MAC layer's slot-timeout handling.
    pub fn set_missed(&mut self, id: u8, missed: u8) {
        if let Some(idx) = self.find_index(id) {
            self.peers[idx].missed = missed;
        }
    }

    fn find_index(&self, id: u8) -> Option<usize> {
        self.peers.iter().position(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    /// Removes a peer by ID, compacting by swapping the last entry into
    /// the vacated slot. Returns whether a peer was actually removed.
    pub fn evict(&mut self, id: u8) -> bool {
        match self.find_index(id) {
            Some(idx) => {
                self.peers.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Updates the sender's record for one received frame.
    ///
    /// Allocates a new record if the sender is unseen, failing silently
    /// (returning `Err(JoinError::TableFull)`) if the table has no
    /// spare capacity. The caller is expected to log and discard, not
    /// propagate. `our_id` is used to pick out the report (if any)
    /// addressed to us from `reports`.
    pub fn observe_frame(
        &mut self,
        our_id: u8,
        sender_id: u8,
        their_send_ts: Ticks,
        our_recv_ts: Ticks,
        reports: impl Iterator<Item = Report>,
    ) -> Result<ObserveOutcome, JoinError> {
        if sender_id == our_id {
            return Err(JoinError::SelfLoopback);
        }

        let mut outcome = ObserveOutcome::default();

        let idx = match self.find_index(sender_id) {
            Some(idx) => idx,
            None => {
                self.peers
                    .push(Peer::new(sender_id))
                    .map_err(|_| JoinError::TableFull)?;
                outcome.is_new_peer = true;
                self.peers.len() - 1
            }
        };

        let peer = &mut self.peers[idx];
        peer.has_replied = true;
        peer.missed = 0;

        for report in reports {
            if report.peer_id != our_id {
                continue;
            }
            if let Some(meters) = peer.observe_report(their_send_ts, our_recv_ts, &report) {
                let _ = outcome.ranges.push(RangeUpdate {
                    peer_id: sender_id,
                    meters,
                });
            }
        }

        Ok(outcome)
    }

    /// Builds the per-peer report list for an outbound frame: one tuple
    /// per known peer, carrying our current counter and last exchange
    /// with them.
    pub fn reports(&self) -> impl Iterator<Item = Report> + '_ {
        self.peers.iter().map(|p| Report {
            peer_id: p.id,
            tx_count: p.tx_count,
            last_recv_ts: p.t_received,
            last_range_m: p.last_range_m,
        })
    }

    /// Records the local send timestamp into every peer record, and
    /// advances `tx_count` only for peers who have replied to us since
    /// the last send, clearing `has_replied` afterward. This is
    /// independent of the counter advance in `observe_report`'s
    /// consistent-exchange branch.
    pub fn finalize_send(&mut self, t_sent: Ticks) {
        for peer in self.peers.iter_mut() {
            peer.t_sent = t_sent;
            if peer.has_replied {
                peer.tx_count = peer.tx_count.wrapping_add(1);
                peer.has_replied = false;
            }
        }
    }
}
