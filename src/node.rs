//! Main-loop integration.
//!
//! Wires the frame codec, peer table, MAC state machine, radio driver,
//! and reporting channel together into a single-threaded event loop.
//! Nothing in this module computes a range or decides a slot itself;
//! it only sequences calls into [`crate::peer`], [`crate::mac`],
//! [`crate::frame`] in a fixed order (receive, then send, then
//! state-machine evaluation) and turns their outputs into
//! [`crate::report`] lines.

use core::fmt::Write as _;

use crate::config::Config;
use crate::error::{JoinError, MacFault};
use crate::frame::{self, FrameView};
use crate::mac::{Action, Mac};
use crate::peer::PeerTable;
use crate::radio::{InterruptFlags, Radio};
use crate::report::{report_id, report_range, report_remove, Reporter};
use crate::timestamp::Ticks;

/// One node's full runtime state: configuration, MAC ring, and peer
/// table. Generic over `N` (peer table / `NUM_DEVICES` capacity) and
/// `RING` (the `tx_order` ring capacity, at least `N + 2`).
pub struct Node<const N: usize, const RING: usize> {
    cfg: Config,
    mac: Mac<RING>,
    peers: PeerTable<N>,
    boot_us: u64,
}

impl<const N: usize, const RING: usize> Node<N, RING> {
    pub fn new(cfg: Config, boot_us: u64) -> Self {
        Node {
            mac: Mac::new(cfg.our_id, boot_us),
            peers: PeerTable::new(),
            cfg,
            boot_us,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn peers(&self) -> &PeerTable<N> {
        &self.peers
    }

    pub fn mac(&self) -> &Mac<RING> {
        &self.mac
    }

    /// Runs one main-loop iteration. `frame_buf` must be at least
    /// [`crate::frame::MAX_FRAME_LEN`] bytes; it's reused for both
    /// assembling an outbound frame and staging a received one. The
    /// caller owns exactly one such buffer per node, matching the
    /// original's single-buffer design.
    pub fn poll(
        &mut self,
        now_us: u64,
        flags: &InterruptFlags,
        radio: &mut impl Radio,
        reporter: &mut impl Reporter,
        frame_buf: &mut [u8],
    ) -> Result<(), MacFault> {
        self.mac.poll_lifecycle(now_us, self.boot_us, &self.cfg);

        if flags.take_error() {
            reporter.write_line("radio hardware error");
        }
        if flags.take_receive_failed() {
            reporter.write_line("radio receive failed");
        }

        if !self.mac.suppress_receive() && flags.take_received() {
            self.handle_receive(now_us, radio, reporter, frame_buf);
        }

        if flags.take_sent() {
            self.mac.on_send_complete(now_us);
        }

        if let Some(evicted) = self.mac.check_slot_timeout(now_us, &self.cfg, &mut self.peers)? {
            report_remove(reporter, evicted);
        }

        if self.mac.poll_transmit() == Action::Transmit {
            self.transmit(radio, reporter, frame_buf);
            flags.clear_received();
        }

        Ok(())
    }

    fn handle_receive(
        &mut self,
        now_us: u64,
        radio: &mut impl Radio,
        reporter: &mut impl Reporter,
        frame_buf: &mut [u8],
    ) {
        let len = match radio.take_received(frame_buf) {
            Some(len) => len,
            None => return,
        };
        let view = match FrameView::parse(&frame_buf[..len]) {
            Ok(view) => view,
            Err(_) => return,
        };
        let sender_id = view.sender_id();
        if sender_id == self.cfg.our_id {
            return;
        }

        let our_recv_ts = apply_antenna_delay(radio.rx_timestamp(), self.cfg.antenna_delay_ticks);
        let their_send_ts = view.sender_send_ts();

        let outcome = match self.peers.observe_frame(
            self.cfg.our_id,
            sender_id,
            their_send_ts,
            our_recv_ts,
            view.reports(),
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                report_join_error(reporter, sender_id, err);
                return;
            }
        };

        for range in outcome.ranges.iter() {
            report_range(reporter, self.cfg.our_id, range.peer_id, range.meters);
        }

        if self.cfg.role().is_tag() {
            for report in view.reports() {
                if report.peer_id != self.cfg.our_id && report.last_range_m != 0.0 {
                    report_range(reporter, sender_id, report.peer_id, report.last_range_m);
                }
            }
        }

        self.mac.on_receive(sender_id, outcome.is_new_peer, now_us);
    }

    fn transmit(&mut self, radio: &mut impl Radio, reporter: &mut impl Reporter, frame_buf: &mut [u8]) {
        let len = match frame::encode(frame_buf, self.cfg.our_id, Ticks::ZERO, self.peers.reports())
        {
            Ok(len) => len,
            Err(_) => return,
        };

        let scheduled_ts = match radio.schedule_send(&frame_buf[..len], self.cfg.delay_time_us) {
            Ok(ts) => ts,
            Err(_) => return,
        };
        let send_ts = apply_antenna_delay(scheduled_ts, self.cfg.antenna_delay_ticks);
        frame::patch_send_ts(&mut frame_buf[..len], send_ts);

        self.peers.finalize_send(send_ts);
        self.mac.mark_took_turn();

        if self.cfg.role().is_tag() {
            report_id(reporter, self.cfg.our_id);
        }
    }
}

/// Applies this node's fixed antenna-delay correction to a locally
/// observed timestamp, before it's stored or embedded in an outbound
/// frame.
fn apply_antenna_delay(ts: Ticks, delay_ticks: i64) -> Ticks {
    let corrected = Ticks::wrap(ts.raw() as i64 + delay_ticks);
    Ticks::from_count(corrected, crate::timestamp::Unit::Ticks)
}

/// Logs a peer-table join failure as a diagnostic line. A full table
/// is a normal overflow condition, not a fault, so the frame is simply
/// dropped after this; the sender's ID isn't mutated into `tx_order`.
fn report_join_error(reporter: &mut impl Reporter, sender_id: u8, err: JoinError) {
    let mut line: heapless::String<48> = heapless::String::new();
    let result = match err {
        JoinError::TableFull => write!(line, "peer table full, dropping id {}", sender_id),
        JoinError::SelfLoopback => write!(line, "dropping frame from our own id {}", sender_id),
    };
    if result.is_ok() {
        reporter.write_line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Report, MAX_FRAME_LEN};
    use crate::mac::LifecycleState;
    use crate::radio::RadioError;

    struct MockRadio {
        outbox: heapless::Vec<u8, MAX_FRAME_LEN>,
        inbox: Option<heapless::Vec<u8, MAX_FRAME_LEN>>,
        rx_ts: Ticks,
        next_send_ts: Ticks,
    }

    impl MockRadio {
        fn new() -> Self {
            MockRadio {
                outbox: heapless::Vec::new(),
                inbox: None,
                rx_ts: Ticks::ZERO,
                next_send_ts: Ticks::ZERO,
            }
        }

        fn deliver(&mut self, bytes: &[u8], rx_ts: Ticks) {
            let mut v = heapless::Vec::new();
            v.extend_from_slice(bytes).unwrap();
            self.inbox = Some(v);
            self.rx_ts = rx_ts;
        }
    }

    impl Radio for MockRadio {
        fn configure(&mut self, _device_id: u8, _network_id: u16) -> Result<(), RadioError> {
            Ok(())
        }

        fn start_receiving(&mut self) -> Result<(), RadioError> {
            Ok(())
        }

        fn take_received(&mut self, buf: &mut [u8]) -> Option<usize> {
            let frame = self.inbox.take()?;
            buf[..frame.len()].copy_from_slice(&frame);
            Some(frame.len())
        }

        fn rx_timestamp(&self) -> Ticks {
            self.rx_ts
        }

        fn schedule_send(&mut self, frame: &[u8], _delay_us: u32) -> Result<Ticks, RadioError> {
            self.outbox.clear();
            self.outbox.extend_from_slice(frame).unwrap();
            Ok(self.next_send_ts)
        }
    }

    struct VecReporter {
        lines: heapless::Vec<heapless::String<64>, 16>,
    }

    impl VecReporter {
        fn new() -> Self {
            VecReporter {
                lines: heapless::Vec::new(),
            }
        }
    }

    impl Reporter for VecReporter {
        fn write_line(&mut self, line: &str) {
            let mut s: heapless::String<64> = heapless::String::new();
            let _ = s.push_str(line);
            let _ = self.lines.push(s);
        }
    }

    fn join_node(node: &mut Node<6, 8>, radio: &mut MockRadio, reporter: &mut VecReporter, flags: &InterruptFlags) {
        let start_up_us = node.config().start_up_delay_us();
        node.poll(start_up_us, flags, radio, reporter, &mut [0u8; MAX_FRAME_LEN])
            .unwrap();
        // Observe our own round boundary to transition past ENTERING_NETWORK.
        let mut frame_buf = [0u8; MAX_FRAME_LEN];
        let len = frame::encode(&mut frame_buf, 99, Ticks::ZERO, core::iter::empty()).unwrap();
        radio.deliver(&frame_buf[..len], Ticks::ZERO);
        flags.set_received();
        node.poll(start_up_us + 1, flags, radio, reporter, &mut frame_buf)
            .unwrap();
    }

    #[test]
    fn transmits_id_line_for_tag_role() {
        let cfg = Config::new(7, 6); // id >= 5 -> tag
        let mut node: Node<6, 8> = Node::new(cfg, 0);
        let mut radio = MockRadio::new();
        let mut reporter = VecReporter::new();
        let flags = InterruptFlags::new();

        join_node(&mut node, &mut radio, &mut reporter, &flags);

        assert_eq!(node.mac().state(), LifecycleState::InTheRound);
        assert!(reporter.lines.iter().any(|l| l.as_str() == "!id 7"));
    }

    #[test]
    fn anchor_role_does_not_emit_id_line() {
        let cfg = Config::new(1, 6); // anchor
        let mut node: Node<6, 8> = Node::new(cfg, 0);
        let mut radio = MockRadio::new();
        let mut reporter = VecReporter::new();
        let flags = InterruptFlags::new();

        join_node(&mut node, &mut radio, &mut reporter, &flags);

        assert!(!reporter.lines.iter().any(|l| l.starts_with("!id")));
    }

    #[test]
    fn receiving_a_frame_creates_a_peer() {
        let cfg = Config::new(1, 6);
        let mut node: Node<6, 8> = Node::new(cfg, 0);
        let mut radio = MockRadio::new();
        let mut reporter = VecReporter::new();
        let flags = InterruptFlags::new();

        let mut frame_buf = [0u8; MAX_FRAME_LEN];
        let len = frame::encode(&mut frame_buf, 2, Ticks::from_count(500, crate::timestamp::Unit::Ticks), core::iter::empty()).unwrap();
        radio.deliver(&frame_buf[..len], Ticks::from_count(600, crate::timestamp::Unit::Ticks));
        flags.set_received();

        node.poll(1, &flags, &mut radio, &mut reporter, &mut frame_buf)
            .unwrap();

        assert!(node.peers().get(2).is_some());
    }

    #[test]
    fn self_loopback_frame_is_dropped() {
        let cfg = Config::new(1, 6);
        let mut node: Node<6, 8> = Node::new(cfg, 0);
        let mut radio = MockRadio::new();
        let mut reporter = VecReporter::new();
        let flags = InterruptFlags::new();

        let mut frame_buf = [0u8; MAX_FRAME_LEN];
        let len = frame::encode(&mut frame_buf, 1, Ticks::ZERO, core::iter::empty()).unwrap();
        radio.deliver(&frame_buf[..len], Ticks::ZERO);
        flags.set_received();

        node.poll(1, &flags, &mut radio, &mut reporter, &mut frame_buf)
            .unwrap();

        assert!(node.peers().is_empty());
    }

    #[test]
    fn extracted_relay_range_emitted_only_for_tag_role() {
        let cfg = Config::new(6, 6); // tag
        let mut node: Node<6, 8> = Node::new(cfg, 0);
        let mut radio = MockRadio::new();
        let mut reporter = VecReporter::new();
        let flags = InterruptFlags::new();

        let reports = [Report {
            peer_id: 9,
            tx_count: 1,
            last_recv_ts: Ticks::ZERO,
            last_range_m: 12.5,
        }];
        let mut frame_buf = [0u8; MAX_FRAME_LEN];
        let len = frame::encode(&mut frame_buf, 2, Ticks::ZERO, reports.iter().copied()).unwrap();
        radio.deliver(&frame_buf[..len], Ticks::ZERO);
        flags.set_received();

        node.poll(1, &flags, &mut radio, &mut reporter, &mut frame_buf)
            .unwrap();

        assert!(reporter.lines.iter().any(|l| l.as_str() == "!range 2 9 12.5"));
    }
}
