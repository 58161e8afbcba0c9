//! Wire frame codec.
//!
//! Pure functions over caller-owned byte buffers: parsing never
//! allocates, and serialization writes into a buffer the caller
//! supplies (at least [`MAX_FRAME_LEN`] bytes, as required by the radio
//! driver contract).
//!
//! ```text
//! offset  size  field
//!  0      1     sender_id
//!  1      5     sender_send_timestamp  (little-endian 40-bit, radio ticks)
//!  6..    -     zero or more per-peer reports, each 11 bytes:
//!                 + 0  1  peer_id
//!                 + 1  1  tx_count
//!                 + 2  5  timestamp of last receive from peer_id (sender's clock)
//!                 + 7  4  last_range_m (IEEE-754 single, host byte order)
//! ```

use crate::error::{FrameEncodeError, FrameParseError};
use crate::timestamp::Ticks;

/// Size of the fixed frame header (sender ID + send timestamp).
pub const HEADER_LEN: usize = 6;

/// Size of one per-peer report tuple.
pub const REPORT_LEN: usize = 11;

/// Maximum total frame length the radio will carry.
pub const MAX_FRAME_LEN: usize = 256;

/// One per-peer report as carried in the wire frame: what the sender
/// last knows about its exchange with `peer_id`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub peer_id: u8,
    pub tx_count: u8,
    pub last_recv_ts: Ticks,
    pub last_range_m: f32,
}

impl Report {
    fn encode_into(&self, out: &mut [u8]) {
        out[0] = self.peer_id;
        out[1] = self.tx_count;
        out[2..7].copy_from_slice(&self.last_recv_ts.to_le_bytes());
        out[7..11].copy_from_slice(&self.last_range_m.to_ne_bytes());
    }

    fn decode_from(bytes: &[u8]) -> Report {
        let mut ts = [0u8; 5];
        ts.copy_from_slice(&bytes[2..7]);
        let mut range = [0u8; 4];
        range.copy_from_slice(&bytes[7..11]);
        Report {
            peer_id: bytes[0],
            tx_count: bytes[1],
            last_recv_ts: Ticks::from_le_bytes(ts),
            last_range_m: f32::from_ne_bytes(range),
        }
    }
}

/// A borrowed, parsed view over a received frame.
///
/// Holds no owned data; every accessor reads directly from the backing
/// slice, so parsing is zero-allocation.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    bytes: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// Parses `bytes` as a wire frame. Rejects frames shorter than the
    /// 6-byte header or whose report section isn't a whole number of
    /// 11-byte tuples.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameParseError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameParseError::TooShort {
                have: bytes.len(),
                need: HEADER_LEN,
            });
        }
        let remaining = bytes.len() - HEADER_LEN;
        if remaining % REPORT_LEN != 0 {
            return Err(FrameParseError::TruncatedReport { remaining });
        }
        Ok(FrameView { bytes })
    }

    pub fn sender_id(&self) -> u8 {
        self.bytes[0]
    }

    pub fn sender_send_ts(&self) -> Ticks {
        let mut buf = [0u8; 5];
        buf.copy_from_slice(&self.bytes[1..HEADER_LEN]);
        Ticks::from_le_bytes(buf)
    }

    pub fn report_count(&self) -> usize {
        (self.bytes.len() - HEADER_LEN) / REPORT_LEN
    }

    pub fn report(&self, index: usize) -> Option<Report> {
        if index >= self.report_count() {
            return None;
        }
        let start = HEADER_LEN + index * REPORT_LEN;
        Some(Report::decode_from(&self.bytes[start..start + REPORT_LEN]))
    }

    /// Iterates over the per-peer reports carried in this frame.
    pub fn reports(&self) -> ReportIter<'a> {
        ReportIter {
            bytes: self.bytes,
            index: 0,
        }
    }
}

/// Iterator over a frame's per-peer reports.
pub struct ReportIter<'a> {
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Iterator for ReportIter<'a> {
    type Item = Report;
    fn next(&mut self) -> Option<Report> {
        let start = HEADER_LEN + self.index * REPORT_LEN;
        if start + REPORT_LEN > self.bytes.len() {
            return None;
        }
        self.index += 1;
        Some(Report::decode_from(&self.bytes[start..start + REPORT_LEN]))
    }
}

/// Assembles an outbound frame into `out`, returning the number of
/// bytes written.
///
/// `send_ts` is a placeholder at build time. The MAC layer overwrites
/// it with the scheduled transmit time the radio driver hands back,
/// since the true value isn't known until the frame is handed off for
/// scheduled transmission.
pub fn encode(
    out: &mut [u8],
    sender_id: u8,
    send_ts: Ticks,
    reports: impl Iterator<Item = Report>,
) -> Result<usize, FrameEncodeError> {
    if out.len() < HEADER_LEN {
        return Err(FrameEncodeError::BufferTooSmall {
            have: out.len(),
            need: HEADER_LEN,
        });
    }
    out[0] = sender_id;
    out[1..HEADER_LEN].copy_from_slice(&send_ts.to_le_bytes());

    let mut len = HEADER_LEN;
    for report in reports {
        if len + REPORT_LEN > out.len() {
            return Err(FrameEncodeError::BufferTooSmall {
                have: out.len(),
                need: len + REPORT_LEN,
            });
        }
        report.encode_into(&mut out[len..len + REPORT_LEN]);
        len += REPORT_LEN;
    }
    Ok(len)
}

/// Overwrites the send-timestamp placeholder in an already-encoded
/// frame buffer, in place, once the radio driver has committed to a
/// scheduled transmit time.
pub fn patch_send_ts(out: &mut [u8], send_ts: Ticks) {
    out[1..HEADER_LEN].copy_from_slice(&send_ts.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::Unit;

    fn sample_reports() -> heapless::Vec<Report, 4> {
        let mut v = heapless::Vec::new();
        v.push(Report {
            peer_id: 2,
            tx_count: 7,
            last_recv_ts: Ticks::from_count(12345, Unit::Ticks),
            last_range_m: 3.25,
        })
        .unwrap();
        v.push(Report {
            peer_id: 3,
            tx_count: 1,
            last_recv_ts: Ticks::ZERO,
            last_range_m: 0.0,
        })
        .unwrap();
        v
    }

    #[test]
    fn parse_rejects_short_frames() {
        let buf = [0u8; 3];
        assert_eq!(
            FrameView::parse(&buf),
            Err(FrameParseError::TooShort { have: 3, need: 6 })
        );
    }

    #[test]
    fn parse_rejects_truncated_report_section() {
        let buf = [0u8; 6 + 5];
        assert_eq!(
            FrameView::parse(&buf),
            Err(FrameParseError::TruncatedReport { remaining: 5 })
        );
    }

    #[test]
    fn encode_then_parse_round_trips() {
        let reports = sample_reports();
        let mut buf = [0u8; MAX_FRAME_LEN];
        let send_ts = Ticks::from_count(999, Unit::Ticks);
        let len = encode(&mut buf, 1, send_ts, reports.iter().copied()).unwrap();

        let view = FrameView::parse(&buf[..len]).unwrap();
        assert_eq!(view.sender_id(), 1);
        assert_eq!(view.sender_send_ts(), send_ts);
        assert_eq!(view.report_count(), 2);
        let collected: heapless::Vec<Report, 4> = view.reports().collect();
        assert_eq!(collected.as_slice(), reports.as_slice());
    }

    #[test]
    fn patch_send_ts_overwrites_placeholder() {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = encode(&mut buf, 1, Ticks::ZERO, core::iter::empty()).unwrap();
        let real_ts = Ticks::from_count(555, Unit::Ticks);
        patch_send_ts(&mut buf[..len], real_ts);
        let view = FrameView::parse(&buf[..len]).unwrap();
        assert_eq!(view.sender_send_ts(), real_ts);
    }

    #[test]
    fn encode_fails_on_buffer_too_small() {
        let mut buf = [0u8; 6];
        let reports = sample_reports();
        let err = encode(&mut buf, 1, Ticks::ZERO, reports.iter().copied()).unwrap_err();
        assert_eq!(
            err,
            FrameEncodeError::BufferTooSmall { have: 6, need: 17 }
        );
    }
}
