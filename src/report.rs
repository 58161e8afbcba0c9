//! Reporting channel.
//!
//! Line-oriented, machine-readable output over an injected sink. The
//! concrete transport (serial port, stdout, whatever) is out of scope
//! for this crate: callers implement [`Reporter`] over whatever they
//! have.

use core::fmt::Write as _;

use heapless::String;

/// Longest line this module ever emits. `!range 254 254 -1000.0` plus
/// slack comfortably fits in 48 bytes; rounded up for headroom.
const LINE_CAP: usize = 64;

/// A sink for report lines. Implementors own the actual transport;
/// `write_line` receives one complete line, without a trailing
/// newline.
pub trait Reporter {
    fn write_line(&mut self, line: &str);
}

/// Emits `!range <from_id> <to_id> <meters>`, one line per observed
/// pairwise range, whether computed locally or extracted from a
/// peer's report.
pub fn report_range(reporter: &mut impl Reporter, from_id: u8, to_id: u8, meters: f32) {
    let mut line: String<LINE_CAP> = String::new();
    if write!(line, "!range {} {} {}", from_id, to_id, meters).is_ok() {
        reporter.write_line(&line);
    }
}

/// Emits `!id <our_id>`, once per transmission by tag-role nodes.
pub fn report_id(reporter: &mut impl Reporter, our_id: u8) {
    let mut line: String<LINE_CAP> = String::new();
    if write!(line, "!id {}", our_id).is_ok() {
        reporter.write_line(&line);
    }
}

/// Emits `!remove <peer_id>` on eviction.
pub fn report_remove(reporter: &mut impl Reporter, peer_id: u8) {
    let mut line: String<LINE_CAP> = String::new();
    if write!(line, "!remove {}", peer_id).is_ok() {
        reporter.write_line(&line);
    }
}
