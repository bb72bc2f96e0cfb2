//! Host command parsing: a bounded line accumulator fed one byte at a time,
//! and the single-character command dispatch that mutates the device
//! registers. Responses are bare tokens; the `*` ack doubles as the failure
//! marker for commands the host expected data from.

use crate::config::{NUM_ANALOG_CHANNELS, NUM_DIGITAL_CHANNELS};
use crate::device::Device;

/// Usable characters per command line. Longer lines are truncated and the
/// partial line discarded.
const LINE_CAPACITY: usize = 19;

/// Bounded accumulator for the command line currently being typed.
#[derive(Debug)]
pub(crate) struct LineBuffer {
    bytes: [u8; LINE_CAPACITY],
    len: usize,
}

impl LineBuffer {
    pub(crate) fn new() -> LineBuffer {
        LineBuffer { bytes: [0; LINE_CAPACITY], len: 0 }
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Append one byte. On overflow the accumulated line is dropped and the
    /// byte that did not fit starts a fresh one; truncate-and-discard is the
    /// documented policy, not an accident.
    pub(crate) fn push(&mut self, byte: u8) {
        if self.len == LINE_CAPACITY {
            log::debug!("command overflow: {:?}", String::from_utf8_lossy(&self.bytes));
            self.len = 0;
        }
        self.bytes[self.len] = byte;
        self.len += 1;
    }

    /// Take the accumulated line and reset the accumulator.
    pub(crate) fn take(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.bytes[..self.len]).into_owned();
        self.len = 0;
        line
    }
}

/// Outcome of feeding one byte of host input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Nothing to send back: the byte was buffered, handled a silent reset,
    /// or completed a line that produces no data (including rejections).
    Quiet,
    /// A line was dispatched and [`Device::response`] holds a reply token
    /// that must be flushed to the host.
    Response,
}

impl Device {
    /// Feed one byte of host input. Strictly synchronous: a terminator
    /// dispatches the accumulated line before this returns, so one command
    /// is fully applied before the next byte is accepted.
    pub fn feed(&mut self, byte: u8) -> CommandStatus {
        match byte {
            // the reset character works by itself, silently
            b'*' => {
                self.reset();
                CommandStatus::Quiet
            }
            b'\r' | b'\n' => self.dispatch(),
            _ => {
                self.line.push(byte);
                CommandStatus::Quiet
            }
        }
    }

    fn dispatch(&mut self) -> CommandStatus {
        // dataless acks reply with the bare token unless a command below
        // writes something richer
        self.set_response("*");
        let line = self.line.take();
        let bytes = line.as_bytes();

        match bytes.first() {
            Some(&b'i') => {
                self.set_response(&format!(
                    "SRPICO,A{:02}1D{:02},02", NUM_ANALOG_CHANNELS, NUM_DIGITAL_CHANNELS));
                log::debug!("identify: {}", self.response());
                CommandStatus::Response
            }
            Some(&b'R') => match u32::try_from(leading_int(&line[1..])) {
                Ok(rate) if self.set_sample_rate(rate) => CommandStatus::Response,
                _ => {
                    log::debug!("unsupported sample rate {:?}", line);
                    CommandStatus::Quiet
                }
            },
            Some(&b'L') => match u32::try_from(leading_int(&line[1..])) {
                Ok(limit) if self.set_sample_limit(limit) => CommandStatus::Response,
                _ => {
                    log::debug!("bad sample limit {:?}", line);
                    CommandStatus::Quiet
                }
            },
            Some(&b'a') => {
                if leading_int(&line[1..]) >= 0 {
                    // scale and offset in integer microvolts, separated by
                    // 'x': 3.3V over a 7-bit sample, no offset
                    self.set_response("25700x0");
                } else {
                    // a bad channel still answers: the bare token reads as
                    // a failure marker on the host side
                    log::debug!("bad analog scale query {:?}", line);
                }
                CommandStatus::Response
            }
            Some(&b'F') => {
                log::debug!("start fixed");
                self.arm(false);
                CommandStatus::Quiet
            }
            Some(&b'C') => {
                log::debug!("start continuous");
                self.arm(true);
                CommandStatus::Quiet
            }
            // tvxx: trigger value plus two-digit channel; stored as-is for
            // the sampling driver and acked regardless
            Some(&b't') => {
                if let Some(&value) = bytes.get(1) {
                    if let Ok(channel) = u8::try_from(leading_int(line.get(2..).unwrap_or(""))) {
                        self.set_trigger(value, channel);
                    }
                }
                CommandStatus::Response
            }
            Some(&b'p') => {
                let samples = leading_int(&line[1..]);
                log::debug!("pre-trigger samples {} ({:?})", samples, line);
                if let Ok(samples) = u32::try_from(samples) {
                    self.set_pre_trigger(samples);
                }
                CommandStatus::Response
            }
            // Axyy / Dxyy: x enables (1) or disables (0) channel yy
            Some(&family @ (b'A' | b'D')) => {
                let enable = bytes.get(1).map_or(-1, |&b| b as i64 - b'0' as i64);
                let channel = leading_int(line.get(2..).unwrap_or(""));
                if (0..=1).contains(&enable) && (0..=31).contains(&channel) {
                    if family == b'A' {
                        self.set_analog_channel(channel as u32, enable == 1);
                    } else {
                        self.set_digital_channel(channel as u32, enable == 1);
                    }
                    CommandStatus::Response
                } else {
                    log::debug!("bad channel enable {:?}", line);
                    CommandStatus::Quiet
                }
            }
            _ => {
                log::debug!("bad command {:?}", line);
                CommandStatus::Quiet
            }
        }
    }
}

/// `atol()`-style prefix parse: an optional sign, then leading digits;
/// anything after them is ignored. An empty prefix parses as zero.
fn leading_int(text: &str) -> i64 {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let mut value = 0i64;
    for byte in digits.bytes() {
        if !byte.is_ascii_digit() {
            break;
        }
        value = value * 10 + (byte - b'0') as i64;
    }
    if negative { -value } else { value }
}
