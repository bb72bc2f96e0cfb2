use std::collections::VecDeque;

use crate::Result;

/// The byte-oriented link to the host. Command input and the sample stream
/// share it; the host side keeps the two from interleaving.
pub trait Transport {
    /// Write as many bytes as the link will currently take; returns the
    /// count accepted, possibly zero when the link is backed up.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Take one byte of host input, if any is pending.
    fn read(&mut self) -> Result<Option<u8>>;
}

/// In-memory transport for tests and the demo binary.
#[derive(Debug, Default)]
pub struct Loopback {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    capacity: Option<usize>,
}

impl Loopback {
    pub fn new() -> Loopback {
        Loopback::default()
    }

    /// A link that accepts at most `capacity` bytes until the host drains
    /// them, for exercising back-pressure.
    pub fn with_capacity(capacity: usize) -> Loopback {
        Loopback { capacity: Some(capacity), ..Loopback::default() }
    }

    /// Queue host-to-device command bytes.
    pub fn host_send(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Everything the device has written so far.
    pub fn host_received(&self) -> &[u8] {
        &self.tx
    }

    /// Drain the host-side receive queue, freeing link capacity.
    pub fn host_drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }
}

impl Transport for Loopback {
    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let room = match self.capacity {
            Some(capacity) => capacity.saturating_sub(self.tx.len()),
            None => bytes.len(),
        };
        let accepted = bytes.len().min(room);
        self.tx.extend_from_slice(&bytes[..accepted]);
        Ok(accepted)
    }

    fn read(&mut self) -> Result<Option<u8>> {
        Ok(self.rx.pop_front())
    }
}
