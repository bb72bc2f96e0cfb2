//! Encoding and transmission of captured slices.
//!
//! Digital-only sessions are run-length encoded: a slice goes out as
//! `tx_bytes_per_slice` bytes carrying seven slice bits each under a set
//! type bit, and runs of identical slices append count bytes with the type
//! bit clear. A count byte in 48..=79 adds 1..=32 repeats; one in 80..=127
//! adds 64..=1568 repeats in steps of 32. One record covers at most 1568
//! slices, then a fresh record starts. Mixed analog sessions skip
//! compression entirely and interleave raw analog bytes after the digital
//! bytes of every slice; compressing one side of the interleave would
//! desynchronize it.

use crate::capture::Drained;
use crate::config::SliceLayout;
use crate::device::Device;
use crate::transport::Transport;
use crate::{Error, Result};

/// Outgoing buffer capacity. The CDC endpoint queues 256 bytes, so holding
/// more than that here does not help.
pub const TX_BUFFER_SIZE: usize = 260;

/// Low-water flush point. Favors latency on a link that chunks at 64-byte
/// frames; anything pending goes out rather than waiting for a full buffer.
/// Small against [`TX_BUFFER_SIZE`], which leaves room for the roughly 83
/// maximum-length run records a steady input can still produce from one
/// capture half after the flush decision.
pub const TX_BUFFER_THRESHOLD: usize = 20;

/// Most slices one run record may cover.
const MAX_RUN_SLICES: u32 = 1568;

/// Set on every transmitted slice byte; clear on run count bytes.
const SLICE_TYPE_BIT: u8 = 0x80;

const RUN_SHORT_BASE: u8 = 47; // +1..=32 repeats
const RUN_LONG_BASE: u8 = 78; // +64..=1568 repeats, in steps of 32

/// Drains capture halves into the transport: unpacks slices, compresses
/// digital-only streams, and flushes the bounded transmit buffer at the
/// low-water threshold.
#[derive(Debug)]
pub struct Streamer {
    layout: SliceLayout,
    txbuf: Vec<u8>,
    pending_slice: u32,
    pending_run: u32,
}

impl Streamer {
    pub fn new(layout: SliceLayout) -> Streamer {
        Streamer {
            layout,
            txbuf: Vec::with_capacity(TX_BUFFER_SIZE),
            pending_slice: 0,
            pending_run: 0,
        }
    }

    /// Encode one drained half. Stops early on the sample limit of a fixed
    /// session (completing it) or on an abort, either way returning the
    /// device to idle. A transmit overflow is fatal to the session: the
    /// device resets and the error surfaces to the caller.
    pub fn drain<T: Transport>(&mut self, device: &mut Device, half: &Drained,
                               transport: &mut T) -> Result<()> {
        if !device.sending() {
            return Ok(());
        }
        let compress = self.layout.analog_channels == 0 && self.layout.digital_channels > 0;
        let analog_stride = self.layout.analog_channels as usize;
        let slices = SliceIter::new(half.digital, self.layout.nibbles_per_slice, half.slices);
        for (index, slice) in slices.enumerate() {
            if device.aborted() {
                log::debug!("abort honored after {} samples", device.sent_count());
                self.finish(transport)?;
                device.reset();
                return Ok(());
            }
            if !device.continuous() && device.sent_count() >= device.sample_limit() {
                break;
            }
            let encoded = if compress {
                self.encode_run(slice)
            } else {
                self.emit_slice(slice).and_then(|()| {
                    self.push_bytes(&half.analog[index * analog_stride..][..analog_stride])
                })
            };
            if let Err(error) = encoded {
                log::error!("transmit buffer overflow with the link backed up; session lost");
                device.reset();
                return Err(error);
            }
            device.record_sent(1);
            if self.txbuf.len() >= TX_BUFFER_THRESHOLD {
                self.flush(transport)?;
            }
        }
        if !device.continuous() && device.sent_count() >= device.sample_limit() {
            self.finish(transport)?;
            log::debug!("fixed capture complete: {} samples", device.sent_count());
            device.reset();
        }
        Ok(())
    }

    /// Flush the pending run record and everything buffered to the
    /// transport.
    pub fn finish<T: Transport>(&mut self, transport: &mut T) -> Result<()> {
        self.flush_run()?;
        self.flush(transport)
    }

    fn encode_run(&mut self, slice: u32) -> Result<()> {
        if self.pending_run > 0 && slice == self.pending_slice
                && self.pending_run < MAX_RUN_SLICES {
            self.pending_run += 1;
            return Ok(());
        }
        self.flush_run()?;
        self.pending_slice = slice;
        self.pending_run = 1;
        Ok(())
    }

    fn flush_run(&mut self) -> Result<()> {
        if self.pending_run == 0 {
            return Ok(());
        }
        self.emit_slice(self.pending_slice)?;
        let mut extra = self.pending_run - 1;
        while extra >= 64 {
            let chunk = (extra / 32).min(49) * 32;
            self.push_byte(RUN_LONG_BASE + (chunk / 32) as u8)?;
            extra -= chunk;
        }
        while extra > 0 {
            let chunk = extra.min(32);
            self.push_byte(RUN_SHORT_BASE + chunk as u8)?;
            extra -= chunk;
        }
        self.pending_run = 0;
        Ok(())
    }

    fn emit_slice(&mut self, slice: u32) -> Result<()> {
        for index in 0..self.layout.tx_bytes_per_slice as u32 {
            self.push_byte(SLICE_TYPE_BIT | ((slice >> (7 * index)) & 0x7F) as u8)?;
        }
        Ok(())
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        for &byte in bytes {
            self.push_byte(byte)?;
        }
        Ok(())
    }

    fn push_byte(&mut self, byte: u8) -> Result<()> {
        if self.txbuf.len() == TX_BUFFER_SIZE {
            return Err(Error::TxOverflow);
        }
        self.txbuf.push(byte);
        Ok(())
    }

    /// Write out as much as the link will take; a backed-up link leaves the
    /// remainder buffered for the next flush.
    fn flush<T: Transport>(&mut self, transport: &mut T) -> Result<()> {
        while !self.txbuf.is_empty() {
            let written = transport.write(&self.txbuf)?;
            if written == 0 {
                log::trace!("link backed up, {} bytes pending", self.txbuf.len());
                break;
            }
            self.txbuf.drain(..written);
        }
        Ok(())
    }
}

/// Iterates packed digital capture memory as one slice word per sample.
struct SliceIter<'a> {
    data: &'a [u8],
    nibbles: u8,
    index: usize,
    count: usize,
}

impl<'a> SliceIter<'a> {
    fn new(data: &'a [u8], nibbles: u8, count: usize) -> SliceIter<'a> {
        SliceIter { data, nibbles, index: 0, count }
    }
}

impl Iterator for SliceIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.index == self.count {
            return None;
        }
        let index = self.index;
        self.index += 1;
        Some(match self.nibbles {
            0 => 0,
            1 => (self.data[index / 2] >> ((index % 2) * 4)) as u32 & 0xF,
            2 => self.data[index] as u32,
            4 => bytemuck::pod_read_unaligned::<u16>(&self.data[index * 2..][..2]) as u32,
            8 => bytemuck::pod_read_unaligned::<u32>(&self.data[index * 4..][..4]),
            _ => unreachable!("nibbles per slice is 0, 1, 2, 4 or 8"),
        })
    }
}
