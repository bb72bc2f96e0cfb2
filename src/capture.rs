//! Double-buffered capture memory. The sampling context fills one half while
//! the transmit path drains the other; the per-half owner tag is the single
//! word of state shared between the two contexts.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::config::SliceLayout;
use crate::{Error, Result};

/// Total capture arena in bytes, split across two halves of digital and
/// analog storage. Sized for the free SRAM of the reference hardware.
pub const CAPTURE_BYTES: usize = 220_000;

const OWNER_PRODUCER: u8 = 0;
const OWNER_CONSUMER: u8 = 1;

/// Identifies one of the two ping-pong halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    First,
    Second,
}

impl Half {
    fn index(self) -> usize {
        match self {
            Half::First => 0,
            Half::Second => 1,
        }
    }

    pub fn other(self) -> Half {
        match self {
            Half::First => Half::Second,
            Half::Second => Half::First,
        }
    }
}

/// Sampling driver collaborator. `digital` receives packed slice words laid
/// out per the session's nibbles-per-slice; `analog` receives one byte per
/// active analog channel per slice. Returns the number of slices produced.
pub trait Sampler {
    fn fill(&mut self, digital: &mut [u8], analog: &mut [u8]) -> usize;
}

#[derive(Debug)]
struct HalfSlot {
    owner: AtomicU8,
    digital: UnsafeCell<Box<[u8]>>,
    analog: UnsafeCell<Box<[u8]>>,
    len: UnsafeCell<usize>,
}

// SAFETY: The cells are only touched by whichever side the `owner` tag
// names, and the tag transfers with release/acquire ordering, so the two
// sides never observe each other's writes in progress.
unsafe impl Sync for HalfSlot {}

#[derive(Debug)]
struct Shared {
    halves: [HalfSlot; 2],
    layout: SliceLayout,
    samples_per_half: usize,
}

impl Shared {
    fn new(layout: SliceLayout) -> Shared {
        // Storage is budgeted in nibbles: the digital word plus two nibbles
        // per analog byte. An even slice count keeps 1-nibble packing whole.
        let nibbles = layout.nibbles_per_slice as usize + 2 * layout.analog_channels as usize;
        let samples_per_half = if nibbles == 0 { 0 } else { (CAPTURE_BYTES / nibbles) & !1 };
        let digital_bytes = samples_per_half * layout.nibbles_per_slice as usize / 2;
        let analog_bytes = samples_per_half * layout.analog_channels as usize;
        let slot = || HalfSlot {
            owner: AtomicU8::new(OWNER_PRODUCER),
            digital: UnsafeCell::new(vec![0; digital_bytes].into_boxed_slice()),
            analog: UnsafeCell::new(vec![0; analog_bytes].into_boxed_slice()),
            len: UnsafeCell::new(0),
        };
        log::trace!("capture halves: {} slices, {}B digital + {}B analog each",
            samples_per_half, digital_bytes, analog_bytes);
        Shared { halves: [slot(), slot()], layout, samples_per_half }
    }

    fn packed_digital_len(&self, slices: usize) -> usize {
        (slices * self.layout.nibbles_per_slice as usize + 1) / 2
    }
}

/// Create the two capture halves for a session layout and split them into
/// the sampling-side and transmit-side handles.
pub fn ping_pong(layout: SliceLayout) -> (Producer, Consumer) {
    let shared = Arc::new(Shared::new(layout));
    (Producer { shared: shared.clone() }, Consumer { shared })
}

/// Sampling-side handle: fills producer-owned halves and publishes them.
#[derive(Debug)]
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    pub fn samples_per_half(&self) -> usize {
        self.shared.samples_per_half
    }

    /// Whether `half` is available to fill.
    pub fn writable(&self, half: Half) -> bool {
        self.shared.halves[half.index()].owner.load(Ordering::Acquire) == OWNER_PRODUCER
    }

    /// Run the sampler over `half` and hand it to the consumer. Filling a
    /// half the consumer still owns is an overrun: the capture would be
    /// corrupted, so it fails instead and acquisition must halt.
    pub fn fill(&mut self, half: Half, sampler: &mut dyn Sampler) -> Result<usize> {
        let slot = &self.shared.halves[half.index()];
        if slot.owner.load(Ordering::Acquire) != OWNER_PRODUCER {
            return Err(Error::Ownership);
        }
        // SAFETY: The tag names the producer and `self` is the only
        // producer, so no other access to the cells exists right now.
        let produced = unsafe {
            let digital = &mut *slot.digital.get();
            let analog = &mut *slot.analog.get();
            let produced = sampler.fill(digital, analog).min(self.shared.samples_per_half);
            *slot.len.get() = produced;
            produced
        };
        slot.owner.store(OWNER_CONSUMER, Ordering::Release);
        log::trace!("{:?} filled with {} slices", half, produced);
        Ok(produced)
    }
}

/// One drained capture half: packed digital bytes, interleaved analog bytes,
/// and the slice count they hold.
#[derive(Debug)]
pub struct Drained<'a> {
    pub digital: &'a [u8],
    pub analog: &'a [u8],
    pub slices: usize,
}

/// Transmit-side handle: borrows consumer-owned halves and returns them.
#[derive(Debug)]
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    pub fn samples_per_half(&self) -> usize {
        self.shared.samples_per_half
    }

    /// Whether `half` holds data waiting to be drained.
    pub fn ready(&self, half: Half) -> bool {
        self.shared.halves[half.index()].owner.load(Ordering::Acquire) == OWNER_CONSUMER
    }

    /// Borrow the contents of `half`, or `None` while the producer still
    /// owns it.
    pub fn take(&self, half: Half) -> Option<Drained<'_>> {
        let slot = &self.shared.halves[half.index()];
        if slot.owner.load(Ordering::Acquire) != OWNER_CONSUMER {
            return None;
        }
        // SAFETY: Consumer-owned; the producer will not touch the cells
        // until `release` hands the half back.
        unsafe {
            let slices = *slot.len.get();
            let digital = &(**slot.digital.get())[..self.shared.packed_digital_len(slices)];
            let analog = &(**slot.analog.get())[..slices * self.shared.layout.analog_channels as usize];
            Some(Drained { digital, analog, slices })
        }
    }

    /// Hand a fully drained half back to the producer.
    pub fn release(&mut self, half: Half) -> Result<()> {
        let slot = &self.shared.halves[half.index()];
        if slot.owner.load(Ordering::Acquire) != OWNER_CONSUMER {
            return Err(Error::Ownership);
        }
        slot.owner.store(OWNER_PRODUCER, Ordering::Release);
        log::trace!("{:?} released", half);
        Ok(())
    }
}
