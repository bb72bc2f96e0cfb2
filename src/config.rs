//! Channel configuration registers and the per-slice layout derived from them.

use bitflags::bitflags;

/// Digital inputs; GP2-GP22 on the reference hardware.
pub const NUM_DIGITAL_CHANNELS: u32 = 21;

/// Analog inputs; GP26-GP28 on the reference hardware.
pub const NUM_ANALOG_CHANNELS: u32 = 3;

/// Slowest supported sample rate in Hz.
pub const MIN_SAMPLE_RATE: u32 = 5_000;

/// Fastest supported sample rate in Hz, plus 16 counts of headroom: the low
/// bits of the rate register double as packed auxiliary configuration bits.
pub const MAX_SAMPLE_RATE: u32 = 120_000_016;

bitflags! {
    /// One bit per input channel, bit index = channel number. The named
    /// groups are the nibble groups of the 32-bit digital sample word that
    /// the sampling hardware records in power-of-two chunks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChannelMask: u32 {
        const GROUP0 = 0x0000_000F;
        const GROUP1 = 0x0000_00F0;
        const GROUP2 = 0x0000_FF00;
        const GROUP3 = 0xFFFF_0000;
    }
}

impl ChannelMask {
    pub fn channel(index: u32) -> ChannelMask {
        debug_assert!(index < 32);
        ChannelMask::from_bits_retain(1 << index)
    }
}

/// Trigger condition from the host `t` command plus the `p` pre-trigger
/// count. Stored for the sampling driver; the engine never evaluates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerSpec {
    pub value: u8,
    pub channel: u8,
    pub pre_samples: u32,
}

/// Storage and wire layout of one sample slice, derived from the channel
/// masks each time a session is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceLayout {
    pub analog_channels: u8,
    pub digital_channels: u8,
    /// How many 4-bit groups of the 32-bit digital sample word are recorded
    /// per sample clock: 0, 1, 2, 4 or 8.
    pub nibbles_per_slice: u8,
    /// Transmitted bytes per digital slice; each byte carries seven slice
    /// bits under the framing type bit.
    pub tx_bytes_per_slice: u8,
}

impl SliceLayout {
    /// Single home of the nibble-group encoding. The increments are +1, +1,
    /// +2, +4 keyed to fixed bit ranges of the mask; this is not a count of
    /// occupied groups. With the contiguous channel assignment the host is
    /// required to use, the result lands on 0, 1, 2, 4 or 8 nibbles, the
    /// chunk sizes the sampling hardware can record.
    pub fn derive(analog_mask: ChannelMask, digital_mask: ChannelMask) -> SliceLayout {
        let analog_channels = population(analog_mask, NUM_ANALOG_CHANNELS);
        let digital_channels = population(digital_mask, NUM_DIGITAL_CHANNELS);

        let mut nibbles_per_slice = 0;
        if digital_mask.intersects(ChannelMask::GROUP0) { nibbles_per_slice += 1 }
        if digital_mask.intersects(ChannelMask::GROUP1) { nibbles_per_slice += 1 }
        if digital_mask.intersects(ChannelMask::GROUP2) { nibbles_per_slice += 2 }
        if digital_mask.intersects(ChannelMask::GROUP3) { nibbles_per_slice += 4 }

        // Nibble-granular storage misaligns once analog bytes are
        // interleaved into the slice, so mixed sessions record a minimum
        // of one full byte per slice.
        if nibbles_per_slice == 1 && analog_channels > 0 {
            nibbles_per_slice = 2;
        }

        SliceLayout {
            analog_channels,
            digital_channels,
            nibbles_per_slice,
            tx_bytes_per_slice: (digital_channels + 6) / 7,
        }
    }
}

// Channels above the populated pin range can be set in the mask but are
// never sampled.
fn population(mask: ChannelMask, channels: u32) -> u8 {
    (mask.bits() & ((1 << channels) - 1)).count_ones() as u8
}

#[cfg(test)]
mod test {
    use super::*;

    fn prefix_mask(channels: u32) -> ChannelMask {
        ChannelMask::from_bits_retain(((1u64 << channels) - 1) as u32)
    }

    #[test]
    fn test_nibble_groups_additive() {
        // all 16 combinations of occupied nibble groups
        for occupancy in 0u32..16 {
            let mut bits = 0u32;
            if occupancy & 1 != 0 { bits |= 0x0000_0001 }
            if occupancy & 2 != 0 { bits |= 0x0000_0010 }
            if occupancy & 4 != 0 { bits |= 0x0000_0100 }
            if occupancy & 8 != 0 { bits |= 0x0001_0000 }
            let layout = SliceLayout::derive(
                ChannelMask::empty(), ChannelMask::from_bits_retain(bits));
            let expected = (occupancy & 1)
                + ((occupancy >> 1) & 1)
                + 2 * ((occupancy >> 2) & 1)
                + 4 * ((occupancy >> 3) & 1);
            assert_eq!(layout.nibbles_per_slice, expected as u8, "mask {:#x}", bits);
        }
    }

    #[test]
    fn test_nibbles_per_slice_domain() {
        let mut previous = 0;
        for channels in 0..=NUM_DIGITAL_CHANNELS {
            let layout = SliceLayout::derive(ChannelMask::empty(), prefix_mask(channels));
            assert!([0, 1, 2, 4, 8].contains(&layout.nibbles_per_slice),
                "{} channels -> {} nibbles", channels, layout.nibbles_per_slice);
            assert!(layout.nibbles_per_slice >= previous);
            previous = layout.nibbles_per_slice;
        }
    }

    #[test]
    fn test_mixed_mode_never_one_nibble() {
        for channels in 0..=NUM_DIGITAL_CHANNELS {
            let layout = SliceLayout::derive(
                ChannelMask::channel(0), prefix_mask(channels));
            assert_ne!(layout.nibbles_per_slice, 1, "{} digital channels", channels);
        }
        // the override only applies to the 1-nibble case
        let layout = SliceLayout::derive(ChannelMask::channel(0), prefix_mask(3));
        assert_eq!(layout.nibbles_per_slice, 2);
        let layout = SliceLayout::derive(ChannelMask::channel(0), prefix_mask(0));
        assert_eq!(layout.nibbles_per_slice, 0);
    }

    #[test]
    fn test_tx_bytes_per_slice() {
        for channels in 0..=NUM_DIGITAL_CHANNELS {
            let layout = SliceLayout::derive(ChannelMask::empty(), prefix_mask(channels));
            assert_eq!(layout.digital_channels as u32, channels);
            assert_eq!(layout.tx_bytes_per_slice as u32, (channels + 6) / 7);
        }
    }

    #[test]
    fn test_channel_counts_ignore_unpopulated_pins() {
        let all = ChannelMask::from_bits_retain(0xFFFF_FFFF);
        let layout = SliceLayout::derive(all, all);
        assert_eq!(layout.analog_channels as u32, NUM_ANALOG_CHANNELS);
        assert_eq!(layout.digital_channels as u32, NUM_DIGITAL_CHANNELS);
    }

    #[test]
    fn test_mask_round_trip() {
        for channel in 0..32 {
            let mut mask = ChannelMask::from_bits_retain(0x0005_0300);
            let before = mask;
            mask.set(ChannelMask::channel(channel), true);
            mask.set(ChannelMask::channel(channel), false);
            // disabling always clears; enable-then-disable restores any
            // mask that did not already have the bit set
            assert_eq!(mask.bits(), before.bits() & !(1 << channel));
        }
    }
}
