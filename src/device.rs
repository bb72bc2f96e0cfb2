use crate::command::LineBuffer;
use crate::config::{ChannelMask, SliceLayout, TriggerSpec, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};

/// The device context: configuration registers, derived session layout, and
/// the session state machine. One of these exists per analyzer; it is created
/// at boot and reset by the host `*` command.
#[derive(Debug)]
pub struct Device {
    pub(crate) analog_mask: ChannelMask,
    pub(crate) digital_mask: ChannelMask,
    pub(crate) sample_rate: u32,
    pub(crate) sample_limit: u32,
    pub(crate) layout: SliceLayout,
    pub(crate) trigger: TriggerSpec,
    pub(crate) sent_count: u32,
    pub(crate) line: LineBuffer,
    pub(crate) response: String,
    pub(crate) started: bool,
    pub(crate) sending: bool,
    pub(crate) aborted: bool,
    pub(crate) continuous: bool,
}

impl Device {
    /// Power-on state: everything a `reset` clears, plus default registers.
    pub fn new() -> Device {
        Device {
            analog_mask: ChannelMask::empty(),
            digital_mask: ChannelMask::empty(),
            sample_rate: MIN_SAMPLE_RATE,
            sample_limit: 10,
            layout: SliceLayout::default(),
            trigger: TriggerSpec::default(),
            sent_count: 0,
            line: LineBuffer::new(),
            response: String::new(),
            started: false,
            sending: false,
            aborted: false,
            continuous: false,
        }
    }

    /// Return to idle. Session flags, the sample counter and the command
    /// accumulator clear; configuration registers and trigger state persist
    /// so the host can rearm without reprogramming them.
    pub fn reset(&mut self) {
        self.started = false;
        self.sending = false;
        self.aborted = false;
        self.continuous = false;
        self.sent_count = 0;
        self.line.clear();
        log::debug!("device reset");
    }

    /// Derive the session layout from the channel masks and begin sending.
    /// The sample counter and trigger state are deliberately left alone;
    /// only an explicit `*` clears those.
    pub fn arm(&mut self, continuous: bool) {
        self.layout = SliceLayout::derive(self.analog_mask, self.digital_mask);
        self.continuous = continuous;
        self.started = true;
        self.sending = true;
        log::debug!("armed (continuous={}): {:?}", continuous, self.layout);
    }

    /// Force an early end to the session. One-way; the streamer honors it
    /// within one encoder iteration and resets back to idle.
    pub fn abort(&mut self) {
        self.aborted = true;
        log::debug!("abort requested");
    }

    /// Set the sample rate register; out-of-range values leave it unchanged.
    pub fn set_sample_rate(&mut self, rate_hz: u32) -> bool {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate_hz) {
            return false;
        }
        self.sample_rate = rate_hz;
        true
    }

    /// Set the fixed-mode sample count; zero is rejected.
    pub fn set_sample_limit(&mut self, samples: u32) -> bool {
        if samples == 0 {
            return false;
        }
        self.sample_limit = samples;
        true
    }

    pub fn set_analog_channel(&mut self, channel: u32, enabled: bool) {
        self.analog_mask.set(ChannelMask::channel(channel), enabled);
        log::debug!("analog channel {} enable={} mask={:#x}",
            channel, enabled, self.analog_mask.bits());
    }

    pub fn set_digital_channel(&mut self, channel: u32, enabled: bool) {
        self.digital_mask.set(ChannelMask::channel(channel), enabled);
        log::debug!("digital channel {} enable={} mask={:#x}",
            channel, enabled, self.digital_mask.bits());
    }

    pub fn set_trigger(&mut self, value: u8, channel: u8) {
        self.trigger.value = value;
        self.trigger.channel = channel;
    }

    pub fn set_pre_trigger(&mut self, samples: u32) {
        self.trigger.pre_samples = samples;
    }

    pub(crate) fn record_sent(&mut self, samples: u32) {
        self.sent_count += samples;
    }

    pub(crate) fn set_response(&mut self, token: &str) {
        debug_assert!(!token.contains(['\r', '\n']));
        self.response.clear();
        self.response.push_str(token);
    }

    pub fn analog_mask(&self) -> ChannelMask { self.analog_mask }
    pub fn digital_mask(&self) -> ChannelMask { self.digital_mask }
    pub fn sample_rate(&self) -> u32 { self.sample_rate }
    pub fn sample_limit(&self) -> u32 { self.sample_limit }
    pub fn layout(&self) -> SliceLayout { self.layout }
    pub fn trigger(&self) -> TriggerSpec { self.trigger }
    pub fn sent_count(&self) -> u32 { self.sent_count }
    pub fn started(&self) -> bool { self.started }
    pub fn sending(&self) -> bool { self.sending }
    pub fn aborted(&self) -> bool { self.aborted }
    pub fn continuous(&self) -> bool { self.continuous }

    /// The most recent reply token. Never contains CR or LF.
    pub fn response(&self) -> &str { &self.response }
}

impl Default for Device {
    fn default() -> Self {
        Device::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reset_idempotent() {
        let mut device = Device::new();
        device.set_digital_channel(0, true);
        device.arm(true);
        device.record_sent(42);
        device.abort();
        device.reset();
        let snapshot = (device.started, device.sending, device.aborted,
            device.continuous, device.sent_count);
        assert_eq!(snapshot, (false, false, false, false, 0));
        device.reset();
        assert_eq!((device.started, device.sending, device.aborted,
            device.continuous, device.sent_count), snapshot);
        // configuration survives the reset
        assert!(device.digital_mask().contains(ChannelMask::channel(0)));
    }

    #[test]
    fn test_sample_rate_bounds() {
        let mut device = Device::new();
        assert!(device.set_sample_rate(MIN_SAMPLE_RATE));
        assert!(device.set_sample_rate(MAX_SAMPLE_RATE));
        assert!(device.set_sample_rate(10_000));
        assert!(!device.set_sample_rate(MIN_SAMPLE_RATE - 1));
        assert!(!device.set_sample_rate(MAX_SAMPLE_RATE + 1));
        assert_eq!(device.sample_rate(), 10_000);
    }

    #[test]
    fn test_sample_limit_bounds() {
        let mut device = Device::new();
        assert!(device.set_sample_limit(1));
        assert!(!device.set_sample_limit(0));
        assert_eq!(device.sample_limit(), 1);
    }

    #[test]
    fn test_arm_preserves_counters_and_trigger() {
        let mut device = Device::new();
        device.set_trigger(b'r', 3);
        device.set_pre_trigger(500);
        device.record_sent(7);
        device.arm(false);
        assert!(device.sending());
        assert!(!device.continuous());
        assert_eq!(device.sent_count(), 7);
        assert_eq!(device.trigger(), TriggerSpec { value: b'r', channel: 3, pre_samples: 500 });
    }
}
