use picologic::{ping_pong, CommandStatus, Device, Half, Loopback, Sampler, Streamer, Transport};

/// Square wave across the eight sampled digital channels.
struct SquareWave {
    half_period: usize,
    tick: usize,
}

impl Sampler for SquareWave {
    fn fill(&mut self, digital: &mut [u8], _analog: &mut [u8]) -> usize {
        for byte in digital.iter_mut() {
            *byte = if (self.tick / self.half_period) % 2 == 0 { 0xA5 } else { 0x00 };
            self.tick += 1;
        }
        digital.len()
    }
}

fn main() -> picologic::Result<()> {
    env_logger::init();

    let mut device = Device::new();
    let mut link = Loopback::new();

    // host side: eight digital channels, 10 kHz, 100k samples
    for channel in 0..8 {
        link.host_send(format!("D1{:02}\n", channel).as_bytes());
    }
    link.host_send(b"i\nR10000\nL100000\nF\n");

    while let Some(byte) = link.read()? {
        if device.feed(byte) == CommandStatus::Response {
            println!("response: {}", device.response());
        }
    }

    let (mut producer, mut consumer) = ping_pong(device.layout());
    let mut streamer = Streamer::new(device.layout());
    let mut sampler = SquareWave { half_period: 3000, tick: 0 };
    let limit = device.sample_limit();

    let mut half = Half::First;
    while device.sending() {
        producer.fill(half, &mut sampler)?;
        let drained = consumer.take(half).expect("half was just committed");
        streamer.drain(&mut device, &drained, &mut link)?;
        consumer.release(half)?;
        half = half.other();
    }

    println!("streamed {} samples as {} bytes on the wire",
        limit, link.host_received().len());
    Ok(())
}
