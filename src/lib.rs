mod config;
mod device;
mod command;
mod capture;
mod stream;
mod transport;

#[derive(Debug)]
pub enum Error {
    /// The bounded transmit buffer would overflow before the next flush.
    /// Dropping samples would corrupt the capture, so the session is lost.
    TxOverflow,
    /// A capture half was touched by the side that does not own it.
    Ownership,
    /// Transport I/O error.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::TxOverflow =>
                write!(f, "transmit buffer overflow"),
            Self::Ownership =>
                write!(f, "capture half ownership violation"),
            Self::Io(io_error) =>
                write!(f, "transport I/O error: {}", io_error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            &Self::Io(ref io_error) => Some(io_error),
            _ => None
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(io_error: std::io::Error) -> Self {
        Error::Io(io_error)
    }
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use config::{
    ChannelMask,
    SliceLayout,
    TriggerSpec,
    MIN_SAMPLE_RATE,
    MAX_SAMPLE_RATE,
    NUM_ANALOG_CHANNELS,
    NUM_DIGITAL_CHANNELS,
};

pub use device::Device;

pub use command::CommandStatus;

pub use capture::{
    ping_pong,
    Consumer,
    Drained,
    Half,
    Producer,
    Sampler,
    CAPTURE_BYTES,
};

pub use stream::{
    Streamer,
    TX_BUFFER_SIZE,
    TX_BUFFER_THRESHOLD,
};

pub use transport::{
    Loopback,
    Transport,
};
