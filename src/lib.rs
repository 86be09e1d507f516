//! Driver and datagram transport for serial-attached underwater acoustic modems.
//!
//! The `seamodem` crate talks to a fixed-payload acoustic modem over a serial
//! link. It provides two layers:
//! * [`Modem`] — a command/response client for the modem's line-oriented
//!   sentence protocol, with demultiplexing of unsolicited received-packet
//!   notifications.
//! * [`DatagramSocket`] — arbitrary-length, CRC-protected datagrams layered on
//!   top of the modem's fixed packet payload, fed by a background worker.
//!
//! A deterministic [`ModemSimulator`] implements the same [`ModemLink`]
//! contract as the real client, so everything above the serial port can be
//! exercised without hardware.
//!
//! # Example
//! Connect to a modem over serial and send one packet payload.
//!
//! ```no_run
//! # fn example() -> seamodem::ModemResult<()> {
//! use seamodem::{ModemBuilder, ModemLink};
//!
//! let mut modem = ModemBuilder::new().with_serial("/dev/ttyUSB0").build()?;
//! if modem.connect()? {
//!     modem.cmd_queue_packet(b"HelloSea")?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example
//! Ship a datagram through the transport, here against the simulator.
//!
//! ```
//! use seamodem::{DatagramSocket, ModemLink, ModemSimulator};
//!
//! let mut modem = ModemSimulator::instant();
//! modem.connect().unwrap();
//! let mut sock = DatagramSocket::new(modem);
//! sock.send(b"There is an art to flying".to_vec(), false);
//! # sock.stop();
//! ```
use std::{
    num::{ParseFloatError, ParseIntError},
    str::Utf8Error,
};

use thiserror::Error;

pub mod builder;
pub mod config;
pub mod datagram;
pub mod device;
pub mod modem;
pub mod protocol;
pub mod simulator;

pub use builder::ModemBuilder;
pub use config::{CONFIGURE_TIMEOUT, DEFAULT_TIMEOUT, Diagnostic, Role};
pub use datagram::{DatagramConfig, DatagramSocket, Unframed};
pub use device::{IoDevice, MockIoDev, SerialDevice};
pub use modem::{Modem, ModemLink};
pub use protocol::{Code, Direction, Sentence, StreamParser};
pub use simulator::ModemSimulator;

/// Errors for the modem driver and datagram transport.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Caller contract violation: command issued before `connect()`.
    #[error("connect to the modem before queueing data")]
    NotConnected,
    #[error("{0}")]
    InvalidParams(String),
    /// Sentence is structurally malformed. The parser has already
    /// resynchronized; the sentence is lost.
    #[error("{0}")]
    Parse(String),
    /// Sentence checksum disagrees with its contents.
    #[error("checksum mismatch: expected {expected} got {got}")]
    Checksum { expected: String, got: String },
    #[error(transparent)]
    ParseIntError(#[from] ParseIntError),
    #[error(transparent)]
    ParseFloatError(#[from] ParseFloatError),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
}

impl Error {
    /// Checksum errors are a subtype of parse errors: both cost one sentence
    /// and leave the stream resynchronized.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::Checksum { .. })
    }
}

pub type ModemResult<T> = std::result::Result<T, Error>;
