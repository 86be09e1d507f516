// Contains types and bounds restricting values related to the modem API
use crate::Error;
use std::{fmt::Display, ops::RangeInclusive, str::FromStr, time::Duration};

pub(crate) const CHANNEL_BOUNDS: RangeInclusive<u8> = 1..=7;

/// Supported protocol major version for the connect handshake.
pub(crate) const SUPPORTED_MAJOR_VERSION: u32 = 1;

/// Default response deadline for simple commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
/// Applying settings takes the modem noticeably longer than a status query.
pub const CONFIGURE_TIMEOUT: Duration = Duration::from_secs(2);
/// Sleep between polls while waiting for a response sentence.
pub(crate) const POLL_SLEEP: Duration = Duration::from_millis(1);

/// Acoustic role of the modem. Exactly one `A` and one `B` modem form a link
/// on a shared channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    A,
    B,
}
impl Role {
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            Role::A => b'a',
            Role::B => b'b',
        }
    }
}
impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase() {
            _ if s == "a" => Ok(Self::A),
            _ if s == "b" => Ok(Self::B),
            _ => Err(Error::InvalidParams(format!(
                "Supported roles are a or b, got {}",
                s
            ))),
        }
    }
}
impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::A => "a",
            Role::B => "b",
        };
        write!(f, "{}", s)
    }
}

/// Link health snapshot reported by the modem.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Diagnostic {
    /// Whether an acoustic connection to the peer modem is established.
    pub link_up: bool,
    /// Packets transmitted since power-on.
    pub pkt_cnt: u64,
    /// Packets the peer reported lost.
    pub pkt_loss_cnt: u64,
    pub bit_error_rate: f32,
}
