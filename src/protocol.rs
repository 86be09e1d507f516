/* Wire protocol sentence codec.

A sentence is `w` + direction + code, a comma-prefixed option list, an
optional `*HH` CRC-8 trailer and a line terminator. The payload option of
queue-packet/got-packet sentences is raw binary and may itself contain
commas, terminators and the checksum sigil. */

use crate::{Error, ModemResult};
use bytes::Bytes;
use crc::{CRC_8_SMBUS, Crc};

mod stream;
pub use stream::StreamParser;

pub(crate) const SOP: u8 = b'w';
pub(crate) const EOP: u8 = b'\n';
pub(crate) const DIR_CMD: u8 = b'c';
pub(crate) const DIR_RESP: u8 = b'r';
pub(crate) const CHECKSUM_SIGIL: u8 = b'*';

const ACK: &[u8] = b"a";

// crcmod's predefined "crc-8": poly 0x07, init 0, no reflection
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

pub(crate) fn is_eop(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

/// Formats the `*HH` trailer for the bytes framed so far.
pub(crate) fn checksum_trailer(data: &[u8]) -> [u8; 3] {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let csum = CRC8.checksum(data);
    [
        CHECKSUM_SIGIL,
        HEX[(csum >> 4) as usize],
        HEX[(csum & 0x0f) as usize],
    ]
}

/// Whether a sentence travels to the modem or from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Direction {
    Command,
    Response,
}
impl Direction {
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            Direction::Command => DIR_CMD,
            Direction::Response => DIR_RESP,
        }
    }
}
impl TryFrom<u8> for Direction {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            DIR_CMD => Ok(Direction::Command),
            DIR_RESP => Ok(Direction::Response),
            _ => Err(Error::Parse(format!(
                "Invalid direction {:?}",
                byte as char
            ))),
        }
    }
}

/// Sentence code. The code determines the option schema: most carry decimal
/// ASCII fields, `QueuePacket` and `GotPacket` carry a length and a binary
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Code {
    Version,
    PayloadSize,
    QueueLength,
    Diagnostic,
    GetSettings,
    SetSettings,
    QueuePacket,
    Flush,
    GotPacket,
}
impl Code {
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            Code::Version => b'v',
            Code::PayloadSize => b'n',
            Code::QueueLength => b'l',
            Code::Diagnostic => b'd',
            Code::GetSettings => b'c',
            Code::SetSettings => b's',
            Code::QueuePacket => b'q',
            Code::Flush => b'f',
            Code::GotPacket => b'p',
        }
    }

    /// Codes whose final option is a length-prefixed binary payload.
    pub(crate) fn has_binary_payload(self) -> bool {
        matches!(self, Code::QueuePacket | Code::GotPacket)
    }
}
impl TryFrom<u8> for Code {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'v' => Ok(Code::Version),
            b'n' => Ok(Code::PayloadSize),
            b'l' => Ok(Code::QueueLength),
            b'd' => Ok(Code::Diagnostic),
            b'c' => Ok(Code::GetSettings),
            b's' => Ok(Code::SetSettings),
            b'q' => Ok(Code::QueuePacket),
            b'f' => Ok(Code::Flush),
            b'p' => Ok(Code::GotPacket),
            _ => Err(Error::Parse(format!("Unknown code {:?}", byte as char))),
        }
    }
}

/// One protocol message on the serial wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub direction: Direction,
    pub code: Code,
    /// Raw option fields. Semantics depend on `code`.
    pub options: Vec<Bytes>,
}

impl Sentence {
    pub fn command(code: Code, options: Vec<Bytes>) -> Self {
        Self {
            direction: Direction::Command,
            code,
            options,
        }
    }

    /// First option is the modem's acknowledge byte.
    pub fn is_ack(&self) -> bool {
        self.options.first().map(|o| o.as_ref()) == Some(ACK)
    }

    /// Encodes the sentence including the trailing terminator.
    pub fn encode(&self, checksum: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.push(SOP);
        out.push(self.direction.as_byte());
        out.push(self.code.as_byte());
        for opt in &self.options {
            out.push(b',');
            out.extend_from_slice(opt);
        }
        if checksum {
            out.extend_from_slice(&checksum_trailer(&out));
        }
        out.push(EOP);
        out
    }

    /// Decodes one sentence, given everything between the opening `w` and the
    /// terminator (the terminator itself is stripped by the stream parser).
    pub fn decode(raw: &[u8]) -> ModemResult<Self> {
        if raw.first() != Some(&SOP) {
            return Err(Error::Parse(format!(
                "Missing SOP: {}",
                String::from_utf8_lossy(raw)
            )));
        }
        // Shortest possible sentence is SOP + direction + code
        if raw.len() < 3 {
            return Err(Error::Parse("Sentence is too short".to_string()));
        }
        let direction = Direction::try_from(raw[1])?;

        let mut body = raw;
        if body[body.len() - 3] == CHECKSUM_SIGIL {
            let (rest, got) = body.split_at(body.len() - 3);
            let expected = checksum_trailer(rest);
            if got != expected {
                return Err(Error::Checksum {
                    expected: String::from_utf8_lossy(&expected).into_owned(),
                    got: String::from_utf8_lossy(got).into_owned(),
                });
            }
            body = rest;
            if body.len() < 3 {
                return Err(Error::Parse("Sentence is too short".to_string()));
            }
        }

        let code = Code::try_from(body[2])?;
        // Binary payloads may contain commas, so only the length option is
        // split off for those codes
        let fragments: Vec<&[u8]> = if code.has_binary_payload() {
            body.splitn(3, |b| *b == b',').collect()
        } else {
            body.split(|b| *b == b',').collect()
        };
        let options = fragments[1..]
            .iter()
            .map(|f| Bytes::copy_from_slice(f))
            .collect();

        Ok(Sentence {
            direction,
            code,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn opts(parts: &[&[u8]]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
    }

    #[test]
    fn version_command_encodes_bare() {
        let s = Sentence::command(Code::Version, Vec::new());
        assert_eq!(s.encode(false), b"wcv\n");
    }

    #[test]
    fn version_response_with_checksum_decodes() {
        let s = Sentence::decode(b"wrv,1,0,1*44").unwrap();
        assert_eq!(s.direction, Direction::Response);
        assert_eq!(s.code, Code::Version);
        assert_eq!(s.options, opts(&[b"1" as &[u8], b"0", b"1"]));
    }

    #[test]
    fn packet_payload_is_not_split_on_commas() {
        let s = Sentence::decode(b"wrp,8,12345678*83").unwrap();
        assert_eq!(s.code, Code::GotPacket);
        assert_eq!(s.options, opts(&[b"8", b"12345678"]));

        let s = Sentence::decode(b"wrp,8,a,b,c,d,").unwrap();
        assert_eq!(s.options, opts(&[b"8", b"a,b,c,d,"]));
    }

    #[test]
    fn packet_payload_may_contain_terminators() {
        let s = Sentence::decode(b"wrp,8,\n\n\n\n\n\n\n*93").unwrap();
        assert_eq!(s.code, Code::GotPacket);
        assert_eq!(s.options, opts(&[b"8", b"\n\n\n\n\n\n\n"]));
    }

    #[test]
    fn checksum_mismatch_is_detected() {
        let err = Sentence::decode(b"wrp,8,HelloSea*ff").unwrap_err();
        assert!(matches!(err, Error::Checksum { .. }));
        assert!(err.is_parse());
    }

    #[test]
    fn invalid_direction_is_rejected() {
        let err = Sentence::decode(b"wzx").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn unknown_code_is_rejected() {
        let err = Sentence::decode(b"wr?").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn missing_sop_is_rejected() {
        assert!(Sentence::decode(b"xrv,1").is_err());
        assert!(Sentence::decode(b"").is_err());
    }

    #[test]
    fn round_trip_with_and_without_checksum() {
        let samples = [
            Sentence::command(Code::Version, Vec::new()),
            Sentence::command(Code::SetSettings, opts(&[b"a" as &[u8], b"4"])),
            Sentence::command(Code::QueuePacket, opts(&[b"8", b"Hi,There"])),
            Sentence {
                direction: Direction::Response,
                code: Code::Diagnostic,
                options: opts(&[b"y", b"10", b"0", b"3.5"]),
            },
        ];
        for s in samples {
            for checksum in [false, true] {
                let wire = s.encode(checksum);
                let back = Sentence::decode(&wire[..wire.len() - 1]).unwrap();
                assert_eq!(back, s);
            }
        }
    }

    #[test]
    fn ack_detection() {
        assert!(Sentence::decode(b"wrf,a").unwrap().is_ack());
        assert!(!Sentence::decode(b"wrf,n").unwrap().is_ack());
        assert!(!Sentence::decode(b"wrf").unwrap().is_ack());
    }
}
