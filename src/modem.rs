// Command/response client for the modem sentence protocol.

use crate::{
    Error, ModemResult,
    config::{
        CHANNEL_BOUNDS, DEFAULT_TIMEOUT, Diagnostic, POLL_SLEEP, Role, SUPPORTED_MAJOR_VERSION,
    },
    device::IoDevice,
    protocol::{Code, EOP, Sentence, StreamParser},
};
use bytes::Bytes;
use log::{error, info, trace, warn};
use std::{
    collections::VecDeque,
    thread,
    time::{Duration, Instant},
};

/// The modem client contract.
///
/// Implemented by [`Modem`] over a real byte device and by
/// [`crate::ModemSimulator`] in-memory; the datagram transport accepts either.
pub trait ModemLink {
    /// Packet payload size reported at connect. `None` before a successful
    /// [`ModemLink::connect`].
    fn payload_size(&self) -> Option<usize>;

    /// Runs the connect handshake: reset, version check, payload size query.
    /// Returns `false` on timeout or an unsupported protocol version.
    fn connect(&mut self) -> ModemResult<bool>;

    /// Modem protocol version as `[major, minor, patch]`. `None` on timeout.
    fn cmd_get_version(&mut self, timeout: Duration) -> ModemResult<Option<[u32; 3]>>;

    /// Packet payload size in bytes. `None` on timeout.
    fn cmd_get_payload_size(&mut self) -> ModemResult<Option<usize>>;

    /// Sets modem role and acoustic channel (1-7). `true` on acknowledge,
    /// `false` on reject or timeout.
    fn cmd_configure(&mut self, role: Role, channel: u8, timeout: Duration) -> ModemResult<bool>;

    /// Number of packets waiting in the modem transmit queue. `None` on
    /// timeout.
    fn cmd_get_queue_length(&mut self) -> ModemResult<Option<usize>>;

    /// Empties the modem transmit queue. `true` on acknowledge.
    fn cmd_flush_queue(&mut self) -> ModemResult<bool>;

    /// Link health snapshot. `None` on timeout.
    fn cmd_get_diagnostic(&mut self) -> ModemResult<Option<Diagnostic>>;

    /// Queues one packet of exactly [`ModemLink::payload_size`] bytes for
    /// acoustic transmission. `true` on acknowledge, `false` on reject or
    /// timeout.
    fn cmd_queue_packet(&mut self, data: &[u8]) -> ModemResult<bool>;

    /// Payload of the next packet received from the peer modem, waiting up to
    /// `timeout` (zero polls without blocking). `None` if nothing arrived.
    fn get_data_packet(&mut self, timeout: Duration) -> ModemResult<Option<Bytes>>;
}

/// Client for a modem attached via an [`IoDevice`].
///
/// Single-threaded: every operation drives the shared parser state, so all
/// calls must come from one thread (or be externally serialized).
#[derive(Debug)]
pub struct Modem<D: IoDevice> {
    dev: D,
    parser: StreamParser,
    payload_size: Option<usize>,
    /// Received-packet notifications that arrived while a command response
    /// was being awaited.
    pending_rx: VecDeque<Sentence>,
}

impl<D: IoDevice> Modem<D> {
    pub fn new(dev: D) -> Self {
        Self {
            dev,
            parser: StreamParser::new(),
            payload_size: None,
            pending_rx: VecDeque::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.dev
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.dev
    }

    /// Writes a bare terminator so the modem discards any partial sentence
    /// left over from a previous session.
    pub fn send_reset(&mut self) -> ModemResult<()> {
        self.dev.write_all(&[EOP])
    }

    /// Reads whatever the device has waiting and returns the first complete
    /// sentence, or `None` if more input is needed. Parse and checksum
    /// failures are returned after the parser has resynchronized.
    pub fn get_packet(&mut self) -> ModemResult<Option<Sentence>> {
        let mut byte = [0u8; 1];
        while self.dev.bytes_waiting()? > 0 {
            if self.dev.read_available(&mut byte)? == 0 {
                continue;
            }
            if let Some(sentence) = self.parser.push(byte[0])? {
                trace!("got {:?}", sentence);
                return Ok(Some(sentence));
            }
        }
        Ok(None)
    }

    /// Encodes and writes a command, then waits for its response.
    fn request(
        &mut self,
        code: Code,
        options: Vec<Bytes>,
        timeout: Duration,
    ) -> ModemResult<Option<Sentence>> {
        let cmd = Sentence::command(code, options);
        self.dev.write_all(&cmd.encode(false))?;
        self.wait_sentence(code, timeout)
    }

    /// Polls for a sentence with the given code until the deadline expires.
    ///
    /// Unsolicited received-packet sentences seen meanwhile are queued for
    /// [`ModemLink::get_data_packet`]; malformed sentences are logged and
    /// skipped (they cost one sentence, never the command).
    fn wait_sentence(&mut self, code: Code, timeout: Duration) -> ModemResult<Option<Sentence>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.get_packet() {
                Ok(Some(msg)) if msg.code == code => return Ok(Some(msg)),
                Ok(Some(msg)) if msg.code == Code::GotPacket => {
                    trace!("queueing unsolicited packet while waiting for {}", code);
                    self.pending_rx.push_back(msg);
                }
                Ok(Some(msg)) => trace!("ignoring {} while waiting for {}", msg.code, code),
                Ok(None) => {}
                Err(err) if err.is_parse() => warn!("dropping sentence: {}", err),
                Err(err) => return Err(err),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_SLEEP);
        }
    }
}

fn packet_payload(pkt: &Sentence) -> Option<Bytes> {
    pkt.options.get(1).cloned()
}

/// Parses a decimal ASCII option field.
fn dec<T>(opt: &[u8]) -> ModemResult<T>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    Ok(std::str::from_utf8(opt)?.parse()?)
}

impl<D: IoDevice> ModemLink for Modem<D> {
    fn payload_size(&self) -> Option<usize> {
        self.payload_size
    }

    fn connect(&mut self) -> ModemResult<bool> {
        info!("Connect to acoustic modem on {}", self.dev.port_name());
        self.send_reset()?;

        let Some(version) = self.cmd_get_version(DEFAULT_TIMEOUT)? else {
            error!("Timeout connecting to modem");
            return Ok(false);
        };
        if version[0] != SUPPORTED_MAJOR_VERSION {
            warn!(
                "Unsupported major version {}.{}.{}",
                version[0], version[1], version[2]
            );
            return Ok(false);
        }
        info!(
            "Connect success. Modem protocol version {}.{}.{}",
            version[0], version[1], version[2]
        );

        let payload = match self.cmd_get_payload_size()? {
            Some(n) if n > 0 => n,
            _ => {
                warn!("Timeout getting payload size");
                return Ok(false);
            }
        };
        self.payload_size = Some(payload);
        info!("Connect success. Modem payload size {}", payload);
        Ok(true)
    }

    fn cmd_get_version(&mut self, timeout: Duration) -> ModemResult<Option<[u32; 3]>> {
        let Some(pkt) = self.request(Code::Version, Vec::new(), timeout)? else {
            return Ok(None);
        };
        if pkt.options.len() != 3 {
            return Err(Error::Parse(format!(
                "Expected 3 version fields, got {}",
                pkt.options.len()
            )));
        }
        Ok(Some([
            dec(&pkt.options[0])?,
            dec(&pkt.options[1])?,
            dec(&pkt.options[2])?,
        ]))
    }

    fn cmd_get_payload_size(&mut self) -> ModemResult<Option<usize>> {
        let Some(pkt) = self.request(Code::PayloadSize, Vec::new(), DEFAULT_TIMEOUT)? else {
            return Ok(None);
        };
        match pkt.options.first() {
            Some(opt) => Ok(Some(dec(opt)?)),
            None => Err(Error::Parse("Payload size response is empty".to_string())),
        }
    }

    fn cmd_configure(&mut self, role: Role, channel: u8, timeout: Duration) -> ModemResult<bool> {
        if !CHANNEL_BOUNDS.contains(&channel) {
            return Err(Error::InvalidParams(format!(
                "Out of range for channel: {}-{}, got {}",
                CHANNEL_BOUNDS.start(),
                CHANNEL_BOUNDS.end(),
                channel
            )));
        }
        let options = vec![
            Bytes::copy_from_slice(&[role.as_byte()]),
            Bytes::from(channel.to_string().into_bytes()),
        ];
        match self.request(Code::SetSettings, options, timeout)? {
            Some(pkt) => Ok(pkt.is_ack()),
            None => Ok(false),
        }
    }

    fn cmd_get_queue_length(&mut self) -> ModemResult<Option<usize>> {
        let Some(pkt) = self.request(Code::QueueLength, Vec::new(), DEFAULT_TIMEOUT)? else {
            return Ok(None);
        };
        match pkt.options.first() {
            Some(opt) => Ok(Some(dec(opt)?)),
            None => Err(Error::Parse("Queue length response is empty".to_string())),
        }
    }

    fn cmd_flush_queue(&mut self) -> ModemResult<bool> {
        match self.request(Code::Flush, Vec::new(), DEFAULT_TIMEOUT)? {
            Some(pkt) => Ok(pkt.is_ack()),
            None => Ok(false),
        }
    }

    fn cmd_get_diagnostic(&mut self) -> ModemResult<Option<Diagnostic>> {
        let Some(pkt) = self.request(Code::Diagnostic, Vec::new(), DEFAULT_TIMEOUT)? else {
            return Ok(None);
        };
        if pkt.options.len() != 4 {
            return Err(Error::Parse(format!(
                "Expected 4 diagnostic fields, got {}",
                pkt.options.len()
            )));
        }
        Ok(Some(Diagnostic {
            link_up: pkt.options[0].as_ref() == b"y",
            pkt_cnt: dec(&pkt.options[1])?,
            pkt_loss_cnt: dec(&pkt.options[2])?,
            bit_error_rate: std::str::from_utf8(&pkt.options[3])?.parse()?,
        }))
    }

    fn cmd_queue_packet(&mut self, data: &[u8]) -> ModemResult<bool> {
        let Some(payload_size) = self.payload_size else {
            return Err(Error::NotConnected);
        };
        if data.len() != payload_size {
            return Err(Error::InvalidParams(format!(
                "Invalid payload size {} expected {}",
                data.len(),
                payload_size
            )));
        }
        let options = vec![
            Bytes::from(payload_size.to_string().into_bytes()),
            Bytes::copy_from_slice(data),
        ];
        match self.request(Code::QueuePacket, options, DEFAULT_TIMEOUT)? {
            Some(pkt) => Ok(pkt.is_ack()),
            None => Ok(false),
        }
    }

    fn get_data_packet(&mut self, timeout: Duration) -> ModemResult<Option<Bytes>> {
        if let Some(pkt) = self.pending_rx.pop_front() {
            return Ok(packet_payload(&pkt));
        }
        if !timeout.is_zero() {
            let pkt = self.wait_sentence(Code::GotPacket, timeout)?;
            return Ok(pkt.as_ref().and_then(packet_payload));
        }
        // Non-blocking: one parse attempt
        match self.get_packet()? {
            Some(pkt) if pkt.code == Code::GotPacket => Ok(packet_payload(&pkt)),
            _ => Ok(None),
        }
    }
}
