/* Arbitrary-size datagram transfers over the modem's fixed packet payload.

A datagram is framed as COBS(payload || crc8(payload)) || 0x00. COBS leaves
the body zero-free, so the trailing zero is an unambiguous terminator no
matter how the frame is split across packets. The CRC detects a dropped
packet corrupting the datagram; there is no retransmission, which keeps this
suitable for short messages only. */

use crate::modem::ModemLink;
use bytes::{Buf, BytesMut};
use crc::{CRC_8_SMBUS, Crc};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use log::{debug, warn};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

const FRAME_END: u8 = 0x00;
/// A COBS frame with no content; decodes to zero bytes.
const COBS_EMPTY_FRAME: u8 = 0x01;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Hex-and-printable rendering of a packet for debug logs.
fn pretty_packet(pkt: &[u8]) -> String {
    let hex: Vec<String> = pkt.iter().map(|b| format!("{:02x}", b)).collect();
    let text: String = pkt
        .iter()
        .map(|&b| if (32..127).contains(&b) { b as char } else { '.' })
        .collect();
    format!("[{}] {}", hex.join(" "), text)
}

/// Frames one datagram for transmission.
pub fn frame(data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 1);
    body.extend_from_slice(data);
    body.push(CRC8.checksum(data));
    let mut framed = cobs::encode_vec(&body);
    framed.push(FRAME_END);
    framed
}

/// Pads a short packet up to `payload_size` with empty COBS frames (or a
/// lone terminator when one byte remains). The receiver unframes padding to
/// a fill result or a decode error and discards it either way. Bare 0xFF
/// padding is not an option: the modem may drop all-same packets, and an
/// unterminated 0xFF run would be mistaken for frame content.
pub fn pad_packet(mut packet: Vec<u8>, payload_size: usize) -> Vec<u8> {
    while payload_size.saturating_sub(packet.len()) >= 2 {
        packet.push(COBS_EMPTY_FRAME);
        packet.push(FRAME_END);
    }
    if payload_size.saturating_sub(packet.len()) == 1 {
        packet.push(FRAME_END);
    }
    packet
}

/// Result of unframing one zero-terminated chunk of the receive stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unframed {
    /// A complete datagram.
    Datagram(Vec<u8>),
    /// Padding only; drop silently.
    Fill,
    /// COBS decode failed; the datagram is lost.
    DecodeError,
    /// CRC mismatch, typically a dropped packet in the middle of a datagram.
    CrcError,
}

/// Unframes one datagram. Accepts the frame with or without its trailing
/// terminator byte.
pub fn unframe(buf: &[u8]) -> Unframed {
    let buf = match buf.last() {
        Some(&FRAME_END) => &buf[..buf.len() - 1],
        _ => buf,
    };
    if buf.is_empty() {
        return Unframed::Fill;
    }
    let decoded = match cobs::decode_vec(buf) {
        Ok(decoded) => decoded,
        Err(_) => return Unframed::DecodeError,
    };
    let Some((&expected_crc, data)) = decoded.split_last() else {
        return Unframed::Fill;
    };
    if CRC8.checksum(data) != expected_crc {
        return Unframed::CrcError;
    }
    Unframed::Datagram(data.to_vec())
}

/// Capacities and pacing for a [`DatagramSocket`].
#[derive(Debug, Clone)]
pub struct DatagramConfig {
    /// Max datagrams waiting to be sent; 0 means unbounded.
    pub tx_max: usize,
    /// Max received datagrams held for the application; 0 means unbounded.
    pub rx_max: usize,
    /// Worker pause between pump cycles.
    pub sleep_time: Duration,
    /// Low-water mark on the modem transmit queue; the send pump tops the
    /// modem up whenever it drops below this.
    pub desired_queue_length: usize,
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            tx_max: 0,
            rx_max: 0,
            sleep_time: Duration::from_millis(200),
            desired_queue_length: 2,
        }
    }
}

/// Datagram transport over a connected modem.
///
/// Owns the modem exclusively: a background worker frames and packetizes
/// outgoing datagrams, keeps the modem transmit queue fed, and reassembles
/// inbound packets. The application interacts only through the two queues
/// and [`DatagramSocket::stop`].
pub struct DatagramSocket {
    tx_queue: Sender<Vec<u8>>,
    rx_queue: Receiver<Vec<u8>>,
    run: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl DatagramSocket {
    /// Starts a transport with default configuration. The modem should
    /// already be connected.
    pub fn new<M>(modem: M) -> Self
    where
        M: ModemLink + Send + 'static,
    {
        Self::with_config(modem, DatagramConfig::default())
    }

    pub fn with_config<M>(modem: M, config: DatagramConfig) -> Self
    where
        M: ModemLink + Send + 'static,
    {
        let (tx_send, tx_recv) = channel_of(config.tx_max);
        let (rx_send, rx_recv) = channel_of(config.rx_max);
        let run = Arc::new(AtomicBool::new(true));
        let pump = Pump {
            modem,
            tx_queue: tx_recv,
            rx_queue: rx_send,
            tx_buf: BytesMut::new(),
            rx_buf: BytesMut::new(),
            desired_queue_length: config.desired_queue_length,
            sleep_time: config.sleep_time,
            run: Arc::clone(&run),
            warned_unconnected: false,
        };
        let worker = thread::Builder::new()
            .name("modem-datagram".to_string())
            .spawn(move || pump.run())
            .expect("OS refused to spawn the datagram worker");
        Self {
            tx_queue: tx_send,
            rx_queue: rx_recv,
            run,
            worker: Some(worker),
        }
    }

    /// Enqueues a datagram for transmission. With `block` false, returns
    /// `false` when the send queue is full.
    pub fn send(&self, data: Vec<u8>, block: bool) -> bool {
        if block {
            self.tx_queue.send(data).is_ok()
        } else {
            self.tx_queue.try_send(data).is_ok()
        }
    }

    /// Next received datagram, if any. With `block` true, waits until one
    /// arrives (or the transport stops).
    pub fn receive(&self, block: bool) -> Option<Vec<u8>> {
        if block {
            self.rx_queue.recv().ok()
        } else {
            self.rx_queue.try_recv().ok()
        }
    }

    /// Stops and joins the worker. Idempotent.
    pub fn stop(&mut self) {
        self.run.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for DatagramSocket {
    fn drop(&mut self) {
        self.stop();
    }
}

fn channel_of(cap: usize) -> (Sender<Vec<u8>>, Receiver<Vec<u8>>) {
    if cap == 0 { unbounded() } else { bounded(cap) }
}

/// Worker state. Exclusively owns the modem and the staging buffers; errors
/// never propagate out of the worker, they are logged and cost at most one
/// datagram.
struct Pump<M: ModemLink> {
    modem: M,
    tx_queue: Receiver<Vec<u8>>,
    rx_queue: Sender<Vec<u8>>,
    tx_buf: BytesMut,
    rx_buf: BytesMut,
    desired_queue_length: usize,
    sleep_time: Duration,
    run: Arc<AtomicBool>,
    warned_unconnected: bool,
}

impl<M: ModemLink> Pump<M> {
    fn run(mut self) {
        while self.run.load(Ordering::Relaxed) {
            self.pump_send();
            self.pump_receive();
            thread::sleep(self.sleep_time);
        }
    }

    /// Tops the modem transmit queue up to the low-water mark, one packet
    /// per cycle.
    fn pump_send(&mut self) {
        let Some(payload_size) = self.modem.payload_size() else {
            if !self.warned_unconnected {
                warn!("modem is not connected; datagram transport is idle");
                self.warned_unconnected = true;
            }
            return;
        };

        match self.modem.cmd_get_queue_length() {
            Ok(Some(len)) if len < self.desired_queue_length => {}
            Ok(_) => return,
            Err(err) => {
                warn!("queue length query failed: {}", err);
                return;
            }
        }

        if self.tx_buf.len() < payload_size {
            // Not enough staged to fill a packet, pull in another datagram
            if let Ok(data) = self.tx_queue.try_recv() {
                self.tx_buf.extend_from_slice(&frame(&data));
            }
        }

        if self.tx_buf.is_empty() {
            return;
        }
        let take = payload_size.min(self.tx_buf.len());
        let packet = pad_packet(self.tx_buf.split_to(take).to_vec(), payload_size);
        debug!("queueing packet {}", pretty_packet(&packet));
        match self.modem.cmd_queue_packet(&packet) {
            Ok(true) => {}
            Ok(false) => warn!("modem rejected packet"),
            Err(err) => warn!("queueing packet failed: {}", err),
        }
    }

    /// Polls for one inbound packet and hands any completed datagrams to the
    /// receive queue.
    fn pump_receive(&mut self) {
        match self.modem.get_data_packet(Duration::ZERO) {
            Ok(Some(pkt)) => {
                debug!("got packet {}", pretty_packet(&pkt));
                self.rx_buf.extend_from_slice(&pkt);
            }
            Ok(None) => return,
            Err(err) => {
                warn!("receive poll failed: {}", err);
                return;
            }
        }

        while let Some(idx) = self.rx_buf.iter().position(|b| *b == FRAME_END) {
            let frame_bytes = self.rx_buf.split_to(idx);
            self.rx_buf.advance(1); // discard the terminator
            match unframe(&frame_bytes) {
                Unframed::Datagram(data) => {
                    if self.rx_queue.try_send(data).is_err() {
                        warn!("receive queue full, dropping datagram");
                    }
                }
                Unframed::Fill => {}
                Unframed::DecodeError => warn!("datagram decode error, dropping"),
                Unframed::CrcError => warn!("datagram crc mismatch, dropping"),
            }
        }
    }
}
