// Deterministic in-memory modem, behavior-compatible with the real device
// for everything the client contract exposes.

use crate::{
    Error, ModemResult,
    config::{CHANNEL_BOUNDS, Diagnostic, Role},
    modem::ModemLink,
};
use bytes::Bytes;
use log::trace;
use std::{
    collections::VecDeque,
    thread,
    time::{Duration, Instant},
};

const SIM_VERSION: [u32; 3] = [1, 0, 1];
const SIM_PAYLOAD_SIZE: usize = 8;
/// Per-command processing time of the real modem firmware.
const PROCESS_DELAY: Duration = Duration::from_millis(50);
/// Fixture value reported by the hardware this simulator mimics.
const SIM_BIT_ERROR_RATE: f32 = 3.5;

type TransformHook = Box<dyn FnMut(Bytes) -> Option<Bytes> + Send>;

/// Simulated modem implementing [`ModemLink`] without a byte device.
///
/// Queued packets are looped back to [`ModemLink::get_data_packet`], subject
/// to three timing knobs: after a configure the link stays down for
/// `link_up_duration`, and deliveries are spaced by `packet_queue_duration` /
/// `next_packet_duration`.
pub struct ModemSimulator {
    tx_queue: VecDeque<Bytes>,
    link_up_duration: Duration,
    packet_queue_duration: Duration,
    next_packet_duration: Duration,
    delivered: u64,
    link_up_time: Instant,
    next_packet_time: Instant,
    payload_size: Option<usize>,
    transform: Option<TransformHook>,
}

impl ModemSimulator {
    pub fn new(
        link_up_duration: Duration,
        packet_queue_duration: Duration,
        next_packet_duration: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            tx_queue: VecDeque::new(),
            link_up_duration,
            packet_queue_duration,
            next_packet_duration,
            delivered: 0,
            link_up_time: now,
            next_packet_time: now + next_packet_duration,
            payload_size: None,
            transform: None,
        }
    }

    /// Simulator with no link-up or delivery-spacing delays.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    /// Installs a hook that may alter or drop each delivered packet, for
    /// loss and corruption experiments.
    pub fn set_transform(&mut self, hook: impl FnMut(Bytes) -> Option<Bytes> + Send + 'static) {
        self.transform = Some(Box::new(hook));
    }

    fn is_link_up(&self) -> bool {
        self.link_up_time <= Instant::now()
    }

    fn process(&self) {
        thread::sleep(PROCESS_DELAY);
    }
}

impl Default for ModemSimulator {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(3),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }
}

impl ModemLink for ModemSimulator {
    fn payload_size(&self) -> Option<usize> {
        self.payload_size
    }

    fn connect(&mut self) -> ModemResult<bool> {
        match self.cmd_get_version(Duration::ZERO)? {
            Some(version) if version[0] == 1 => {
                self.payload_size = self.cmd_get_payload_size()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn cmd_get_version(&mut self, _timeout: Duration) -> ModemResult<Option<[u32; 3]>> {
        self.process();
        Ok(Some(SIM_VERSION))
    }

    fn cmd_get_payload_size(&mut self) -> ModemResult<Option<usize>> {
        self.process();
        Ok(Some(SIM_PAYLOAD_SIZE))
    }

    fn cmd_configure(&mut self, _role: Role, channel: u8, _timeout: Duration) -> ModemResult<bool> {
        if !CHANNEL_BOUNDS.contains(&channel) {
            return Err(Error::InvalidParams(format!(
                "Out of range for channel: {}-{}, got {}",
                CHANNEL_BOUNDS.start(),
                CHANNEL_BOUNDS.end(),
                channel
            )));
        }
        self.process();
        // Reconfiguring drops the acoustic link until it re-establishes
        self.link_up_time = Instant::now() + self.link_up_duration;
        Ok(true)
    }

    fn cmd_get_queue_length(&mut self) -> ModemResult<Option<usize>> {
        self.process();
        Ok(Some(self.tx_queue.len()))
    }

    fn cmd_flush_queue(&mut self) -> ModemResult<bool> {
        self.process();
        self.tx_queue.clear();
        Ok(true)
    }

    fn cmd_get_diagnostic(&mut self) -> ModemResult<Option<Diagnostic>> {
        self.process();
        Ok(Some(Diagnostic {
            link_up: self.is_link_up(),
            pkt_cnt: self.delivered,
            pkt_loss_cnt: 0,
            bit_error_rate: SIM_BIT_ERROR_RATE,
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
        self.process();
        self.tx_queue.push_back(Bytes::copy_from_slice(data));
        let earliest = Instant::now() + self.packet_queue_duration;
        if earliest > self.next_packet_time {
            self.next_packet_time = earliest;
        }
        Ok(true)
    }

    fn get_data_packet(&mut self, timeout: Duration) -> ModemResult<Option<Bytes>> {
        if self.is_link_up() && Instant::now() >= self.next_packet_time {
            if let Some(pkt) = self.tx_queue.pop_front() {
                self.next_packet_time = Instant::now() + self.next_packet_duration;
                self.delivered += 1;
                let pkt = match self.transform.as_mut() {
                    Some(hook) => hook(pkt),
                    None => Some(pkt),
                };
                if pkt.is_none() {
                    trace!("transform hook dropped a packet");
                }
                return Ok(pkt);
            }
        }
        thread::sleep(timeout);
        Ok(None)
    }
}
