/* Defines the builder functionality for the modem client over serial
transport. */

use crate::{
    ModemResult,
    device::{MockIoDev, SerialDevice},
    modem::Modem,
};
use std::marker::PhantomData;

const DEFAULT_BAUD: u32 = 115_200;

// Type-state Builder states for the ModemBuilder
pub struct Init;
pub struct Serial;
pub struct Mock;

/// Type-State Builder for the modem client based on the backing device.
pub struct ModemBuilder<T> {
    com_port: Option<String>,
    baud_rate: Option<u32>,
    canned_input: Vec<u8>,
    _marker: PhantomData<T>,
}

impl ModemBuilder<Init> {
    /// Starts the type-state builder pattern
    pub fn new() -> ModemBuilder<Init> {
        Self {
            com_port: None,
            baud_rate: None,
            canned_input: Vec::new(),
            _marker: PhantomData,
        }
    }
    /// Continues in the path to build the client over a serial port.
    pub fn with_serial(self, com_port: &str) -> ModemBuilder<Serial> {
        ModemBuilder {
            com_port: Some(com_port.into()),
            baud_rate: Some(DEFAULT_BAUD),
            canned_input: Vec::new(),
            _marker: PhantomData,
        }
    }
    /// Continues in the path to build the client over an in-memory device
    /// preloaded with `input`, for tests and dry runs.
    pub fn with_mock(self, input: &[u8]) -> ModemBuilder<Mock> {
        ModemBuilder {
            com_port: None,
            baud_rate: None,
            canned_input: input.to_vec(),
            _marker: PhantomData,
        }
    }
}

impl Default for ModemBuilder<Init> {
    fn default() -> Self {
        Self::new()
    }
}

impl ModemBuilder<Serial> {
    pub fn baud(mut self, baud: u32) -> Self {
        self.baud_rate = Some(baud);
        self
    }
    /// Opens the serial port and builds the client. Call
    /// [`crate::ModemLink::connect`] on the result before queueing data.
    pub fn build(self) -> ModemResult<Modem<SerialDevice>> {
        let io = SerialDevice::open(
            self.com_port
                .as_ref()
                .expect("COM port required to get to serial build method."),
            self.baud_rate
                .expect("Baud rate required to get to serial build method."),
        )?;
        Ok(Modem::new(io))
    }
}

impl ModemBuilder<Mock> {
    pub fn build(self) -> Modem<MockIoDev> {
        Modem::new(MockIoDev::new(&self.canned_input))
    }
}
