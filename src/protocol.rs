use crate::clock::{Clock, SystemClock};
use crate::constants::*;
use crate::error::Result;
use crate::status::identify;
use crate::transport::Transport;
use crate::types::DeviceIdentity;
use chrono::Timelike;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

/// Where and how to open the supply's serial port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Per-query read timeout
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Main Korad KAxxxxP interface
///
/// Owns the serial channel exclusively; every operation is a blocking
/// exchange on the calling thread.
pub struct Korad<P = Box<dyn SerialPort>> {
    pub(crate) transport: Transport<P>,
    pub(crate) clock: Box<dyn Clock>,
    identity: DeviceIdentity,
}

impl Korad {
    /// Open `port_name` at the default speed and timeout
    pub fn new(port_name: &str) -> Result<Self> {
        Self::connect(&ConnectionConfig {
            port: port_name.to_string(),
            ..ConnectionConfig::default()
        })
    }

    /// Open the configured port and identify the device on the other end
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.timeout)
            .open()?;
        Self::from_port(port, config.timeout)
    }

    /// List available serial ports
    pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
        Ok(serialport::available_ports()?)
    }
}

impl<P: Read + Write> Korad<P> {
    /// Wrap an already-open channel, using the system clock
    pub fn from_port(port: P, timeout: Duration) -> Result<Self> {
        Self::with_clock(port, timeout, Box::new(SystemClock::new()))
    }

    /// Wrap an already-open channel with a caller-supplied clock
    pub fn with_clock(port: P, timeout: Duration, clock: Box<dyn Clock>) -> Result<Self> {
        let mut transport = Transport::new(port, timeout);
        let identity = identify(&mut transport)?;
        info!(
            "Connected to {} (firmware {}, serial {})",
            identity.model, identity.firmware_version, identity.serial_number
        );
        Ok(Self {
            transport,
            clock,
            identity,
        })
    }

    /// Identity parsed during the handshake
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Clock used for timestamps and every blocking wait
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Set the output voltage limit, in volts (two decimals on the wire)
    pub fn set_voltage(&mut self, volts: f64) -> Result<()> {
        self.transport.send(&format!("{}{:.2}", CMD_SET_VOLTAGE, volts))
    }

    /// Set the output current limit, in amps (two decimals on the wire)
    pub fn set_current(&mut self, amps: f64) -> Result<()> {
        self.transport.send(&format!("{}{:.2}", CMD_SET_CURRENT, amps))
    }

    /// Switch the output on or off
    pub fn set_output(&mut self, enabled: bool) -> Result<()> {
        self.transport.send(&switch(CMD_OUTPUT, enabled))
    }

    pub fn enable(&mut self) -> Result<()> {
        self.set_output(true)
    }

    pub fn disable(&mut self) -> Result<()> {
        self.set_output(false)
    }

    /// Over-voltage protection on/off
    pub fn set_ovp(&mut self, enabled: bool) -> Result<()> {
        self.transport.send(&switch(CMD_OVP, enabled))
    }

    /// Over-current protection on/off
    pub fn set_ocp(&mut self, enabled: bool) -> Result<()> {
        self.transport.send(&switch(CMD_OCP, enabled))
    }

    /// Save the panel settings to memory `slot` (1-5).
    ///
    /// Slots outside 1-5 are ignored, nothing is sent.
    pub fn store_preset(&mut self, slot: u8) -> Result<()> {
        self.preset(CMD_STORE, slot)
    }

    /// Load the panel settings from memory `slot` (1-5).
    ///
    /// Slots outside 1-5 are ignored, nothing is sent.
    pub fn recall_preset(&mut self, slot: u8) -> Result<()> {
        self.preset(CMD_RECALL, slot)
    }

    fn preset(&mut self, command: &str, slot: u8) -> Result<()> {
        if !PRESET_SLOTS.contains(&slot) {
            warn!("Ignoring {} for preset slot {} (valid: 1-5)", command, slot);
            return Ok(());
        }
        self.transport.send(&format!("{}{}", command, slot))
    }

    /// Turn the panel into a clock: output off, `HH.MM` volts and `0.SS` amps
    pub fn show_time<T: Timelike>(&mut self, time: &T) -> Result<()> {
        self.disable()?;
        let volts = f64::from(time.hour()) + f64::from(time.minute()) / 100.0;
        let amps = f64::from(time.second()) / 100.0;
        self.set_voltage(volts)?;
        self.set_current(amps)
    }

    #[cfg(test)]
    pub(crate) fn port_mut(&mut self) -> &mut P {
        self.transport.port_mut()
    }
}

fn switch(command: &str, on: bool) -> String {
    format!("{}{}", command, if on { '1' } else { '0' })
}
