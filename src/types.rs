use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::KoradError;

/// Model, firmware and serial number reported by `*IDN?`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub model: String,
    #[serde(rename = "version")]
    pub firmware_version: String,
    #[serde(rename = "serial")]
    pub serial_number: String,
}

/// Regulation mode of an output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "CV")]
    ConstantVoltage,
    #[serde(rename = "CC")]
    ConstantCurrent,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::ConstantVoltage => f.write_str("CV"),
            Mode::ConstantCurrent => f.write_str("CC"),
        }
    }
}

/// Channel tracking configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tracking {
    Independent,
    Parallel,
    Series,
}

/// Decoded `STATUS?` byte
///
/// | bit | meaning |
/// |-----|---------|
/// | 0 | channel 1 mode (set = CV) |
/// | 1 | channel 2 mode (set = CV) |
/// | 2-3 | tracking: `00` independent, `11` parallel, otherwise series |
/// | 4 | beep enabled |
/// | 5 | panel lock |
/// | 6 | output enabled |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusByte {
    #[serde(rename = "ch0_mode")]
    pub mode: Mode,
    pub ch1_mode: Mode,
    pub tracking: Tracking,
    pub beep: bool,
    #[serde(rename = "lock")]
    pub locked: bool,
    #[serde(rename = "output")]
    pub output_enabled: bool,
}

/// Programmed setpoints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub volts: f64,
    pub curr: f64,
}

/// Measured output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub volts: f64,
    pub curr: f64,
    pub power: f64,
}

impl Measurement {
    pub fn new(volts: f64, curr: f64) -> Self {
        Self {
            volts,
            curr,
            power: volts * curr,
        }
    }
}

/// When a snapshot was taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    pub iso: DateTime<Local>,
    /// Seconds since the Unix epoch, fractional
    pub epoch: f64,
    /// Monotonic clock reading, used for scheduling only
    #[serde(skip)]
    pub monotonic: Duration,
}

impl Timestamp {
    pub fn new(wall: DateTime<Local>, monotonic: Duration) -> Self {
        let epoch = wall.timestamp() as f64 + f64::from(wall.timestamp_subsec_micros()) / 1e6;
        Self {
            iso: wall,
            epoch,
            monotonic,
        }
    }
}

/// One near-simultaneous read of status, setpoints and measured output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: StatusByte,
    pub settings: Settings,
    pub output: Measurement,
    #[serde(rename = "hw")]
    pub device: DeviceIdentity,
    #[serde(rename = "time")]
    pub captured_at: Timestamp,
}

impl Snapshot {
    pub fn mode(&self) -> Mode {
        self.status.mode
    }

    pub fn output_enabled(&self) -> bool {
        self.status.output_enabled
    }

    pub fn set_volts(&self) -> f64 {
        self.settings.volts
    }

    pub fn set_curr(&self) -> f64 {
        self.settings.curr
    }

    pub fn meas_volts(&self) -> f64 {
        self.output.volts
    }

    pub fn meas_curr(&self) -> f64 {
        self.output.curr
    }

    pub fn meas_power(&self) -> f64 {
        self.output.power
    }

    /// Setpoint currently programmed for `parameter`
    pub fn setting(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Voltage => self.settings.volts,
            Parameter::Current => self.settings.curr,
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Hardware : Model {} / FW Ver {} / Serial# {}",
            self.device.model, self.device.firmware_version, self.device.serial_number
        )?;
        writeln!(f, "Set      : {:.2} V, {:.3} A", self.settings.volts, self.settings.curr)?;
        writeln!(
            f,
            "Meas     : {:.2} V, {:.3} A, {:.2} W",
            self.output.volts, self.output.curr, self.output.power
        )?;
        write!(
            f,
            "Status   : Output {}, Mode {}",
            if self.status.output_enabled { "ON" } else { "OFF" },
            self.status.mode
        )
    }
}

/// Setpoint that a slew can move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Voltage,
    Current,
}

impl FromStr for Parameter {
    type Err = KoradError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v" | "volts" | "voltage" => Ok(Parameter::Voltage),
            "i" | "curr" | "current" => Ok(Parameter::Current),
            _ => Err(KoradError::InvalidParameter(format!(
                "cannot slew {:?}, only voltage or current",
                s
            ))),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Voltage => f.write_str("voltage"),
            Parameter::Current => f.write_str("current"),
        }
    }
}
