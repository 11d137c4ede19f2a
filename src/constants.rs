//! Protocol constants for Korad KAxxxxP communication.
//!
//! This module defines the command strings of the line-oriented ASCII
//! protocol, serial port defaults, and the timing parameters used by the
//! slew, charge and sampling loops.

/// Line terminator appended to every outbound command
pub const LINE_TERMINATOR: u8 = b'\n';

/// Identity query
pub const CMD_IDENTIFY: &str = "*IDN?";

/// Status byte query
pub const CMD_STATUS: &str = "STATUS?";

/// Set-voltage query (channel 1)
pub const CMD_GET_VSET: &str = "VSET1?";

/// Set-current query (channel 1)
pub const CMD_GET_ISET: &str = "ISET1?";

/// Measured output voltage query (channel 1)
pub const CMD_GET_VOUT: &str = "VOUT1?";

/// Measured output current query (channel 1)
pub const CMD_GET_IOUT: &str = "IOUT1?";

/// Voltage setpoint command prefix, followed by `<volts:.2>`
pub const CMD_SET_VOLTAGE: &str = "VSET1:";

/// Current setpoint command prefix, followed by `<amps:.2>`
pub const CMD_SET_CURRENT: &str = "ISET1:";

/// Output enable prefix, followed by `0` or `1`
pub const CMD_OUTPUT: &str = "OUT";

/// Over-voltage protection prefix, followed by `0` or `1`
pub const CMD_OVP: &str = "OVP";

/// Over-current protection prefix, followed by `0` or `1`
pub const CMD_OCP: &str = "OCP";

/// Store panel settings into a memory slot
pub const CMD_STORE: &str = "SAV";

/// Recall panel settings from a memory slot
pub const CMD_RECALL: &str = "RCL";

/// Valid memory slots for store/recall
pub const PRESET_SLOTS: std::ops::RangeInclusive<u8> = 1..=5;

/// Vendor prefix of the identity response
pub const IDENTITY_PREFIX: &str = "KORAD KA";

/// Default baud rate (9600 bps)
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default serial port name
#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM3";

/// Default serial port name
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Delay after enabling the output before the first charge sample
pub const CHARGE_SETTLE_MS: u64 = 1000;

/// Default operator abort window before a charge is armed
pub const CHARGE_ARM_DELAY_SECS: u32 = 5;

/// Default charge rate in C
pub const DEFAULT_RATE_C: f64 = 0.5;

/// Default CC/CV transition voltage (single Li-ion cell)
pub const DEFAULT_CV_VOLTAGE: f64 = 4.175;

/// Default end-of-charge cutoff in C
pub const DEFAULT_CUTOFF_C: f64 = 0.02;

/// Default maximum charge duration in hours
pub const DEFAULT_MAX_HOURS: f64 = 4.0;

/// Default interval between charge polls in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u32 = 60;

/// Default number of steps for a slew
pub const DEFAULT_SLEW_STEPS: u32 = 20;

/// Default slew duration in seconds
pub const DEFAULT_SLEW_SECS: f64 = 5.0;
