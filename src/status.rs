//! Status decoding: identity handshake, status byte, snapshots.

use crate::constants::*;
use crate::error::{ProtocolError, Result};
use crate::protocol::Korad;
use crate::transport::Transport;
use crate::types::*;
use std::io::{Read, Write};

impl From<u8> for StatusByte {
    fn from(byte: u8) -> Self {
        let mode = |bit: u8| {
            if byte & bit != 0 {
                Mode::ConstantVoltage
            } else {
                Mode::ConstantCurrent
            }
        };
        let tracking = match (byte >> 2) & 0x3 {
            0b00 => Tracking::Independent,
            0b11 => Tracking::Parallel,
            _ => Tracking::Series,
        };
        StatusByte {
            mode: mode(0x01),
            ch1_mode: mode(0x02),
            tracking,
            beep: byte & 0x10 != 0,
            locked: byte & 0x20 != 0,
            output_enabled: byte & 0x40 != 0,
        }
    }
}

/// Parse `KORAD KA<digits>P V<version> SN:<digits>` from an identity reply.
///
/// The pattern may appear anywhere in the reply; surrounding noise is ignored.
pub fn parse_identity(reply: &str) -> Result<DeviceIdentity> {
    let unrecognized = || ProtocolError::UnrecognizedDevice(reply.to_string());

    let start = reply.find(IDENTITY_PREFIX).ok_or_else(unrecognized)?;
    let rest = &reply[start + IDENTITY_PREFIX.len()..];

    let model_digits = leading(rest, |c| c.is_ascii_digit());
    let rest = rest[model_digits.len()..]
        .strip_prefix("P V")
        .filter(|_| !model_digits.is_empty())
        .ok_or_else(unrecognized)?;

    let version = leading(rest, |c| c.is_ascii_digit() || c == '.');
    if !is_version(version) {
        return Err(unrecognized().into());
    }
    let rest = rest[version.len()..]
        .strip_prefix(" SN:")
        .ok_or_else(unrecognized)?;

    let serial = leading(rest, |c| c.is_ascii_digit());
    if serial.is_empty() {
        return Err(unrecognized().into());
    }

    Ok(DeviceIdentity {
        model: format!("KA{}P", model_digits),
        firmware_version: version.to_string(),
        serial_number: serial.to_string(),
    })
}

/// Longest prefix of `s` whose characters all satisfy `pred`
fn leading(s: &str, pred: impl Fn(char) -> bool) -> &str {
    let end = s.find(|c: char| !pred(c)).unwrap_or(s.len());
    &s[..end]
}

/// Versions look like `4.2`, `42` or `1.12`: digits with at most one dot inside
fn is_version(v: &str) -> bool {
    let mut parts = v.split('.');
    let major = parts.next().unwrap_or("");
    let minor = parts.next();
    parts.next().is_none()
        && !major.is_empty()
        && minor.map_or(v.len() >= 2, |m| !m.is_empty())
}

/// Flush the device's line parser, then identify it
pub(crate) fn identify<P: Read + Write>(transport: &mut Transport<P>) -> Result<DeviceIdentity> {
    transport.query("")?;
    let reply = transport.query_text(CMD_IDENTIFY)?;
    if reply.is_empty() {
        return Err(ProtocolError::HandshakeFailed.into());
    }
    parse_identity(&reply)
}

/// Parse a numeric readback, refusing anything that is not a plain number
pub(crate) fn parse_reading(command: &'static str, reply: &str) -> Result<f64> {
    reply
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            ProtocolError::MalformedResponse {
                command,
                response: reply.to_string(),
            }
            .into()
        })
}

impl<P: Read + Write> Korad<P> {
    /// Read the raw status byte
    pub fn read_status(&mut self) -> Result<StatusByte> {
        let reply = self.transport.query(CMD_STATUS)?;
        let byte = *reply.first().ok_or(ProtocolError::NoResponse {
            command: CMD_STATUS,
        })?;
        Ok(StatusByte::from(byte))
    }

    /// Take a snapshot: status byte, both setpoints, measured V and I.
    ///
    /// The five queries go out back to back; the device gives no guarantee
    /// that they describe the same instant.
    pub fn read_snapshot(&mut self) -> Result<Snapshot> {
        let status = self.read_status()?;
        let captured_at = Timestamp::new(self.clock.wall(), self.clock.now());

        let settings = Settings {
            volts: self.read_number(CMD_GET_VSET)?,
            curr: self.read_number(CMD_GET_ISET)?,
        };
        let volts = self.read_number(CMD_GET_VOUT)?;
        let curr = self.read_number(CMD_GET_IOUT)?;

        Ok(Snapshot {
            status,
            settings,
            output: Measurement::new(volts, curr),
            device: self.identity().clone(),
            captured_at,
        })
    }

    fn read_number(&mut self, command: &'static str) -> Result<f64> {
        let reply = self.transport.query_text(command)?;
        parse_reading(command, &reply)
    }
}
