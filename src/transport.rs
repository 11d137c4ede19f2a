//! Line framing over the serial channel.

use crate::constants::LINE_TERMINATOR;
use crate::error::Result;
use log::trace;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Frames ASCII commands onto an exclusively-owned byte channel.
///
/// `send` is fire-and-forget; `query` sends and then reads one reply line,
/// giving up after `timeout`. An empty reply means "no data" and is not an
/// error at this layer.
pub struct Transport<P> {
    port: P,
    timeout: Duration,
}

impl<P: Read + Write> Transport<P> {
    pub fn new(port: P, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Write `command` plus the line terminator. Non-ASCII characters are dropped.
    pub fn send(&mut self, command: &str) -> Result<()> {
        let mut frame: Vec<u8> = command.chars().filter(char::is_ascii).map(|c| c as u8).collect();
        trace!("TX {:?}", String::from_utf8_lossy(&frame));
        frame.push(LINE_TERMINATOR);
        self.port.write_all(&frame)?;
        self.port.flush()?;
        Ok(())
    }

    /// Send `command` and return the raw reply line, terminator included.
    pub fn query(&mut self, command: &str) -> Result<Vec<u8>> {
        self.send(command)?;
        let reply = self.read_line()?;
        trace!("RX {:02X?}", reply);
        Ok(reply)
    }

    /// Like [`query`](Self::query), decoded as trimmed ASCII text.
    pub fn query_text(&mut self, command: &str) -> Result<String> {
        let reply = self.query(command)?;
        let text: String = reply
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| b as char)
            .collect();
        Ok(text.trim().to_string())
    }

    /// Read until a terminator or until the timeout elapses.
    fn read_line(&mut self) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == LINE_TERMINATOR {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    break
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        Ok(line)
    }

    #[cfg(test)]
    pub(crate) fn port(&self) -> &P {
        &self.port
    }

    #[cfg(test)]
    pub(crate) fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}
