//! We use this mocking module in unit tests to emulate the PSU's serial port.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

type Responder = Box<dyn FnMut(&str) -> Option<Vec<u8>>>;

/// Our mock type used to emulate a serial port.
///
/// Every complete line written is handed to the responder; whatever it
/// returns is queued for the next reads. An empty read queue reports
/// `TimedOut`, like a real port with nothing to say.
pub struct MockSerial {
    /// Everything written to the port
    write_buffer: Vec<u8>,
    /// Bytes of the line currently being written
    pending_line: Vec<u8>,
    /// Complete lines written, terminator stripped
    lines: Vec<String>,
    /// Reply bytes waiting to be read
    read_buffer: VecDeque<u8>,
    responder: Option<Responder>,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
    /// Writes starting with this prefix fail
    failing_prefix: Option<Vec<u8>>,
}

impl MockSerial {
    /// Create a new MockSerial instance that never answers
    pub fn new() -> Self {
        Self {
            write_buffer: Vec::new(),
            pending_line: Vec::new(),
            lines: Vec::new(),
            read_buffer: VecDeque::new(),
            responder: None,
            should_error_on_write: false,
            should_error_on_read: false,
            failing_prefix: None,
        }
    }

    /// Install the function that answers each written line
    pub fn respond_with<F>(&mut self, responder: F)
    where
        F: FnMut(&str) -> Option<Vec<u8>> + 'static,
    {
        self.responder = Some(Box::new(responder));
    }

    /// Raw bytes written to this mock serial port
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Lines written so far, without terminators
    pub fn lines(&self) -> Vec<String> {
        self.lines.clone()
    }

    /// Written lines that are commands rather than queries
    pub fn commands(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|l| !l.ends_with('?') && !l.is_empty())
            .cloned()
            .collect()
    }

    /// Forget everything written so far
    pub fn clear_written_data(&mut self) {
        self.write_buffer.clear();
        self.lines.clear();
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Fail every write whose buffer starts with `prefix`, leaving other writes alone
    pub fn fail_writes_starting_with(&mut self, prefix: &str) {
        self.failing_prefix = Some(prefix.as_bytes().to_vec());
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }

    fn complete_line(&mut self) {
        let line = String::from_utf8_lossy(&self.pending_line).into_owned();
        self.pending_line.clear();
        if let Some(responder) = self.responder.as_mut() {
            if let Some(reply) = responder(&line) {
                self.read_buffer.extend(reply);
            }
        }
        self.lines.push(line);
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.should_error_on_write {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write error"));
        }
        if let Some(prefix) = &self.failing_prefix {
            if buf.starts_with(prefix) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write error"));
            }
        }
        for &byte in buf {
            self.write_buffer.push(byte);
            if byte == b'\n' {
                self.complete_line();
            } else {
                self.pending_line.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.should_error_on_write {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated flush error"));
        }
        Ok(())
    }
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.should_error_on_read {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated read error"));
        }
        if self.read_buffer.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let mut count = 0;
        while count < buf.len() {
            match self.read_buffer.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

/// Scripted Korad front panel for device-level tests.
///
/// Answers the identity, status and readback queries from its fields and
/// tracks setpoint commands the way the real unit does.
#[derive(Debug, Clone)]
pub struct PanelState {
    pub identity: String,
    pub status: u8,
    pub vset: f64,
    pub iset: f64,
    pub vout: f64,
    pub iout: f64,
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            identity: "KORAD KA3005P V4.2 SN:12345678".to_string(),
            status: 0x51,
            vset: 3.0,
            iset: 1.0,
            vout: 3.0,
            iout: 0.5,
        }
    }
}

impl PanelState {
    /// Reply to one written line, updating setpoints for commands
    pub fn answer(&mut self, line: &str) -> Option<Vec<u8>> {
        let text = |s: String| Some(format!("{}\n", s).into_bytes());
        match line {
            "" => None,
            "*IDN?" => text(self.identity.clone()),
            "STATUS?" => Some(vec![self.status, b'\n']),
            "VSET1?" => text(format!("{:.2}", self.vset)),
            "ISET1?" => text(format!("{:.3}", self.iset)),
            "VOUT1?" => text(format!("{:.2}", self.vout)),
            "IOUT1?" => text(format!("{:.3}", self.iout)),
            _ => {
                if let Some(v) = line.strip_prefix("VSET1:") {
                    self.vset = v.parse().unwrap_or(self.vset);
                } else if let Some(i) = line.strip_prefix("ISET1:") {
                    self.iset = i.parse().unwrap_or(self.iset);
                } else if line == "OUT1" {
                    self.status |= 0x40;
                } else if line == "OUT0" {
                    self.status &= !0x40;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_serial_creation() {
        let mut mock = MockSerial::new();
        assert!(mock.written_data().is_empty());
        let mut buf = [0u8; 4];
        let err = mock.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_responder_sees_complete_lines_only() {
        let mut mock = MockSerial::new();
        mock.respond_with(|line| Some(format!("echo:{}\n", line).into_bytes()));
        mock.write_all(b"VOU").unwrap();
        let mut buf = [0u8; 16];
        assert!(mock.read(&mut buf).is_err());
        mock.write_all(b"T1?\n").unwrap();
        let n = mock.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"echo:VOUT1?\n");
        assert_eq!(mock.lines(), vec!["VOUT1?".to_string()]);
    }

    #[test]
    fn test_commands_excludes_queries() {
        let mut mock = MockSerial::new();
        mock.write_all(b"STATUS?\nOUT1\n\nVSET1:5.00\n").unwrap();
        assert_eq!(mock.commands(), vec!["OUT1".to_string(), "VSET1:5.00".to_string()]);
    }

    #[test]
    fn test_prefix_write_failure_spares_other_lines() {
        let mut mock = MockSerial::new();
        mock.fail_writes_starting_with("VSET1:");
        assert!(mock.write_all(b"VSET1:5.00\n").is_err());
        assert!(mock.write_all(b"OUT0\n").is_ok());
        assert_eq!(mock.commands(), vec!["OUT0".to_string()]);
    }

    #[test]
    fn test_panel_tracks_setpoints_and_output() {
        let mut panel = PanelState::default();
        panel.answer("VSET1:4.20");
        panel.answer("OUT0");
        assert_eq!(panel.vset, 4.2);
        assert_eq!(panel.status & 0x40, 0);
        assert_eq!(panel.answer("VSET1?").unwrap(), b"4.20\n");
    }
}
