//! The PEI of a radio connected through a serial port.
//!
//! Commands are terminated with CRLF. A response consists of any number of
//! lines followed by a final `OK`, `ERROR` or `+CME ERROR: <n>`. The radio
//! may echo the command and pad the response with empty lines; both are
//! dropped.

use crate::pei::{Deadline, DisconnectCallback, Pei, PeiError};

use log::{debug, info, warn};
use serial2::SerialPort;
use std::{
    io::{self, Read, Write},
    path::Path,
    time::Duration,
};

/// Line speed of the PEI.
pub const BAUD_RATE: u32 = 38400;

/// How long a single read blocks before the deadline is checked again.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);
/// Time allowed for one attempt of the syntax clearing handshake.
const HANDSHAKE_ATTEMPT: Duration = Duration::from_secs(1);

/// A [`Pei`] on top of a byte stream, usually a [`SerialPort`].
pub struct SerialPei<T: Read + Write + Send = SerialPort> {
    name: String,
    port: Option<T>,
    buffer: Vec<u8>,
    disconnect: Option<DisconnectCallback>,
}

impl SerialPei<SerialPort> {
    /// Opens the serial device at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PeiError> {
        let path = path.as_ref();
        let mut port = SerialPort::open(path, BAUD_RATE)?;
        port.set_read_timeout(POLL_TIMEOUT)?;
        info!("opened {} at {} baud", path.display(), BAUD_RATE);
        Ok(Self::new(port, path.to_string_lossy()))
    }
}

impl<T: Read + Write + Send> SerialPei<T> {
    /// Wraps an open byte stream. Reads on `port` should time out regularly
    /// so the deadline of a request can be honored.
    pub fn new(port: T, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port: Some(port),
            buffer: Vec::new(),
            disconnect: None,
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), PeiError> {
        let port = self.port.as_mut().ok_or(PeiError::Closed)?;
        let written = port
            .write_all(line.as_bytes())
            .and_then(|_| port.write_all(b"\r\n"))
            .and_then(|_| port.flush());
        if let Err(err) = written {
            self.disconnected(&err);
            return Err(err.into());
        }
        Ok(())
    }

    fn read_line(&mut self, deadline: Deadline) -> Result<String, PeiError> {
        let mut chunk = [0u8; 256];
        loop {
            if let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=end).collect();
                return Ok(decode_latin1(&line).trim().to_owned());
            }
            if deadline.is_expired() {
                return Err(PeiError::Timeout);
            }
            let port = self.port.as_mut().ok_or(PeiError::Closed)?;
            match port.read(&mut chunk) {
                Ok(0) => {
                    let err = io::Error::from(io::ErrorKind::UnexpectedEof);
                    self.disconnected(&err);
                    return Err(PeiError::Closed);
                }
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(err) => {
                    self.disconnected(&err);
                    return Err(err.into());
                }
            }
        }
    }

    /// Discards everything the radio sent before the next command, e.g. the
    /// late response to a request that timed out. Returns once a read stays
    /// quiet for one poll or `deadline` passes.
    fn drain_input(&mut self, deadline: Deadline) -> Result<(), PeiError> {
        let mut chunk = [0u8; 256];
        self.buffer.clear();
        while !deadline.is_expired() {
            let port = self.port.as_mut().ok_or(PeiError::Closed)?;
            match port.read(&mut chunk) {
                Ok(0) => {
                    let err = io::Error::from(io::ErrorKind::UnexpectedEof);
                    self.disconnected(&err);
                    return Err(PeiError::Closed);
                }
                Ok(n) => debug!("{} discarding {} stale bytes", self.name, n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    return Ok(())
                }
                Err(err) => {
                    self.disconnected(&err);
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    fn disconnected(&mut self, err: &io::Error) {
        warn!("{} disconnected: {}", self.name, err);
        if self.release() {
            if let Some(callback) = self.disconnect.as_mut() {
                callback();
            }
        }
    }

    fn release(&mut self) -> bool {
        self.buffer.clear();
        self.port.take().is_some()
    }
}

impl<T: Read + Write + Send> Pei for SerialPei<T> {
    fn request(&mut self, command: &str, deadline: Deadline) -> Result<Vec<String>, PeiError> {
        if deadline.is_expired() {
            return Err(PeiError::Timeout);
        }
        self.drain_input(deadline)?;
        self.write_line(command)?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line(deadline)?;
            if line.is_empty() || line == command {
                continue;
            }
            if line == "OK" {
                return Ok(lines);
            }
            if line == "ERROR" || line.starts_with("+CME ERROR") {
                return Err(PeiError::Device(line));
            }
            lines.push(line);
        }
    }

    fn clear_syntax_errors(&mut self, deadline: Deadline) -> Result<(), PeiError> {
        loop {
            if deadline.is_expired() {
                return Err(PeiError::Timeout);
            }
            self.write_line("")?;
            let attempt = Deadline::after(deadline.remaining().min(HANDSHAKE_ATTEMPT));
            match self.request("AT", attempt) {
                Ok(_) => return Ok(()),
                Err(PeiError::Timeout | PeiError::Device(_)) => {
                    debug!("{} not ready yet", self.name);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn close(&mut self) {
        if !self.is_closed() {
            info!("closing {}", self.name);
        }
        self.release();
    }

    fn wait_until_closed(&mut self, _deadline: Deadline) {
        // the port is released synchronously by close
    }

    fn is_closed(&self) -> bool {
        self.port.is_none()
    }

    fn on_disconnect(&mut self, callback: DisconnectCallback) {
        self.disconnect = Some(callback);
    }
}

/// The radio is switched to ISO 8859-1, which maps every byte to the code
/// point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::{HashMap, VecDeque},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    /// Answers every complete command line with a scripted response.
    #[derive(Default)]
    struct FakePort {
        responses: HashMap<String, String>,
        input: VecDeque<u8>,
        pending: Vec<u8>,
        written: Arc<Mutex<Vec<String>>>,
        broken: bool,
    }

    impl FakePort {
        fn respond(mut self, command: &str, response: &str) -> Self {
            self.responses
                .insert(command.to_owned(), response.to_owned());
            self
        }
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.broken {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            if self.input.is_empty() {
                std::thread::sleep(Duration::from_millis(5));
                return Err(io::Error::from(io::ErrorKind::TimedOut));
            }
            let n = buf.len().min(self.input.len());
            for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.pending.extend_from_slice(buf);
            while let Some(end) = self.pending.windows(2).position(|w| w == b"\r\n") {
                let line: Vec<u8> = self.pending.drain(..end + 2).collect();
                let command = String::from_utf8_lossy(&line[..end]).to_string();
                if let Some(response) = self.responses.get(&command) {
                    self.input.extend(response.bytes());
                }
                self.written.lock().unwrap().push(command);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_millis(200))
    }

    #[test]
    fn response_lines_without_echo_and_final() {
        let port = FakePort::default().respond("AT+GCLI?", "AT+GCLI?\r\n+GCLI: 1\r\n\r\n100,caffe,26,5\r\n\r\nOK\r\n");
        let mut pei = SerialPei::new(port, "fake");
        let lines = pei.request("AT+GCLI?", deadline()).unwrap();
        assert_eq!(lines, vec!["+GCLI: 1", "100,caffe,26,5"]);
    }

    #[test]
    fn error_finals() {
        let port = FakePort::default()
            .respond("ATE0", "ERROR\r\n")
            .respond("AT+GPSPOS?", "+CME ERROR: 35\r\n");
        let mut pei = SerialPei::new(port, "fake");
        assert!(matches!(pei.request("ATE0", deadline()), Err(PeiError::Device(line)) if line == "ERROR"));
        assert!(matches!(
            pei.request("AT+GPSPOS?", deadline()),
            Err(PeiError::Device(line)) if line == "+CME ERROR: 35"
        ));
    }

    #[test]
    fn silence_times_out() {
        let mut pei = SerialPei::new(FakePort::default(), "fake");
        let result = pei.request("AT+CSQ?", Deadline::after(Duration::from_millis(30)));
        assert!(matches!(result, Err(PeiError::Timeout)));
        assert!(!pei.is_closed());
    }

    #[test]
    fn expired_deadline_sends_nothing() {
        let port = FakePort::default().respond("AT+GCLI?", "+GCLI: 1\r\n100,caffe,26,5\r\nOK\r\n");
        let written = Arc::clone(&port.written);
        let mut pei = SerialPei::new(port, "fake");
        let expired = Deadline::after(Duration::ZERO);
        assert!(matches!(pei.request("AT+GCLI?", expired), Err(PeiError::Timeout)));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn late_response_is_not_taken_for_the_next_one() {
        let mut port = FakePort::default()
            .respond("AT+GPSPOS?", "+GPSPOS: 12:00:00,N: 52_20.9931,E: 013_22.6631,7\r\nOK\r\n");
        // the cell list arrives after its request already gave up
        port.input.extend(b"+GCLI: 1\r\n100,caffe,26,5\r\nOK\r\n".iter());
        let mut pei = SerialPei::new(port, "fake");

        let lines = pei.request("AT+GPSPOS?", Deadline::after(Duration::from_secs(1))).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("+GPSPOS"));
    }

    #[test]
    fn orderly_close_does_not_report_a_disconnect() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut pei = SerialPei::new(FakePort::default(), "fake");
        pei.on_disconnect(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        pei.close();
        assert!(pei.is_closed());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn latin1_lines() {
        let port = FakePort::default().respond("AT+CNUM?", "+CNUM: \u{00fc}\r\nOK\r\n");
        let mut pei = SerialPei::new(port, "fake");
        // the fake writes UTF-8, so the umlaut arrives as two latin1 chars
        let lines = pei.request("AT+CNUM?", deadline()).unwrap();
        assert_eq!(lines, vec!["+CNUM: \u{00c3}\u{00bc}"]);
        assert_eq!(decode_latin1(&[0x2b, 0xfc]), "+\u{00fc}");
    }

    #[test]
    fn handshake_sends_empty_line_and_at() {
        let port = FakePort::default().respond("AT", "OK\r\n");
        let written = Arc::clone(&port.written);
        let mut pei = SerialPei::new(port, "fake");
        pei.clear_syntax_errors(deadline()).unwrap();
        assert_eq!(written.lock().unwrap().clone(), vec!["", "AT"]);
    }

    #[test]
    fn handshake_gives_up_at_the_deadline() {
        let mut pei = SerialPei::new(FakePort::default(), "fake");
        let result = pei.clear_syntax_errors(Deadline::after(Duration::from_millis(50)));
        assert!(matches!(result, Err(PeiError::Timeout)));
    }

    #[test]
    fn broken_port_disconnects() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let port = FakePort {
            broken: true,
            ..Default::default()
        };
        let mut pei = SerialPei::new(port, "fake");
        pei.on_disconnect(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(matches!(pei.request("AT", deadline()), Err(PeiError::Io(_))));
        assert!(pei.is_closed());
        assert!(matches!(pei.request("AT", deadline()), Err(PeiError::Closed)));
        pei.close();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
