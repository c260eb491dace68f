//! The peripheral equipment interface (PEI) of a radio: the one capability
//! the pipeline needs from a device is sending an AT command and getting
//! back the response lines.
//!
//! [`Pei`] is implemented by the serial transport ([`crate::serial_pei`]),
//! the demo generator ([`crate::dummy_pei`]) and [`TracingPei`], which wraps
//! any other implementation and records the conversation.

use log::debug;
use std::{
    fmt, io,
    io::Write,
    time::{Duration, Instant},
};

/// Callback invoked when the device goes away on its own.
pub type DisconnectCallback = Box<dyn FnMut() + Send>;

/// Everything that can go wrong talking to a radio.
#[derive(Debug)]
pub enum PeiError {
    /// The transport failed.
    Io(io::Error),
    /// No final response before the deadline.
    Timeout,
    /// The device is closed.
    Closed,
    /// The device answered with an error, e.g. `+CME ERROR: 35`.
    Device(String),
    /// The device answered without any lines.
    EmptyResponse,
    /// The response does not match the expected grammar.
    InvalidResponse(String),
}

impl fmt::Display for PeiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeiError::Io(err) => write!(f, "io error: {}", err),
            PeiError::Timeout => write!(f, "timeout"),
            PeiError::Closed => write!(f, "device closed"),
            PeiError::Device(line) => write!(f, "device error: {}", line),
            PeiError::EmptyResponse => write!(f, "empty response received"),
            PeiError::InvalidResponse(line) => write!(f, "invalid response: {}", line),
        }
    }
}

impl std::error::Error for PeiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PeiError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PeiError {
    fn from(value: io::Error) -> Self {
        if value.kind() == io::ErrorKind::TimedOut {
            Self::Timeout
        } else {
            Self::Io(value)
        }
    }
}

/// Point in time by which a group of requests must be done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline(Instant::now() + timeout)
    }

    /// Time left, zero once the deadline passed.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    #[allow(missing_docs)]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// A radio that understands AT commands.
///
/// Implementations are moved between threads but only ever used by one of
/// them at a time.
pub trait Pei: Send {
    /// Sends one command and returns the response lines without the final
    /// `OK`. Fails with [`PeiError::Timeout`] if the response is not complete
    /// when `deadline` passes.
    fn request(&mut self, command: &str, deadline: Deadline) -> Result<Vec<String>, PeiError>;

    /// Gets the command interpreter of the radio into a known state, e.g.
    /// after garbage was sent on the line.
    fn clear_syntax_errors(&mut self, deadline: Deadline) -> Result<(), PeiError>;

    /// Releases the device. Further requests fail with [`PeiError::Closed`].
    fn close(&mut self);

    /// Blocks until the device is released or the deadline passes.
    fn wait_until_closed(&mut self, deadline: Deadline);

    #[allow(missing_docs)]
    fn is_closed(&self) -> bool;

    /// Registers a callback that is invoked when the device goes away on its
    /// own. An orderly [`Pei::close`] does not invoke it.
    fn on_disconnect(&mut self, callback: DisconnectCallback);

    /// Sends several commands in order, stopping at the first failure.
    fn request_all(&mut self, commands: &[&str], deadline: Deadline) -> Result<(), PeiError> {
        for command in commands {
            self.request(command, deadline)?;
        }
        Ok(())
    }
}

impl<P: Pei + ?Sized> Pei for Box<P> {
    fn request(&mut self, command: &str, deadline: Deadline) -> Result<Vec<String>, PeiError> {
        (**self).request(command, deadline)
    }
    fn clear_syntax_errors(&mut self, deadline: Deadline) -> Result<(), PeiError> {
        (**self).clear_syntax_errors(deadline)
    }
    fn close(&mut self) {
        (**self).close()
    }
    fn wait_until_closed(&mut self, deadline: Deadline) {
        (**self).wait_until_closed(deadline)
    }
    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
    fn on_disconnect(&mut self, callback: DisconnectCallback) {
        (**self).on_disconnect(callback)
    }
}

/// Wraps a [`Pei`] and writes every exchange to `trace`: `> ` for commands,
/// `< ` for response lines and `! ` for errors.
pub struct TracingPei<P: Pei, W: Write + Send> {
    inner: P,
    trace: W,
}

impl<P: Pei, W: Write + Send> TracingPei<P, W> {
    #[allow(missing_docs)]
    pub fn new(inner: P, trace: W) -> Self {
        Self { inner, trace }
    }

    fn record(&mut self, prefix: &str, line: &str) {
        if let Err(err) = writeln!(self.trace, "{}{}", prefix, line) {
            debug!("cannot write PEI trace: {}", err);
        }
    }
}

impl<P: Pei, W: Write + Send> Pei for TracingPei<P, W> {
    fn request(&mut self, command: &str, deadline: Deadline) -> Result<Vec<String>, PeiError> {
        self.record("> ", command);
        let result = self.inner.request(command, deadline);
        match &result {
            Ok(lines) => {
                for line in lines {
                    self.record("< ", line);
                }
            }
            Err(err) => self.record("! ", &err.to_string()),
        }
        // keep the trace complete even if the process dies
        let _ = self.trace.flush();
        result
    }

    fn clear_syntax_errors(&mut self, deadline: Deadline) -> Result<(), PeiError> {
        self.record("> ", "<clear syntax errors>");
        self.inner.clear_syntax_errors(deadline)
    }

    fn close(&mut self) {
        self.record("> ", "<close>");
        let _ = self.trace.flush();
        self.inner.close()
    }

    fn wait_until_closed(&mut self, deadline: Deadline) {
        self.inner.wait_until_closed(deadline)
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn on_disconnect(&mut self, callback: DisconnectCallback) {
        self.inner.on_disconnect(callback)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedPei;
    use super::*;

    #[test]
    fn deadline_expires() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert!(!Deadline::after(Duration::from_secs(60)).is_expired());
    }

    #[test]
    fn request_all_stops_at_first_failure() {
        let mut pei = ScriptedPei::new().fail("ATE0", "ERROR");
        let deadline = Deadline::after(Duration::from_secs(1));
        let result = pei.request_all(&["ATZ", "ATE0", "AT+CSCS=8859-1"], deadline);
        assert!(matches!(result, Err(PeiError::Device(_))));
        assert_eq!(pei.commands(), vec!["ATZ", "ATE0"]);
    }

    #[test]
    fn tracing_records_the_conversation() {
        let mut trace = Vec::new();
        {
            let mut pei = TracingPei::new(ScriptedPei::radio(), &mut trace);
            let deadline = Deadline::after(Duration::from_secs(1));
            pei.request("AT+CSQ?", deadline).unwrap();
            pei.close();
            assert!(pei.is_closed());
        }
        let trace = String::from_utf8(trace).unwrap();
        assert_eq!(trace, "> AT+CSQ?\n< +CSQ: 26,99\n> <close>\n");
    }
}
