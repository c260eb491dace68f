//! Lifecycle of the connection to a radio.
//!
//! ```text
//! Disconnected --open--> Opening --init ok--> Running --close--> Closing --> Disconnected
//!                           \--init failed--> Disconnected
//! ```
//!
//! While running, the device is owned by the scan loop thread. Closing stops
//! the loop, takes the device back, resets the radio and releases it.

use crate::pei::{Deadline, Pei, PeiError};
use crate::scan_loop::ScanLoop;

use crossbeam::channel::{self, Sender};
use log::{debug, error, info, warn};
use std::{
    fmt,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

/// Commands sent to initialize the radio, in order.
pub const INIT_COMMANDS: [&str; 3] = ["ATZ", "ATE0", "AT+CSCS=8859-1"];
/// Command sent to reset the radio before releasing it.
pub const RESET_COMMAND: &str = "ATZ";

/// Default time allowed for initialization and shutdown.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state of a [`Radio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    #[allow(missing_docs)]
    Disconnected,
    /// Initializing the device
    Opening,
    /// The scan loop is running
    Running,
    /// Waiting for the scan loop to stop and resetting the device
    Closing,
}

impl RadioState {
    /// The transition table of the lifecycle.
    pub fn can_transition_to(self, next: RadioState) -> bool {
        use RadioState::*;
        matches!(
            (self, next),
            (Disconnected, Opening)
                | (Opening, Running)
                | (Opening, Disconnected)
                | (Running, Closing)
                | (Closing, Disconnected)
        )
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Failures of the radio lifecycle.
#[derive(Debug)]
pub enum RadioError {
    /// The requested operation is not allowed in the current state.
    InvalidTransition {
        #[allow(missing_docs)]
        from: RadioState,
        #[allow(missing_docs)]
        to: RadioState,
    },
    /// Talking to the device failed.
    Pei(PeiError),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::InvalidTransition { from, to } => {
                write!(f, "invalid radio state transition {} -> {}", from, to)
            }
            RadioError::Pei(err) => write!(f, "cannot initialize radio: {}", err),
        }
    }
}

impl std::error::Error for RadioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RadioError::Pei(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PeiError> for RadioError {
    fn from(value: PeiError) -> Self {
        Self::Pei(value)
    }
}

struct RunningScan {
    stop: Sender<()>,
    handle: JoinHandle<Box<dyn Pei>>,
}

/// Owns the device and the scan loop that uses it.
pub struct Radio {
    state: RadioState,
    state_out: Option<Sender<RadioState>>,
    command_timeout: Duration,
    on_disconnect: Option<Arc<dyn Fn() + Send + Sync>>,
    scan: Option<RunningScan>,
}

impl Radio {
    /// A disconnected radio. Every state change is sent to `state_out`.
    pub fn new(state_out: Option<Sender<RadioState>>) -> Self {
        Self {
            state: RadioState::Disconnected,
            state_out,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            on_disconnect: None,
            scan: None,
        }
    }

    /// Sets the time allowed for initialization and shutdown.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Registers a callback for devices that close on their own. Takes
    /// effect with the next [`Radio::open`].
    pub fn on_disconnect<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(callback));
    }

    #[allow(missing_docs)]
    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Initializes the device and starts `scan_loop` on it. On failure the
    /// device is released and the radio is disconnected again.
    pub fn open(&mut self, mut pei: Box<dyn Pei>, scan_loop: ScanLoop) -> Result<(), RadioError> {
        self.transition_to(RadioState::Opening)?;

        if let Some(callback) = &self.on_disconnect {
            let callback = Arc::clone(callback);
            pei.on_disconnect(Box::new(move || callback()));
        }

        if let Err(err) = self.initialize(pei.as_mut()) {
            error!("cannot initialize radio: {}", err);
            pei.close();
            self.transition_to(RadioState::Disconnected)?;
            return Err(err.into());
        }

        let (stop, stop_rx) = channel::bounded::<()>(0);
        let handle = thread::spawn(move || {
            scan_loop.run(pei.as_mut(), &stop_rx);
            pei
        });
        self.scan = Some(RunningScan { stop, handle });

        self.transition_to(RadioState::Running)
    }

    /// Stops the scan loop, resets the device and releases it. Does nothing
    /// unless the radio is running.
    pub fn close(&mut self) {
        if self.state != RadioState::Running {
            debug!("radio is {}, nothing to close", self.state);
            return;
        }
        if let Err(err) = self.transition_to(RadioState::Closing) {
            warn!("{}", err);
            return;
        }

        if let Some(RunningScan { stop, handle }) = self.scan.take() {
            drop(stop);
            match handle.join() {
                Ok(mut pei) => self.shutdown(pei.as_mut()),
                Err(_) => error!("scan loop panicked, the device was not reset"),
            }
        }

        if let Err(err) = self.transition_to(RadioState::Disconnected) {
            warn!("{}", err);
        }
    }

    fn initialize(&self, pei: &mut dyn Pei) -> Result<(), PeiError> {
        let deadline = Deadline::after(self.command_timeout);
        pei.clear_syntax_errors(deadline)?;
        pei.request_all(&INIT_COMMANDS, deadline)
    }

    fn shutdown(&self, pei: &mut dyn Pei) {
        let deadline = Deadline::after(self.command_timeout);
        if let Err(err) = pei.request(RESET_COMMAND, deadline) {
            warn!("cannot shutdown radio properly: {}", err);
        }
        pei.close();
        pei.wait_until_closed(deadline);
        info!("radio closed");
    }

    fn transition_to(&mut self, next: RadioState) -> Result<(), RadioError> {
        if !self.state.can_transition_to(next) {
            return Err(RadioError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("radio {} -> {}", self.state, next);
        self.state = next;
        if let Some(state_out) = &self.state_out {
            if state_out.send(next).is_err() {
                debug!("nobody listens to radio state changes");
            }
        }
        Ok(())
    }
}

impl Drop for Radio {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::pei::testing::ScriptedPei;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scan_loop() -> (ScanLoop, channel::Receiver<crate::scan_loop::RadioData>) {
        ScanLoop::new(
            ScanConfig::new(Duration::from_millis(20), Duration::from_millis(20)),
            None,
        )
    }

    #[test]
    fn transition_table() {
        use RadioState::*;
        assert!(Disconnected.can_transition_to(Opening));
        assert!(Opening.can_transition_to(Running));
        assert!(Opening.can_transition_to(Disconnected));
        assert!(Running.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Disconnected));
        assert!(!Disconnected.can_transition_to(Running));
        assert!(!Running.can_transition_to(Opening));
        assert!(!Closing.can_transition_to(Running));
        assert!(!Running.can_transition_to(Disconnected));
    }

    #[test]
    fn open_scan_close() {
        let (states_tx, states) = channel::unbounded();
        let mut radio = Radio::new(Some(states_tx));
        let pei = ScriptedPei::radio();
        let commands = Arc::clone(&pei.log);
        let (scan_loop, data) = scan_loop();

        radio.open(Box::new(pei), scan_loop).unwrap();
        assert_eq!(radio.state(), RadioState::Running);

        let published = data.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(published.measurement.len(), 2);

        radio.close();
        assert_eq!(radio.state(), RadioState::Disconnected);

        let commands = commands.lock().unwrap().clone();
        assert_eq!(&commands[..4], &["<clear>", "ATZ", "ATE0", "AT+CSCS=8859-1"]);
        assert_eq!(&commands[commands.len() - 2..], &["ATZ", "<close>"]);

        let states: Vec<RadioState> = states.try_iter().collect();
        assert_eq!(
            states,
            vec![
                RadioState::Opening,
                RadioState::Running,
                RadioState::Closing,
                RadioState::Disconnected
            ]
        );
    }

    #[test]
    fn close_is_idempotent() {
        let (states_tx, states) = channel::unbounded();
        let mut radio = Radio::new(Some(states_tx));
        let (scan_loop, _data) = scan_loop();
        radio.open(Box::new(ScriptedPei::radio()), scan_loop).unwrap();

        radio.close();
        radio.close();
        drop(radio);
        assert_eq!(states.try_iter().count(), 4);
    }

    #[test]
    fn failed_initialization_disconnects() {
        let (states_tx, states) = channel::unbounded();
        let mut radio = Radio::new(Some(states_tx));
        let pei = ScriptedPei::radio().fail("ATE0", "ERROR");
        let commands = Arc::clone(&pei.log);
        let (scan_loop, _data) = scan_loop();

        let result = radio.open(Box::new(pei), scan_loop);
        assert!(matches!(result, Err(RadioError::Pei(PeiError::Device(_)))));
        assert_eq!(radio.state(), RadioState::Disconnected);
        assert_eq!(commands.lock().unwrap().last().unwrap(), "<close>");
        assert_eq!(
            states.try_iter().collect::<Vec<_>>(),
            vec![RadioState::Opening, RadioState::Disconnected]
        );
    }

    #[test]
    fn failed_handshake_disconnects() {
        let mut radio = Radio::new(None);
        let mut pei = ScriptedPei::radio();
        pei.fail_clear = true;
        let (scan_loop, _data) = scan_loop();
        assert!(radio.open(Box::new(pei), scan_loop).is_err());
        assert_eq!(radio.state(), RadioState::Disconnected);
    }

    #[test]
    fn cannot_open_twice() {
        let mut radio = Radio::new(None);
        let (first, _data) = scan_loop();
        radio.open(Box::new(ScriptedPei::radio()), first).unwrap();
        let (second, _data2) = scan_loop();
        let result = radio.open(Box::new(ScriptedPei::radio()), second);
        assert!(matches!(
            result,
            Err(RadioError::InvalidTransition {
                from: RadioState::Running,
                to: RadioState::Opening
            })
        ));
        radio.close();
    }

    #[test]
    fn orderly_close_is_no_disconnect() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut radio = Radio::new(None);
        radio.on_disconnect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (scan_loop, _data) = scan_loop();
        radio.open(Box::new(ScriptedPei::radio()), scan_loop).unwrap();
        radio.close();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disconnect_callback_is_forwarded() {
        let (hung_up_tx, hung_up) = channel::unbounded();
        let mut radio = Radio::new(None);
        radio.on_disconnect(move || {
            let _ = hung_up_tx.send(());
        });
        let pei = ScriptedPei::radio().hanging_up_on("AT+GCLI?");
        let (scan_loop, _data) = scan_loop();
        radio.open(Box::new(pei), scan_loop).unwrap();

        assert!(hung_up.recv_timeout(Duration::from_secs(5)).is_ok());
        radio.close();
        assert!(hung_up.try_recv().is_err());
    }
}
