//! The coordination actor: the single consumer of scan results.
//!
//! It owns the [`QualityReport`] and the active trace, and handles three
//! event sources one event at a time: user commands, scan results and the
//! shutdown signal. Each scan result is written to the trace before it is
//! aggregated and announced to the UI.

use crate::config::TraceConfig;
use crate::quality::{FieldReport, QualityReport};
use crate::radio::RadioState;
use crate::scan_loop::RadioData;
use crate::trace::{TraceError, TraceFile, TraceSink};
use crate::utm::UtmField;

use crossbeam::channel::{self, select, Receiver, Sender};
use log::{debug, error, info};
use std::{
    path::PathBuf,
    thread::{self, JoinHandle},
};

/// Everything the actor tells the user interface.
#[derive(Debug, Clone, PartialEq)]
pub enum UiMessage {
    /// A new scan result, with a snapshot of the field it was taken in.
    Update {
        #[allow(missing_docs)]
        data: RadioData,
        #[allow(missing_docs)]
        field: Option<FieldReport>,
    },
    /// Tracing was started or stopped.
    TracingStatus {
        #[allow(missing_docs)]
        path: Option<PathBuf>,
        #[allow(missing_docs)]
        active: bool,
    },
    /// Informational text.
    Message(String),
    /// A failure the user should know about.
    Error(String),
    /// The radio changed its state.
    RadioState(RadioState),
    /// The device went away.
    ConnectionClosed,
}

/// Receiver of [`UiMessage`]s. Notifications must not block the actor.
pub trait UiSink: Send {
    #[allow(missing_docs)]
    fn notify(&self, message: UiMessage);
}

impl UiSink for Sender<UiMessage> {
    fn notify(&self, message: UiMessage) {
        if Sender::send(self, message).is_err() {
            debug!("ui is gone, dropping message");
        }
    }
}

/// Requests from the user interface.
#[derive(Debug)]
pub enum AppCommand {
    /// Start tracing if no trace is active, stop it otherwise.
    ToggleTrace,
    #[allow(missing_docs)]
    StartTrace,
    #[allow(missing_docs)]
    StopTrace,
    /// Replies with snapshots of all field reports, sorted by field.
    FieldReports(Sender<Vec<FieldReport>>),
    /// Replies with a snapshot of the field report containing a position.
    FieldReportAt {
        #[allow(missing_docs)]
        latitude: f64,
        #[allow(missing_docs)]
        longitude: f64,
        #[allow(missing_docs)]
        reply: Sender<Option<FieldReport>>,
    },
}

/// Opens a new trace sink.
pub type TraceFactory = Box<dyn FnMut() -> Result<Box<dyn TraceSink>, TraceError> + Send>;

/// The coordination actor.
pub struct App {
    report: QualityReport,
    trace: Option<Box<dyn TraceSink>>,
    new_trace: TraceFactory,
    ui: Box<dyn UiSink>,
}

impl App {
    /// An actor that reports to `ui` and opens traces with `new_trace`.
    pub fn new<U: UiSink + 'static>(ui: U, new_trace: TraceFactory) -> Self {
        Self {
            report: QualityReport::new(),
            trace: None,
            new_trace,
            ui: Box::new(ui),
        }
    }

    /// An actor that writes trace files as configured.
    pub fn with_trace_config<U: UiSink + 'static>(ui: U, config: TraceConfig) -> Self {
        Self::new(
            ui,
            Box::new(move || {
                TraceFile::create(&config).map(|trace| Box::new(trace) as Box<dyn TraceSink>)
            }),
        )
    }

    /// Runs the actor on its own thread. The handle yields the final report.
    pub fn start(
        self,
        commands: Receiver<AppCommand>,
        data: Receiver<RadioData>,
        shutdown: Receiver<()>,
    ) -> JoinHandle<QualityReport> {
        thread::spawn(move || self.run(commands, data, shutdown))
    }

    /// Handles events until `shutdown` becomes ready or disconnected, then
    /// closes the trace and returns the report.
    pub fn run(
        mut self,
        commands: Receiver<AppCommand>,
        data: Receiver<RadioData>,
        shutdown: Receiver<()>,
    ) -> QualityReport {
        info!("app started");
        // closed inputs are replaced so they are not selected again
        let no_commands = channel::never();
        let no_data = channel::never();
        let mut commands_closed = false;
        let mut data_closed = false;
        loop {
            let commands = if commands_closed { &no_commands } else { &commands };
            let data = if data_closed { &no_data } else { &data };
            select! {
                recv(commands) -> command => match command {
                    Ok(command) => self.handle_command(command),
                    Err(_) => commands_closed = true,
                },
                recv(data) -> radio_data => match radio_data {
                    Ok(radio_data) => self.handle_data(radio_data),
                    Err(_) => data_closed = true,
                },
                recv(shutdown) -> _ => break,
            }
        }
        self.stop_trace();
        info!("app stopped, {} fields surveyed", self.report.len());
        self.report
    }

    /// Whether a trace is currently written.
    pub fn is_tracing(&self) -> bool {
        self.trace.is_some()
    }

    fn handle_command(&mut self, command: AppCommand) {
        match command {
            AppCommand::ToggleTrace => {
                if self.is_tracing() {
                    self.stop_trace()
                } else {
                    self.start_trace()
                }
            }
            AppCommand::StartTrace => self.start_trace(),
            AppCommand::StopTrace => self.stop_trace(),
            AppCommand::FieldReports(reply) => {
                let reports = self.report.field_reports().into_iter().cloned().collect();
                if reply.send(reports).is_err() {
                    debug!("nobody waits for the field reports");
                }
            }
            AppCommand::FieldReportAt {
                latitude,
                longitude,
                reply,
            } => {
                let field = UtmField::from_lat_lon(latitude, longitude);
                let report = self.report.field_report_by_utm(&field).cloned();
                if reply.send(report).is_err() {
                    debug!("nobody waits for the field report of {}", field);
                }
            }
        }
    }

    fn handle_data(&mut self, data: RadioData) {
        if let Some(trace) = self.trace.as_mut() {
            let written: Result<(), TraceError> = data
                .measurement
                .readings()
                .iter()
                .try_for_each(|reading| trace.write_reading(reading));
            if let Err(err) = written {
                error!("{}", err);
                self.ui.notify(UiMessage::Error(err.to_string()));
                self.stop_trace();
            }
        }

        self.report.add_measurement(&data.measurement);
        let field = self
            .report
            .field_report_by_utm(&data.position.utm_field())
            .cloned();
        self.ui.notify(UiMessage::Update { data, field });
    }

    fn start_trace(&mut self) {
        if self.is_tracing() {
            debug!("trace already active");
            return;
        }
        match (self.new_trace)() {
            Ok(trace) => {
                let path = trace.path().to_path_buf();
                self.trace = Some(trace);
                self.ui.notify(UiMessage::TracingStatus {
                    path: Some(path),
                    active: true,
                });
            }
            Err(err) => {
                error!("cannot start tracing: {}", err);
                self.ui
                    .notify(UiMessage::Error(format!("cannot start tracing: {}", err)));
            }
        }
    }

    fn stop_trace(&mut self) {
        let Some(trace) = self.trace.take() else {
            return;
        };
        let path = trace.path().to_path_buf();
        if let Err(err) = trace.close() {
            error!("cannot close trace: {}", err);
            self.ui
                .notify(UiMessage::Error(format!("cannot close trace: {}", err)));
        }
        self.ui.notify(UiMessage::TracingStatus {
            path: Some(path),
            active: false,
        });
    }
}
