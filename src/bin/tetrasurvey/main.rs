//! The tetrasurvey command line tool.
//!
//! ```text
//! tetrasurvey --device /dev/ttyUSB0 tui --scan-interval 5
//! tetrasurvey --device demo trace --format json --outdir traces
//! ```

mod gui;

use clap::Parser;
use crossbeam::channel::{self, select, Receiver, Sender};
use log::{error, info};
use std::{
    fs::OpenOptions,
    io,
    path::Path,
    process,
    sync::Arc,
    thread,
};

use tetrasurvey::{
    app::{App, AppCommand, UiMessage, UiSink},
    args::{CommandTask, SurveyArgs, DEMO_DEVICE},
    config::{ScanConfig, TraceConfig},
    dummy_pei::DummyPei,
    gui::{device_selector, selectable_devices, SurveyGuiError},
    pei::{Pei, TracingPei},
    quality::QualityReport,
    radio::Radio,
    scan_loop::{ScanLogger, ScanLoop},
    serial_pei::SerialPei,
    signal::rssi_to_gan,
};

fn main() {
    env_logger::init();
    let args = SurveyArgs::parse();

    if let Err(err) = run(args) {
        error!("{}", err);
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn run(args: SurveyArgs) -> Result<(), SurveyGuiError> {
    let device = match args.device.clone() {
        Some(device) => device,
        None => device_selector(selectable_devices())?.ok_or(SurveyGuiError::NoDevice)?,
    };
    let pei = open_device(&device, args.trace_pei.as_deref())?;

    let options = args.scan_options();
    let scan_config = ScanConfig::from(options);
    let trace_config = TraceConfig::from(options);

    let (ui_tx, ui_rx) = channel::unbounded::<UiMessage>();
    let (state_tx, state_rx) = channel::unbounded();
    let (commands_tx, commands_rx) = channel::unbounded();
    let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

    let scan_ui = ui_tx.clone();
    let logger: ScanLogger = Arc::new(move |msg| scan_ui.notify(UiMessage::Error(msg)));
    let (scan_loop, data) = ScanLoop::new(scan_config, Some(logger));

    let mut radio = Radio::new(Some(state_tx)).with_command_timeout(args.command_timeout());
    let disconnect_ui = ui_tx.clone();
    radio.on_disconnect(move || disconnect_ui.notify(UiMessage::ConnectionClosed));

    let app = App::with_trace_config(ui_tx, trace_config);
    let app_handle = app.start(commands_rx, data, shutdown_rx);

    info!("opening radio {}", device);
    let result = match radio.open(pei, scan_loop) {
        Ok(()) => match &args.command {
            CommandTask::Tui(_) => gui::engage_gui(&commands_tx, &ui_rx, &state_rx),
            CommandTask::Trace(_) => trace_until_enter(&commands_tx, &ui_rx),
        },
        Err(err) => Err(err.into()),
    };

    radio.close();
    drop(shutdown_tx);
    let report = app_handle.join().map_err(|_| SurveyGuiError::JoinError)?;
    print_summary(&report, options.lac);

    result
}

fn open_device(device: &str, trace_pei: Option<&Path>) -> Result<Box<dyn Pei>, SurveyGuiError> {
    let pei: Box<dyn Pei> = if device == DEMO_DEVICE {
        Box::new(DummyPei::builder().build())
    } else {
        Box::new(SerialPei::open(device)?)
    };

    match trace_pei {
        None => Ok(pei),
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(Box::new(TracingPei::new(pei, file)))
        }
    }
}

/// Traces until the user presses <Enter> or the radio goes away.
fn trace_until_enter(
    commands: &Sender<AppCommand>,
    ui: &Receiver<UiMessage>,
) -> Result<(), SurveyGuiError> {
    commands.send(AppCommand::StartTrace)?;

    let (enter_tx, enter_rx) = channel::bounded::<()>(1);
    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
        let _ = enter_tx.send(());
    });
    println!("press <Enter> to stop");

    loop {
        select! {
            recv(enter_rx) -> _ => break,
            recv(ui) -> message => match message? {
                UiMessage::Update { data, .. } => {
                    let best = data.measurement.best_server();
                    println!(
                        "{} {:.6} {:.6} sats {} | {} cells | best {}/{:x} {} dBm GAN {}",
                        data.position.timestamp.format("%H:%M:%S"),
                        data.position.latitude,
                        data.position.longitude,
                        data.position.satellites,
                        data.measurement.len(),
                        best.lac,
                        best.carrier,
                        best.rssi,
                        rssi_to_gan(best.rssi)
                    );
                }
                UiMessage::TracingStatus { path: Some(path), active } => {
                    let verb = if active { "tracing to" } else { "stopped tracing to" };
                    println!("{} {}", verb, path.display());
                }
                UiMessage::Message(msg) => println!("{}", msg),
                UiMessage::Error(msg) => eprintln!("{}", msg),
                UiMessage::ConnectionClosed => {
                    eprintln!("connection to the radio closed");
                    break;
                }
                _ => {}
            }
        }
    }

    commands.send(AppCommand::StopTrace)?;
    Ok(())
}

fn print_summary(report: &QualityReport, lac: Option<u32>) {
    if report.is_empty() {
        return;
    }
    println!("{} fields surveyed", report.len());
    for field in report.field_reports() {
        println!(
            "{}  measurements {:>4}  RSSI {:>4} dBm  GAN {:>2}  SLD {:>3} dB",
            field.field(),
            field.measurement_count(),
            field.average_rssi(),
            field.average_gan(),
            field.average_signal_level_difference()
        );
        for report in field
            .lac_reports_by_rssi()
            .into_iter()
            .filter(|report| lac.map_or(true, |lac| report.lac == lac))
        {
            println!(
                "    LAC {:>6}  min {:>4}  max {:>4}  avg {:>4}  GAN {:>2}",
                report.lac,
                report.min_rssi,
                report.max_rssi,
                report.average_rssi(),
                report.average_gan()
            );
        }
    }
}
