use crossbeam::channel::{Receiver, Sender};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::Line,
    widgets::{Block, Borders, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::{
    collections::VecDeque,
    io,
    path::PathBuf,
    time::{Duration, Instant},
};

use tetrasurvey::{
    app::{AppCommand, UiMessage},
    gui::SurveyGuiError,
    quality::FieldReport,
    radio::RadioState,
    scan_loop::RadioData,
    signal::{rssi_to_gan, NO_SIGNAL},
};

const MAX_MESSAGES: usize = 3;

/// What the main screen shows, folded from the actor's messages.
struct SurveyView {
    radio_state: RadioState,
    data: Option<RadioData>,
    field: Option<FieldReport>,
    tracing: Option<PathBuf>,
    messages: VecDeque<String>,
}

impl SurveyView {
    fn new() -> Self {
        Self {
            radio_state: RadioState::Running,
            data: None,
            field: None,
            tracing: None,
            messages: VecDeque::new(),
        }
    }

    fn apply(&mut self, message: UiMessage) {
        match message {
            UiMessage::Update { data, field } => {
                self.data = Some(data);
                self.field = field;
            }
            UiMessage::TracingStatus { path, active } => {
                self.tracing = if active { path.clone() } else { None };
                if let Some(path) = path {
                    let verb = if active { "tracing to" } else { "stopped tracing to" };
                    self.push_message(format!("{} {}", verb, path.display()));
                }
            }
            UiMessage::Message(msg) | UiMessage::Error(msg) => self.push_message(msg),
            UiMessage::RadioState(state) => self.radio_state = state,
            UiMessage::ConnectionClosed => {
                self.push_message("connection to the radio closed".to_owned())
            }
        }
    }

    fn push_message(&mut self, msg: String) {
        if self.messages.len() == MAX_MESSAGES {
            self.messages.pop_front();
        }
        self.messages.push_back(msg);
    }
}

pub fn engage_gui(
    commands: &Sender<AppCommand>,
    ui: &Receiver<UiMessage>,
    states: &Receiver<RadioState>,
) -> Result<(), SurveyGuiError> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let tick_rate = Duration::from_millis(250);
    let res = run_app(&mut terminal, commands, ui, states, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    commands: &Sender<AppCommand>,
    ui: &Receiver<UiMessage>,
    states: &Receiver<RadioState>,
    tick_rate: Duration,
) -> Result<(), SurveyGuiError> {
    let mut view = SurveyView::new();
    let mut last_tick = Instant::now();
    loop {
        for state in states.try_iter() {
            view.apply(UiMessage::RadioState(state));
        }
        for message in ui.try_iter() {
            view.apply(message);
        }
        terminal.draw(|f| render(f, &view))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('t') => commands.send(AppCommand::ToggleTrace)?,
                        _ => {}
                    }
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

fn rssi_text(rssi: i32) -> String {
    if rssi == NO_SIGNAL {
        "--".to_owned()
    } else {
        format!("{} dBm", rssi)
    }
}

fn gan_color(gan: i32) -> Color {
    match gan {
        i32::MIN..=-3 => Color::DarkGray,
        -2..=-1 => Color::Red,
        0..=1 => Color::Yellow,
        _ => Color::Green,
    }
}

fn render(f: &mut Frame, view: &SurveyView) {
    let [summary, tables, status] = split3(
        Layout::vertical([
            Constraint::Length(7),
            Constraint::Min(6),
            Constraint::Length(5),
        ]),
        f.size(),
    );
    let [position, current, average] = split3(
        Layout::horizontal([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ]),
        summary,
    );
    let [readings, lacs] = {
        let areas = Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(tables);
        [areas[0], areas[1]]
    };

    f.render_widget(position_box(view), position);
    f.render_widget(current_box(view), current);
    f.render_widget(average_box(view), average);
    f.render_widget(readings_table(view), readings);
    f.render_widget(lac_table(view), lacs);
    f.render_widget(status_box(view), status);
}

fn split3(layout: Layout, area: Rect) -> [Rect; 3] {
    let areas = layout.split(area);
    [areas[0], areas[1], areas[2]]
}

fn boxed(title: &str) -> Block<'static> {
    Block::default()
        .title(format!(" {} ", title).bold())
        .borders(Borders::ALL)
}

fn position_box(view: &SurveyView) -> Paragraph<'static> {
    let lines = match &view.data {
        Some(data) => {
            let position = data.position;
            vec![
                Line::from(format!("lat  {:.6}", position.latitude)),
                Line::from(format!("lon  {:.6}", position.longitude)),
                Line::from(format!("sats {}", position.satellites)),
                Line::from(format!("time {}", position.timestamp.format("%H:%M:%S"))),
                Line::from(format!("field {}", position.utm_field())),
            ]
        }
        None => vec![Line::from("waiting for the first scan")],
    };
    Paragraph::new(lines).block(boxed("Position"))
}

fn current_box(view: &SurveyView) -> Paragraph<'static> {
    let lines = match &view.data {
        Some(data) if !data.measurement.is_empty() => {
            let best = data.measurement.best_server();
            let gan = rssi_to_gan(best.rssi);
            vec![
                Line::from(format!("LAC     {}", best.lac)),
                Line::from(format!("carrier {:x}", best.carrier)),
                Line::from(format!("RSSI    {}", rssi_text(best.rssi))),
                Line::from(format!("GAN     {}", gan)).fg(gan_color(gan)),
                Line::from(format!("SLD     {} dB", data.measurement.signal_level_difference())),
            ]
        }
        _ => vec![Line::from("no signal")],
    };
    Paragraph::new(lines).block(boxed("Current"))
}

fn average_box(view: &SurveyView) -> Paragraph<'static> {
    let lines = match &view.field {
        Some(field) => {
            let gan = field.average_gan();
            vec![
                Line::from(format!("measurements {}", field.measurement_count())),
                Line::from(format!("RSSI {}", rssi_text(field.average_rssi()))),
                Line::from(format!("GAN  {}", gan)).fg(gan_color(gan)),
                Line::from(format!("SLD  {} dB", field.average_signal_level_difference())),
            ]
        }
        None => vec![Line::from("no data for this field")],
    };
    Paragraph::new(lines).block(boxed("Field Average"))
}

fn header(cells: Vec<&'static str>) -> Row<'static> {
    Row::new(cells).style(Style::default().add_modifier(Modifier::BOLD))
}

fn readings_table(view: &SurveyView) -> Table<'static> {
    let rows: Vec<Row> = view
        .data
        .iter()
        .flat_map(|data| data.measurement.readings())
        .map(|reading| {
            let gan = rssi_to_gan(reading.rssi);
            Row::new(vec![
                reading.lac.to_string(),
                format!("{:x}", reading.carrier),
                rssi_text(reading.rssi),
                gan.to_string(),
                reading.cx.to_string(),
            ])
            .style(Style::default().fg(gan_color(gan)))
        })
        .collect();
    Table::new(
        rows,
        [
            Constraint::Length(7),
            Constraint::Length(8),
            Constraint::Length(9),
            Constraint::Length(4),
            Constraint::Length(4),
        ],
    )
    .header(header(vec!["LAC", "carrier", "RSSI", "GAN", "Cx"]))
    .block(boxed("Cells"))
}

fn lac_table(view: &SurveyView) -> Table<'static> {
    let rows: Vec<Row> = view
        .field
        .iter()
        .flat_map(|field| field.lac_reports_by_rssi())
        .map(|report| {
            Row::new(vec![
                report.lac.to_string(),
                rssi_text(report.current_rssi()),
                rssi_text(report.min_rssi),
                rssi_text(report.max_rssi),
                rssi_text(report.average_rssi()),
            ])
            .style(Style::default().fg(gan_color(report.average_gan())))
        })
        .collect();
    Table::new(
        rows,
        [
            Constraint::Length(7),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
        ],
    )
    .header(header(vec!["LAC", "current", "min", "max", "avg"]))
    .block(boxed("Field LACs"))
}

fn status_box(view: &SurveyView) -> Paragraph<'static> {
    let tracing = match &view.tracing {
        Some(path) => format!("tracing to {}", path.display()),
        None => "not tracing".to_owned(),
    };
    let mut lines = vec![Line::from(format!(
        "radio {} | {} | <T> toggle trace  <Q> quit",
        view.radio_state, tracing
    ))];
    lines.extend(view.messages.iter().map(|m| Line::from(m.clone()).dark_gray()));
    Paragraph::new(lines).block(boxed("Status"))
}
