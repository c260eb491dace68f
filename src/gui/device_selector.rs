use std::{io::stdout, time::Duration};

use crate::args::DEMO_DEVICE;
use crate::gui::error::SurveyGuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};
use serial2::SerialPort;

/// The serial ports of this machine followed by the demo radio.
pub fn selectable_devices() -> Vec<String> {
    let mut devices: Vec<String> = match SerialPort::available_ports() {
        Ok(ports) => ports
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        Err(err) => {
            log::warn!("cannot list serial ports: {}", err);
            Vec::new()
        }
    };
    devices.push(DEMO_DEVICE.to_owned());
    devices
}

/// Lets the user pick one of `devices`. Returns `None` if the user quits.
pub fn device_selector(mut devices: Vec<String>) -> Result<Option<String>, SurveyGuiError> {
    if devices.is_empty() {
        return Ok(None);
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let result = select(&mut terminal, &devices);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(result?.map(|i| devices.swap_remove(i)))
}

fn select<B: Backend>(
    terminal: &mut Terminal<B>,
    devices: &[String],
) -> Result<Option<usize>, SurveyGuiError> {
    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    let n_devices = devices.len();
    loop {
        let title = Title::from(" Radio Selector ".cyan().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".cyan().bold(),
            " Select ".into(),
            "<Enter>".cyan().bold(),
            " Quit ".into(),
            "<Q> ".cyan().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let list = List::new(devices.iter().map(String::as_str))
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Cyan))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;
        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Down => {
                            cursor = (cursor + 1) % n_devices;
                        }
                        KeyCode::Up => {
                            cursor = (cursor + n_devices - 1) % n_devices;
                        }
                        KeyCode::Enter => return Ok(Some(cursor)),
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(None),
                        _ => {}
                    }
                }
            }
        }
    }
}
