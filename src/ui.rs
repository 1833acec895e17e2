use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use std::{
    io::{self, Stdout},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::colors::{VisualizationMode, current_modes};
use crate::control::ControlHandle;
use crate::error::Result;
use crate::sink::LightSink;
use crate::types::Rgb;

const BORDER: Color = Color::Rgb(96, 160, 192);
const CELL: &str = "██";

pub type TerminalType = Terminal<CrosstermBackend<Stdout>>;

pub fn init_terminal() -> Result<TerminalType> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

pub fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture)?;
    Ok(())
}

pub struct TerminalGrid {
    terminal: Option<TerminalType>,
    pixels: Vec<Rgb>,
    brightness: u8,
    columns: usize,
}

impl TerminalGrid {
    pub fn new(led_count: usize, brightness: u8) -> Result<TerminalGrid> {
        let terminal = init_terminal()?;
        Ok(TerminalGrid {
            terminal: Some(terminal),
            pixels: vec![Rgb::BLACK; led_count],
            brightness,
            columns: grid_columns(led_count),
        })
    }
}

impl LightSink for TerminalGrid {
    fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    fn set(&mut self, index: usize, r: u8, g: u8, b: u8) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = Rgb::new(r, g, b).with_brightness(self.brightness);
        }
    }

    fn present(&mut self) -> Result<()> {
        if let Some(terminal) = self.terminal.as_mut() {
            let pixels = &self.pixels;
            let columns = self.columns;
            terminal.draw(|f| draw_ui(f, pixels, columns))?;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.terminal.take().is_some() {
            restore_terminal()?;
        }
        Ok(())
    }
}

impl Drop for TerminalGrid {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

fn grid_columns(led_count: usize) -> usize {
    let mut columns = (led_count as f64).sqrt() as usize;
    if columns * columns < led_count {
        columns += 1;
    }
    columns.max(1)
}

fn draw_ui(f: &mut Frame, pixels: &[Rgb], columns: usize) {
    let size = f.area();
    let rows = pixels.len().div_ceil(columns) as u16;
    let needed_width = (columns * CELL.chars().count()) as u16 + 2;
    let needed_height = rows + 2 + 3 + 4;

    if size.width < needed_width || size.height < needed_height {
        let error_msg = Paragraph::new(format!(
            "Terminal too small!\nMinimum: {needed_width}x{needed_height}"
        ))
        .style(Style::default().fg(Color::Red))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(error_msg, size);
        return;
    }

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(rows + 2),
            Constraint::Length(4),
        ])
        .split(size);

    draw_title(f, main_layout[0], pixels.len());
    draw_grid(f, main_layout[1], pixels, columns);
    draw_controls(f, main_layout[2]);
}

fn draw_title(f: &mut Frame, area: Rect, led_count: usize) {
    let title = Paragraph::new(format!("Lightbar · {led_count} pixels"))
        .style(
            Style::default()
                .fg(Color::Rgb(128, 224, 208))
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(BORDER)),
        );
    f.render_widget(title, area);
}

fn draw_grid(f: &mut Frame, area: Rect, pixels: &[Rgb], columns: usize) {
    let lines: Vec<Line> = pixels
        .chunks(columns)
        .map(|row| {
            Line::from(
                row.iter()
                    .map(|c| Span::styled(CELL, Style::default().fg(Color::Rgb(c.r, c.g, c.b))))
                    .collect::<Vec<_>>(),
            )
        })
        .collect();

    let grid = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(BORDER)),
    );
    f.render_widget(grid, area);
}

fn draw_controls(f: &mut Frame, area: Rect) {
    let key_style = Style::default()
        .fg(Color::Rgb(255, 255, 0))
        .add_modifier(Modifier::BOLD);
    let text_style = Style::default().fg(Color::Rgb(128, 160, 192));

    let mut modes = Vec::new();
    for (i, (_, label)) in current_modes().iter().enumerate() {
        if i > 0 {
            modes.push(Span::styled("  ", text_style));
        }
        modes.push(Span::styled(format!("{}", i + 1), key_style));
        modes.push(Span::styled(format!(" {label}"), Style::default().fg(Color::White)));
    }

    let controls = vec![
        Line::from(modes),
        Line::from(vec![
            Span::styled("Tab", key_style),
            Span::styled(" next mode, ", text_style),
            Span::styled("Q", key_style),
            Span::styled("/", text_style),
            Span::styled("ESC", key_style),
            Span::styled(" to quit", text_style),
        ]),
    ];

    let status = Paragraph::new(controls).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(BORDER)),
    );
    f.render_widget(status, area);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyAction {
    Mode(VisualizationMode),
    Quit,
}

fn key_action(key: KeyEvent, current: VisualizationMode) -> Option<KeyAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(KeyAction::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::Quit)
        }
        KeyCode::Tab => Some(KeyAction::Mode(current.next())),
        KeyCode::Char(digit @ '1'..='9') => {
            let slot = digit as usize - '1' as usize;
            VisualizationMode::ALL.get(slot).copied().map(KeyAction::Mode)
        }
        _ => None,
    }
}

/// Reads key presses on a background thread and forwards them to the render
/// loop until it stops.
pub fn spawn_keyboard_control(control: ControlHandle) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("lightbar-keys".into())
        .spawn(move || {
            while !control.is_stopped() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "keyboard polling failed, controls disabled");
                        return;
                    }
                }

                let key = match event::read() {
                    Ok(Event::Key(key)) => key,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "keyboard read failed, controls disabled");
                        return;
                    }
                };

                match key_action(key, control.mode()) {
                    Some(KeyAction::Mode(mode)) => control.set_mode(mode),
                    Some(KeyAction::Quit) => {
                        control.request_shutdown();
                        return;
                    }
                    None => {}
                }
            }
        })
}
