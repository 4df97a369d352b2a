//! Command Menu (TUI popup)
//!
//! Displays a visual command menu when the user types a bare "/"

use crate::cli::commands::{COMMANDS, EXIT_COMMANDS};
use ratatui::{
    crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use std::io;

/// Command menu item
#[derive(Debug, Clone)]
pub struct CommandItem {
    /// Command name
    pub name: String,
    /// Usage line
    pub usage: String,
    /// Description
    pub description: String,
}

impl CommandItem {
    /// Whether selecting the command should leave room for an argument
    pub fn takes_argument(&self) -> bool {
        self.usage != self.name
    }
}

/// All available commands
pub fn get_commands() -> Vec<CommandItem> {
    COMMANDS
        .iter()
        .map(|(name, usage, description)| CommandItem {
            name: name.to_string(),
            usage: usage.to_string(),
            description: description.to_string(),
        })
        .chain(std::iter::once(CommandItem {
            name: EXIT_COMMANDS[0].to_string(),
            usage: EXIT_COMMANDS[0].to_string(),
            description: "Exit DBdex".to_string(),
        }))
        .collect()
}

/// Result of running the command menu
pub enum MenuResult {
    /// User selected a command
    Command(CommandItem),
    /// User cancelled (ESC)
    Cancelled,
    /// User wants to type their own input
    TextInput,
}

/// Display the command menu and return selected command
pub fn show_command_menu() -> io::Result<MenuResult> {
    let commands = get_commands();
    let mut state = ListState::default();
    state.select(Some(0));

    // Setup terminal
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(io::stdout(), EnableMouseCapture)?;

    let stdout = io::stdout();
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let result = run_menu(&mut terminal, &commands, &mut state);

    // Restore terminal
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(io::stdout(), DisableMouseCapture)?;
    terminal.clear()?;

    result
}

fn run_menu(
    terminal: &mut ratatui::Terminal<ratatui::backend::CrosstermBackend<std::io::Stdout>>,
    commands: &[CommandItem],
    state: &mut ListState,
) -> io::Result<MenuResult> {
    loop {
        terminal.draw(|f| ui(f, commands, state))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    return Ok(MenuResult::Cancelled);
                }
                KeyCode::Enter => {
                    if let Some(item) = state.selected().and_then(|i| commands.get(i)) {
                        return Ok(MenuResult::Command(item.clone()));
                    }
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    let selected = state.selected().unwrap_or(0);
                    if selected + 1 < commands.len() {
                        state.select(Some(selected + 1));
                    }
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    let selected = state.selected().unwrap_or(0);
                    state.select(Some(selected.saturating_sub(1)));
                }
                KeyCode::Char('/') => {
                    // typed / again: plain text input
                    return Ok(MenuResult::TextInput);
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, commands: &[CommandItem], state: &mut ListState) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(5),    // command list
            Constraint::Length(3), // key help
        ])
        .split(size);

    let header = Paragraph::new(vec![
        Line::from(" DBdex ").style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Line::from(""),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    )
    .alignment(Alignment::Center);

    f.render_widget(header, chunks[0]);

    let items: Vec<ListItem> = commands
        .iter()
        .map(|cmd| ListItem::new(format!("  {:28} - {}", cmd.usage, cmd.description)))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::REVERSED)
                .fg(Color::Black)
                .bg(Color::Cyan),
        );

    f.render_stateful_widget(list, chunks[1], state);

    let help = Paragraph::new(vec![Line::from(
        " ↑/k: Up  ↓/j: Down  Enter: Select  ESC/q: Cancel  /: Type command ",
    )
    .style(Style::default().fg(Color::Gray))])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    )
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true });

    f.render_widget(help, chunks[2]);
}
