//! REPL implementation
//!
//! This module implements the interactive Read-Eval-Print Loop for DBdex.

use crate::agent::runner::AgentRunner;
use crate::cli::command_menu::{self, MenuResult};
use crate::cli::commands::{self, format_error, Command, CommandOutcome, COMMANDS, EXIT_COMMANDS};
use crate::error::{DbdexError, Result};
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::Context;
use rustyline::Helper;
use rustyline::{CompletionType, Config, Editor};
use std::path::PathBuf;
use tracing::{debug, warn};

const PROMPT: &str = "You> ";

/// Completes slash commands, exit commands and table names
pub struct DbdexCompleter {
    candidates: Vec<String>,
}

impl DbdexCompleter {
    pub fn new(table_names: Vec<String>) -> Self {
        let candidates = COMMANDS
            .iter()
            .map(|(name, _, _)| name.to_string())
            .chain(EXIT_COMMANDS.iter().map(|c| c.to_string()))
            .chain(table_names)
            .collect();
        Self { candidates }
    }

    /// Start of the word under the cursor and the candidates matching it
    pub fn matches(&self, line: &str, pos: usize) -> (usize, Vec<String>) {
        let head = &line[..pos];
        let start = head
            .rfind([' ', '\t', ';', ','])
            .map(|i| i + 1)
            .unwrap_or(0);
        let word = head[start..].to_lowercase();
        if word.is_empty() {
            return (start, Vec::new());
        }

        let matches = self
            .candidates
            .iter()
            .filter(|candidate| candidate.to_lowercase().starts_with(&word))
            .cloned()
            .collect();
        (start, matches)
    }
}

impl Completer for DbdexCompleter {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> std::result::Result<(usize, Vec<String>), ReadlineError> {
        Ok(self.matches(line, pos))
    }
}

impl Hinter for DbdexCompleter {
    type Hint = String;
}

impl Highlighter for DbdexCompleter {}

impl Validator for DbdexCompleter {}

impl Helper for DbdexCompleter {}

/// DBdex REPL
pub struct Repl {
    /// The rustyline editor
    editor: Editor<DbdexCompleter, DefaultHistory>,
    /// Whether the REPL should continue running
    running: bool,
    /// Session agent with its dependencies
    runner: AgentRunner,
    /// Where history is persisted
    history_path: PathBuf,
}

fn editor_error(e: ReadlineError) -> DbdexError {
    DbdexError::Io(std::io::Error::other(format!("Failed to initialize editor: {}", e)))
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(runner: AgentRunner) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .auto_add_history(true)
            .build();

        let completer = DbdexCompleter::new(runner.deps().database.table_names());
        let mut editor =
            Editor::<DbdexCompleter, DefaultHistory>::with_config(config).map_err(editor_error)?;
        editor.set_helper(Some(completer));

        let history_path = dirs::home_dir()
            .map(|p| p.join(".dbdex").join("history"))
            .unwrap_or_else(|| ".dbdex-history".into());

        if let Err(e) = editor.load_history(&history_path) {
            debug!(error = %e, "no history loaded");
        }

        Ok(Self {
            editor,
            running: true,
            runner,
            history_path,
        })
    }

    /// Run the REPL loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        while self.running {
            let Some(line) = self.read_line(PROMPT, "") else {
                continue;
            };

            if line == "/" {
                if let Some(line) = self.line_from_menu() {
                    self.execute(&line).await;
                }
                continue;
            }

            self.execute(&line).await;
        }

        self.save_history();
        Ok(())
    }

    /// Read one trimmed, non-empty line; `None` on empty input or interrupt
    fn read_line(&mut self, prompt: &str, initial: &str) -> Option<String> {
        let read = if initial.is_empty() {
            self.editor.readline(prompt)
        } else {
            self.editor.readline_with_initial(prompt, (initial, ""))
        };

        match read {
            Ok(line) => {
                let line = line.trim();
                (!line.is_empty()).then(|| line.to_string())
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                None
            }
            Err(ReadlineError::Eof) => {
                println!();
                self.running = false;
                None
            }
            Err(err) => {
                println!("Error: {:?}", err);
                self.running = false;
                None
            }
        }
    }

    /// Let the user pick a command from the popup, then edit the line
    fn line_from_menu(&mut self) -> Option<String> {
        match command_menu::show_command_menu() {
            Ok(MenuResult::Command(item)) => {
                let initial = if item.takes_argument() {
                    format!("{} ", item.name)
                } else {
                    item.name
                };
                self.read_line(PROMPT, &initial)
            }
            Ok(MenuResult::TextInput) => self.read_line(PROMPT, "/"),
            Ok(MenuResult::Cancelled) => {
                println!();
                None
            }
            Err(e) => {
                println!("Error showing menu: {}", e);
                None
            }
        }
    }

    /// Parse and handle one line, printing errors inline
    async fn execute(&mut self, line: &str) {
        let result = match Command::parse(line) {
            Ok(command) => commands::handle_command(&command, &mut self.runner).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(CommandOutcome::Quit) => self.running = false,
            Ok(CommandOutcome::Continue) => {}
            Err(e) => {
                warn!(error = %e, "command failed");
                println!("{}", format_error(&e));
            }
        }
    }

    fn save_history(&mut self) {
        if let Some(parent) = self.history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = self.editor.save_history(&self.history_path) {
            debug!(error = %e, "could not save history");
        }
    }

    /// Print welcome message
    fn print_welcome(&self) {
        let provider = self.runner.provider();
        let database = &self.runner.deps().database;
        println!();
        println!("DBdex v{}", env!("CARGO_PKG_VERSION"));
        println!(
            "Connected to {} ({} tables), using {} model {}",
            database.backend(),
            database.table_names().len(),
            provider.provider_name(),
            provider.model()
        );
        println!();
        println!("Welcome to DBdex! Type '/exit' or '/q' to exit, / for commands or /help for more information.");
        println!("What would you like to know about your database?");
        println!();
    }
}
