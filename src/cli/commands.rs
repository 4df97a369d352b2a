//! Command handlers for CLI
//!
//! This module implements all `/` commands for the DBdex CLI. Anything not
//! starting with `/` is a question for the agent.

use crate::agent::runner::AgentRunner;
use crate::error::{DbdexError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default file name for `/export`
pub const DEFAULT_EXPORT_FILE: &str = "query_results.csv";

/// Commands that end the session
pub const EXIT_COMMANDS: [&str; 3] = ["/quit", "/exit", "/q"];

/// Slash commands with their usage and description
pub const COMMANDS: [(&str, &str, &str); 6] = [
    ("/clear", "/clear", "Clear the conversation history"),
    ("/result", "/result", "Show the full result of the last query"),
    ("/sql", "/sql <statement>", "Run a SELECT statement directly"),
    ("/schema", "/schema [table,table,...]", "Show the schema of some or all tables"),
    ("/export", "/export [filename]", "Export the last result to CSV"),
    ("/help", "/help", "Show this help message"),
];

/// Command types
#[derive(Debug, Clone, PartialEq)]
pub enum CommandType {
    /// Reset the conversation history
    Clear,
    /// Reprint the last result
    Result,
    /// Run a statement outside the agent loop
    Sql { sql: String },
    /// Print the schema of the named tables, or of all tables
    Schema { tables: Option<Vec<String>> },
    /// Write the last result to a CSV file
    Export { filename: Option<String> },
    /// Show help message
    Help,
    /// Exit the application
    Quit,
    /// Natural language query
    Query { text: String },
}

/// Parsed command
#[derive(Debug, Clone)]
pub struct Command {
    /// The type of command
    pub command_type: CommandType,
}

/// What the REPL should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Quit,
}

impl Command {
    /// Parse a command from user input
    ///
    /// The command token is matched case-insensitively; its argument is the
    /// rest of the line.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if !input.starts_with('/') {
            return Ok(Command {
                command_type: CommandType::Query {
                    text: input.to_string(),
                },
            });
        }

        let (cmd, arg) = match input.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (input, ""),
        };
        let cmd = cmd.to_lowercase();
        let optional = |arg: &str| (!arg.is_empty()).then(|| arg.to_string());

        let command_type = match cmd.as_str() {
            "/clear" => CommandType::Clear,
            "/result" => CommandType::Result,
            "/sql" => {
                if arg.is_empty() {
                    return Err(DbdexError::InvalidCommandSyntax {
                        command: cmd,
                        expected: "/sql <statement>".to_string(),
                    });
                }
                CommandType::Sql {
                    sql: arg.to_string(),
                }
            }
            "/schema" => CommandType::Schema {
                tables: optional(arg).map(|arg| {
                    arg.split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                        .collect()
                }),
            },
            "/export" => CommandType::Export {
                filename: optional(arg),
            },
            "/help" => CommandType::Help,
            c if EXIT_COMMANDS.contains(&c) => CommandType::Quit,
            _ => return Err(DbdexError::UnknownCommand(cmd)),
        };

        Ok(Command { command_type })
    }
}

/// Handle a command, writing its output to the session's sink
pub async fn handle_command(command: &Command, runner: &mut AgentRunner) -> Result<CommandOutcome> {
    let sink = runner.deps().sink.clone();

    match &command.command_type {
        CommandType::Clear => {
            runner.clear_message_history();
            sink.write_text("Conversation history cleared.");
        }
        CommandType::Result => match runner.deps().last_result().await {
            Some(result) => sink.write_text(&result.to_markdown(true)),
            None => sink.write_text("No previous query results."),
        },
        CommandType::Sql { sql } => {
            let deps = runner.deps();
            let result = deps.database.execute_sql(sql, &deps.last_query).await?;
            sink.write_text(&result.to_markdown(true));
        }
        CommandType::Schema { tables } => {
            let schema = runner.deps().database.describe_schema(tables.as_deref())?;
            sink.write_text(&format!("```\n{}\n```", schema));
        }
        CommandType::Export { filename } => {
            let result = runner
                .deps()
                .last_result()
                .await
                .filter(|result| !result.rows.is_empty())
                .ok_or(DbdexError::NoQueryResults)?;

            let path = export_path(filename.as_deref())?;
            std::fs::write(&path, result.to_csv())?;
            info!(path = %path.display(), rows = result.row_count(), "exported results");
            sink.write_text(&format!("Results exported to {}", path.display()));
        }
        CommandType::Help => sink.write_text(&help_text()),
        CommandType::Quit => {
            sink.write_text("Goodbye!");
            return Ok(CommandOutcome::Quit);
        }
        CommandType::Query { text } => {
            let output = runner.run(text).await?;
            if output.streamed {
                sink.write_text("");
            } else {
                sink.write_text(&output.output);
            }
        }
    }

    Ok(CommandOutcome::Continue)
}

/// Absolute export path with the `.csv` suffix enforced
pub fn export_path(filename: Option<&str>) -> Result<PathBuf> {
    let mut filename = filename.unwrap_or(DEFAULT_EXPORT_FILE).to_string();
    if !filename.ends_with(".csv") {
        filename.push_str(".csv");
    }

    let path = Path::new(&filename);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn help_text() -> String {
    let mut help = String::from("\nDBdex Commands\n\n");
    for (_, usage, description) in COMMANDS {
        help.push_str(&format!("  {:28} {}\n", usage, description));
    }
    help.push_str(&format!("  {:28} {}\n", EXIT_COMMANDS.join(", "), "Exit DBdex"));
    help.push_str(
        "\nAnything else is sent to the assistant, e.g.\n  Which customers spent the most last year?\n",
    );
    help
}

/// Format an error for display
pub fn format_error(error: &DbdexError) -> String {
    format!("Error: {}", error)
}
