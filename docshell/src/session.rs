//! Interactive session state and the script runner.
//!
//! A [`Session`] owns one in-memory store per database name and remembers
//! which one `use` last selected (initially `test`). Everything else a command
//! needs travels in the command itself.

use std::{
    collections::HashMap,
    io::{BufRead, Write},
};

use serde_json::json;
use thiserror::Error;
use tracing::debug;

use docshell_core::{
    backend::StoreBackendBuilder,
    command::{Command, CommandOutput},
    error::{DocumentStoreError, DocumentStoreResult},
    store::DocumentStore,
};
use docshell_memory::{IdKind, InMemoryStore};

/// Database targeted before the first `use`.
pub const DEFAULT_DATABASE: &str = "test";

/// Errors that stop a script run.
#[derive(Debug, Error)]
pub enum ShellError {
    /// Reading the script or writing results failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A result could not be rendered as JSON.
    #[error("Failed to render output: {0}")]
    Render(#[from] serde_json::Error),
    /// A command failed while running with `fail_fast`.
    #[error("line {line}: {source}")]
    Aborted {
        line: usize,
        #[source]
        source: DocumentStoreError,
    },
}

/// How [`Session::run`] reacts to failures and formats output.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop at the first failed command.
    pub fail_fast: bool,
    /// Pretty-print each result instead of writing one JSON line.
    pub pretty: bool,
}

/// Counts of a finished script run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    pub failed: usize,
}

/// A shell session over a set of named in-memory databases.
#[derive(Debug)]
pub struct Session {
    databases: HashMap<String, DocumentStore<InMemoryStore>>,
    current: String,
    id_kind: IdKind,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(IdKind::default())
    }
}

impl Session {
    /// Creates a session whose databases generate ids of `id_kind`.
    pub fn new(id_kind: IdKind) -> Self {
        Self {
            databases: HashMap::new(),
            current: DEFAULT_DATABASE.to_string(),
            id_kind,
        }
    }

    /// Name of the database commands currently target.
    pub fn database(&self) -> &str {
        &self.current
    }

    /// Names of the databases touched so far, sorted.
    pub fn databases(&self) -> Vec<String> {
        let mut names = self.databases.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Returns the store of the current database, creating it on first use.
    pub async fn store(&mut self) -> DocumentStoreResult<&DocumentStore<InMemoryStore>> {
        if !self.databases.contains_key(&self.current) {
            let backend = InMemoryStore::builder()
                .id_kind(self.id_kind)
                .build()
                .await?;

            debug!(database = %self.current, "opened database");
            self.databases.insert(self.current.clone(), DocumentStore::new(backend));
        }

        self.databases
            .get(&self.current)
            .ok_or_else(|| DocumentStoreError::NotFound(format!("database '{}'", self.current)))
    }

    /// Executes one command against the current database.
    ///
    /// `use` only switches the target; the database itself is created lazily
    /// by the first command that needs it.
    pub async fn execute(&mut self, command: Command) -> DocumentStoreResult<CommandOutput> {
        if let Command::Use { database } = command {
            if database.is_empty() {
                return Err(DocumentStoreError::InvalidCommand("database name must not be empty".to_string()));
            }

            debug!(from = %self.current, to = %database, "switched database");
            self.current = database.clone();

            return Ok(CommandOutput::Switched(database));
        }

        let name = command.name();
        let database = self.current.clone();
        let output = command.execute(self.store().await?).await;

        if let Err(err) = &output {
            debug!(%database, command = name, error = %err, "command failed");
        }

        output
    }

    /// Parses and executes one JSON command line.
    pub async fn execute_line(&mut self, line: &str) -> DocumentStoreResult<CommandOutput> {
        self.execute(Command::from_json(line)?).await
    }

    /// Runs a script of JSON command lines.
    ///
    /// Blank lines and lines starting with `//` are skipped. Each result is
    /// written to `out`; each failure is written to `errors` as
    /// `{"line": .., "error": .., "message": ..}` and the run continues unless
    /// `options.fail_fast` is set.
    pub async fn run<R, W, E>(
        &mut self,
        input: R,
        out: &mut W,
        errors: &mut E,
        options: RunOptions,
    ) -> Result<RunSummary, ShellError>
    where
        R: BufRead,
        W: Write,
        E: Write,
    {
        let mut summary = RunSummary::default();

        for (index, line) in input.lines().enumerate() {
            let line = line?;
            let line_number = index + 1;
            let command = line.trim();

            if is_skipped(command) {
                continue;
            }

            summary.executed += 1;

            match self.execute_line(command).await {
                Ok(output) => {
                    let rendered = output.to_json();

                    if options.pretty {
                        writeln!(out, "{}", serde_json::to_string_pretty(&rendered)?)?;
                    } else {
                        writeln!(out, "{}", serde_json::to_string(&rendered)?)?;
                    }
                }
                Err(err) => {
                    summary.failed += 1;

                    let report = json!({
                        "line": line_number,
                        "error": err.kind(),
                        "message": err.to_string(),
                    });
                    writeln!(errors, "{}", serde_json::to_string(&report)?)?;

                    if options.fail_fast {
                        return Err(ShellError::Aborted { line: line_number, source: err });
                    }
                }
            }
        }

        Ok(summary)
    }
}

fn is_skipped(line: &str) -> bool {
    line.is_empty() || line.starts_with("//")
}
