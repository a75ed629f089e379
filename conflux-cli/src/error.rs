use colored::Colorize;
use std::fmt;
use std::process;

pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Unified error type for CLI commands.
pub enum CliError {
    /// Queue administration or delivery failure.
    Worker(conflux_worker::WorkerError),
    /// Artifact store failure.
    Storage(conflux_storage::StorageError),
    /// Stacking or database failure.
    Stack(conflux_stack::StackError),
    /// Unreadable input file.
    Input(String),
    /// Argument / usage errors.
    Usage(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = "error:".red().bold();
        match self {
            CliError::Worker(e) => write!(f, "{label} {e}"),
            CliError::Storage(e) => write!(f, "{label} {e}"),
            CliError::Stack(e) => write!(f, "{label} {e}"),
            CliError::Input(msg) => write!(f, "{label} {msg}"),
            CliError::Usage(msg) => write!(
                f,
                "{label} {msg}\n  {} run 'conflux --help' for usage",
                "help:".cyan().bold()
            ),
        }
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<conflux_worker::WorkerError> for CliError {
    fn from(e: conflux_worker::WorkerError) -> Self {
        CliError::Worker(e)
    }
}

impl From<conflux_storage::StorageError> for CliError {
    fn from(e: conflux_storage::StorageError) -> Self {
        CliError::Storage(e)
    }
}

impl From<conflux_stack::StackError> for CliError {
    fn from(e: conflux_stack::StackError) -> Self {
        CliError::Stack(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Input(e.to_string())
    }
}

/// Print error and exit with the appropriate code.
pub fn exit_with_error(err: CliError) -> ! {
    eprintln!("{err}");
    let code = match &err {
        CliError::Usage(_) => EXIT_USAGE,
        _ => EXIT_ERROR,
    };
    process::exit(code)
}

pub type CliResult<T> = std::result::Result<T, CliError>;
