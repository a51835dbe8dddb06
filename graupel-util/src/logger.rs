//! Reporting messages to the user.
//!
//! Components that can emit diagnostics take a [`Logger`] by reference,
//! so the embedding tool decides where messages end up.

/// Severity of a logged message.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level
{
    Error,
    Warning,
    Info,
}

/// Capability for reporting messages.
pub trait Logger
{
    /// Report a single message at the given severity.
    fn on_message(&self, level: Level, message: &str);
}

/// Logger that writes to standard error.
pub struct BasicLogger;

impl Logger for BasicLogger
{
    fn on_message(&self, level: Level, message: &str)
    {
        match level {
            Level::Error   => eprintln!("graupel: error: {message}"),
            Level::Warning => eprintln!("graupel: warning: {message}"),
            Level::Info    => eprintln!("graupel: {message}"),
        }
    }
}

/// Logger that swallows all messages.
pub struct NullLogger;

impl Logger for NullLogger
{
    fn on_message(&self, _level: Level, _message: &str)
    {
    }
}
