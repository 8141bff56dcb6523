//! Interpreter backend trait: what the gateway needs from a live interpreter,
//! independent of how the process is driven. Tests plug in scripted backends.

use std::fmt;
use std::time::Duration;

use envil_types::PostWindow;

use crate::gateway::GatewayError;

/// Result type for backend operations.
pub type EvalResult<T = String> = Result<T, EvalError>;

/// Error from one interpreter request.
#[derive(Debug)]
pub enum EvalError {
    /// The interpreter reported an error for this input.
    Failed(String),
    /// No answer within the configured evaluation timeout.
    Timeout(Duration),
    /// The process went away before answering.
    Disconnected,
    Io(std::io::Error),
}

impl From<std::io::Error> for EvalError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(detail) => write!(f, "{}", detail),
            Self::Timeout(d) => write!(f, "no reply from sclang after {:.1}s", d.as_secs_f32()),
            Self::Disconnected => write!(f, "sclang exited"),
            Self::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for EvalError {}

/// A running interpreter session.
pub trait Interpreter: Send {
    /// Evaluate code and wait for its printed result.
    fn interpret(&mut self, code: &str) -> EvalResult;

    /// Evaluate code without waiting for a result.
    fn send(&mut self, code: &str) -> EvalResult<()>;

    /// Whether the underlying process is still running.
    fn is_alive(&mut self) -> bool;

    /// Shut the interpreter down.
    fn quit(&mut self) -> EvalResult<()>;
}

/// Creates interpreter sessions. Output of the session goes to `post`.
pub trait Launcher: Send {
    fn launch(&mut self, post: &PostWindow) -> Result<Box<dyn Interpreter>, GatewayError>;
}
