use std::fmt;

/// Why one dispatch invocation did not run to a result.
///
/// Every variant is terminal for its invocation and recoverable for the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The environment has not been started.
    NotReady,
    /// The interpreter is not running.
    NoActiveSession,
    /// Downstream execution reported an error.
    EvaluationFailed(String),
    /// No bracket region encloses the cursor.
    MalformedRegion,
    /// Scope classification was not available for this call.
    OracleUnavailable(String),
    /// The broadcast transport could not be brought up.
    Broadcast(String),
}

impl DispatchError {
    /// Silent errors become a no-op instead of a user-facing message.
    pub fn is_silent(&self) -> bool {
        matches!(self, DispatchError::MalformedRegion)
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "ENVIL environment is not started"),
            Self::NoActiveSession => {
                write!(f, "sclang not started, cannot evaluate supercollider code")
            }
            Self::EvaluationFailed(detail) => write!(f, "{}", detail),
            Self::MalformedRegion => write!(f, "no bracket region at cursor"),
            Self::OracleUnavailable(e) => write!(f, "scope classification unavailable: {}", e),
            Self::Broadcast(e) => write!(f, "broadcast error: {}", e),
        }
    }
}

impl std::error::Error for DispatchError {}
