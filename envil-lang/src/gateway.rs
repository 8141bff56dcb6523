//! The single interpreter session and everything that may be done with it.

use std::fmt;

use log::{info, warn};

use envil_types::{DispatchError, PostWindow};

use crate::backend::{EvalError, Interpreter, Launcher};

/// Error surfaced by the gateway.
#[derive(Debug)]
pub enum GatewayError {
    /// No interpreter is running; nothing was sent.
    NoActiveSession,
    /// The interpreter rejected or failed on the input.
    EvaluationFailed(String),
    /// The interpreter could not be started.
    Launch(String),
    Io(std::io::Error),
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<EvalError> for GatewayError {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::Io(e) => Self::Io(e),
            other => Self::EvaluationFailed(other.to_string()),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveSession => write!(f, "sclang not started"),
            Self::EvaluationFailed(detail) => write!(f, "{}", detail),
            Self::Launch(e) => write!(f, "Error booting sclang: {}", e),
            Self::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for DispatchError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::NoActiveSession => DispatchError::NoActiveSession,
            GatewayError::EvaluationFailed(detail) => DispatchError::EvaluationFailed(detail),
            other => DispatchError::EvaluationFailed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Stopped,
    Running,
}

/// What a lifecycle request actually did. Repeated requests are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Started,
    AlreadyRunning,
    Stopped,
    NotRunning,
}

/// Owner of the one interpreter session.
pub struct InterpreterGateway {
    launcher: Box<dyn Launcher>,
    session: Option<Box<dyn Interpreter>>,
    server_running: bool,
    boot_server_on_start: bool,
    post: PostWindow,
}

impl InterpreterGateway {
    pub fn new(launcher: Box<dyn Launcher>, post: PostWindow) -> Self {
        Self {
            launcher,
            session: None,
            server_running: false,
            boot_server_on_start: true,
            post,
        }
    }

    /// Whether starting sclang also boots the audio server.
    pub fn with_server_boot(mut self, boot: bool) -> Self {
        self.boot_server_on_start = boot;
        self
    }

    pub fn post_window(&self) -> &PostWindow {
        &self.post
    }

    /// Current session state. A session whose process has exited is dropped here.
    pub fn status(&mut self) -> SessionStatus {
        if self.live_session().is_ok() {
            SessionStatus::Running
        } else {
            SessionStatus::Stopped
        }
    }

    pub fn server_running(&self) -> bool {
        self.server_running
    }

    fn live_session(&mut self) -> Result<&mut Box<dyn Interpreter>, GatewayError> {
        let alive = match self.session.as_mut() {
            Some(session) => session.is_alive(),
            None => return Err(GatewayError::NoActiveSession),
        };
        if !alive {
            warn!(target: "sclang", "sclang process exited");
            self.post.append_line("sclang exited");
            self.session = None;
            self.server_running = false;
        }
        self.session.as_mut().ok_or(GatewayError::NoActiveSession)
    }

    /// Boot sclang. Starting while running only posts a warning.
    pub fn start(&mut self) -> Result<Lifecycle, GatewayError> {
        if self.status() == SessionStatus::Running {
            warn!(target: "sclang", "start requested while sclang is running");
            self.post.append_line("there is already an instance of sclang running");
            return Ok(Lifecycle::AlreadyRunning);
        }

        self.post.append_line("Booting sclang");
        match self.launcher.launch(&self.post) {
            Ok(session) => {
                self.session = Some(session);
                self.post.append_line("Successfully booted sclang");
                info!(target: "sclang", "sclang session started");
            }
            Err(e) => {
                self.post.append_line("Error booting sclang");
                self.post.append_line(&e.to_string());
                return Err(e);
            }
        }

        if self.boot_server_on_start {
            // a failed server boot leaves sclang running
            let _ = self.boot_server();
        }
        Ok(Lifecycle::Started)
    }

    /// Quit the server (if booted) and sclang. No session is a no-op.
    pub fn stop(&mut self) -> Result<Lifecycle, GatewayError> {
        if self.status() == SessionStatus::Stopped {
            return Ok(Lifecycle::NotRunning);
        }
        if self.server_running {
            let _ = self.quit_server();
        }
        let result = match self.session.take() {
            Some(mut session) => session.quit(),
            None => Ok(()),
        };
        self.server_running = false;
        info!(target: "sclang", "sclang session stopped");
        match result {
            Ok(()) => {
                self.post.append_line("sclang stopped");
                Ok(Lifecycle::Stopped)
            }
            Err(e) => {
                self.post.append_line(&e.to_string());
                Err(e.into())
            }
        }
    }

    pub fn toggle(&mut self) -> Result<Lifecycle, GatewayError> {
        match self.status() {
            SessionStatus::Stopped => self.start(),
            SessionStatus::Running => self.stop(),
        }
    }

    /// Evaluate code and return its trimmed result.
    pub fn evaluate(&mut self, code: &str) -> Result<String, GatewayError> {
        let session = self.live_session()?;
        match session.interpret(code) {
            Ok(result) => Ok(result.trim().to_string()),
            Err(EvalError::Disconnected) => {
                self.session = None;
                self.server_running = false;
                Err(EvalError::Disconnected.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Evaluate code without waiting; output still reaches the post window.
    pub fn evaluate_detached(&mut self, code: &str) -> Result<(), GatewayError> {
        self.live_session()?.send(code)?;
        Ok(())
    }

    /// Stop all sound (`CmdPeriod.run`).
    pub fn hush(&mut self) -> Result<String, GatewayError> {
        if self.live_session().is_err() {
            self.post.append_line("sclang not started, cannot hush");
            return Err(GatewayError::NoActiveSession);
        }
        self.evaluate("CmdPeriod.run")
    }

    /// Boot scsynth through sclang.
    pub fn boot_server(&mut self) -> Result<Lifecycle, GatewayError> {
        if self.live_session().is_err() {
            self.post.append_line("sclang not started, cannot boot scsynth");
            return Err(GatewayError::NoActiveSession);
        }
        if self.server_running {
            self.post.append_line("there is already an instance of scsynth running");
            return Ok(Lifecycle::AlreadyRunning);
        }

        self.post.append_line("Booting scsynth");
        match self.evaluate("s.boot") {
            Ok(result) => {
                if !result.is_empty() {
                    self.post.append_line(&result);
                }
                self.server_running = true;
                self.post.append_line("Successfully booted scsynth");
                Ok(Lifecycle::Started)
            }
            Err(e) => {
                self.post.append_line("Error booting scsynth");
                self.post.append_line(&e.to_string());
                Err(e)
            }
        }
    }

    pub fn quit_server(&mut self) -> Result<Lifecycle, GatewayError> {
        if !self.server_running {
            return Ok(Lifecycle::NotRunning);
        }
        let result = self.evaluate("Server.killAll");
        self.server_running = false;
        match result {
            Ok(_) => Ok(Lifecycle::Stopped),
            Err(e) => {
                self.post.append_line(&e.to_string());
                Err(e)
            }
        }
    }

    pub fn toggle_server(&mut self) -> Result<Lifecycle, GatewayError> {
        if self.server_running {
            self.quit_server()
        } else {
            self.boot_server()
        }
    }
}

impl Drop for InterpreterGateway {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.quit();
        }
    }
}
