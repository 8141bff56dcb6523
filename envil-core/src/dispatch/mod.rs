//! Editor commands in, downstream calls out.
//!
//! The dispatcher routes visual code through the segmenter to the statement
//! sink and audio code through region extraction to the interpreter gateway.
//! Every failure ends here as at most one post window line.

mod hydra;
mod sink;
mod supercollider;

pub use sink::{StatementSink, TcpBroadcast};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use envil_lang::{InterpreterGateway, Lifecycle, SclangLauncher};
use envil_types::{CursorPosition, DispatchError, LanguageMode, PostWindow, Selection};

use crate::config::Config;
use crate::scope::{SclangScopes, ScopeOracle};
use crate::segment::Segmenter;

/// One editor command, as sent by the host one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    StartEnvironment,
    StopEnvironment,
    /// Segment and broadcast visual code.
    EvaluateStatements {
        text: String,
        #[serde(default)]
        selection: Option<Selection>,
    },
    /// Evaluate the selection, or the bracket region under the cursor.
    Evaluate {
        text: String,
        #[serde(default)]
        selection: Option<Selection>,
    },
    EvaluateRegion {
        text: String,
        cursor: CursorPosition,
    },
    /// Like `Evaluate`, but sent without waiting for a result.
    EvaluateDetached {
        text: String,
        #[serde(default)]
        selection: Option<Selection>,
    },
    StartInterpreter,
    StopInterpreter,
    ToggleInterpreter,
    InterpreterStatus,
    Hush,
    BootServer,
    QuitServer,
    ToggleServer,
}

impl Command {
    /// The language a command belongs to; `None` for environment commands.
    pub fn mode(&self) -> Option<LanguageMode> {
        match self {
            Command::StartEnvironment | Command::StopEnvironment => None,
            Command::EvaluateStatements { .. } => Some(LanguageMode::Hydra),
            _ => Some(LanguageMode::SuperCollider),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    #[default]
    Idle,
    Dispatching,
}

/// What a command ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Statements handed to the sink.
    Published(usize),
    /// Trimmed interpreter result.
    Evaluated(String),
    /// No bracket region at the cursor; nothing happened.
    NoRegion,
    /// Code written to sclang without waiting for its reply.
    Sent,
    Lifecycle(String),
    Rejected(DispatchError),
}

pub struct Dispatcher {
    segmenter: Segmenter,
    sink: Box<dyn StatementSink>,
    gateway: InterpreterGateway,
    oracle: Box<dyn ScopeOracle>,
    post: PostWindow,
    environment_active: bool,
    hydra_state: DispatchState,
    supercollider_state: DispatchState,
}

impl Dispatcher {
    /// The gateway's post window is shared as the dispatcher's log surface.
    pub fn new(
        segmenter: Segmenter,
        sink: Box<dyn StatementSink>,
        gateway: InterpreterGateway,
    ) -> Self {
        let post = gateway.post_window().clone();
        Self {
            segmenter,
            sink,
            gateway,
            oracle: Box::new(SclangScopes::new()),
            post,
            environment_active: false,
            hydra_state: DispatchState::Idle,
            supercollider_state: DispatchState::Idle,
        }
    }

    /// TCP broadcast and a real sclang launcher, both from `config`.
    pub fn from_config(config: &Config, post: PostWindow) -> Self {
        let launcher = SclangLauncher::new(config.sclang_options());
        let gateway = InterpreterGateway::new(Box::new(launcher), post)
            .with_server_boot(config.boot_server_on_start());
        let sink = TcpBroadcast::new(config.broadcast_addr());
        let mut dispatcher = Self::new(Segmenter::new(config.rewrite_rule()), Box::new(sink), gateway);
        if config.active_on_launch() {
            dispatcher.start_environment();
        }
        dispatcher
    }

    pub fn with_oracle(mut self, oracle: Box<dyn ScopeOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn post_window(&self) -> &PostWindow {
        &self.post
    }

    pub fn is_environment_active(&self) -> bool {
        self.environment_active
    }

    pub fn state(&self, mode: LanguageMode) -> DispatchState {
        match mode {
            LanguageMode::Hydra => self.hydra_state,
            LanguageMode::SuperCollider => self.supercollider_state,
        }
    }

    pub fn sink(&self) -> &dyn StatementSink {
        self.sink.as_ref()
    }

    pub fn gateway_mut(&mut self) -> &mut InterpreterGateway {
        &mut self.gateway
    }

    /// Service the statement sink between commands.
    pub fn pump(&mut self) {
        self.sink.pump();
    }

    pub fn dispatch(&mut self, command: &Command) -> Outcome {
        debug!(target: "dispatch", "{:?}", command);
        match command {
            Command::StartEnvironment => self.start_environment(),
            Command::StopEnvironment => self.stop_environment(),
            Command::EvaluateStatements { text, selection } => {
                self.evaluate_statements(text, selection.as_ref())
            }
            Command::Evaluate { text, selection } => self.evaluate(text, selection.as_ref()),
            Command::EvaluateRegion { text, cursor } => self.evaluate_region(text, *cursor),
            Command::EvaluateDetached { text, selection } => {
                self.evaluate_detached(text, selection.as_ref())
            }
            Command::StartInterpreter => self.lifecycle("sclang", |gw| gw.start()),
            Command::StopInterpreter => self.lifecycle("sclang", |gw| gw.stop()),
            Command::ToggleInterpreter => self.lifecycle("sclang", |gw| gw.toggle()),
            Command::InterpreterStatus => self.interpreter_status(),
            Command::Hush => self.hush(),
            Command::BootServer => self.lifecycle("scsynth", |gw| gw.boot_server()),
            Command::QuitServer => self.lifecycle("scsynth", |gw| gw.quit_server()),
            Command::ToggleServer => self.lifecycle("scsynth", |gw| gw.toggle_server()),
        }
    }

    pub fn start_environment(&mut self) -> Outcome {
        if self.environment_active {
            return Outcome::Lifecycle("ENVIL environment is already started".into());
        }
        if let Err(e) = self.sink.open() {
            return self.reject(e);
        }
        self.environment_active = true;
        info!(target: "dispatch", "environment started");
        self.post.append_line("ENVIL environment started");
        Outcome::Lifecycle("ENVIL environment started".into())
    }

    /// Also stops the interpreter.
    pub fn stop_environment(&mut self) -> Outcome {
        if !self.environment_active {
            return Outcome::Lifecycle("ENVIL environment is not started".into());
        }
        if let Err(e) = self.gateway.stop() {
            warn!(target: "dispatch", "stopping sclang failed: {}", e);
        }
        self.sink.close();
        self.environment_active = false;
        info!(target: "dispatch", "environment stopped");
        self.post.append_line("ENVIL environment stopped");
        Outcome::Lifecycle("ENVIL environment stopped".into())
    }

    /// Readiness gate shared by every evaluate and interpreter command.
    fn ensure_ready(&self) -> Result<(), DispatchError> {
        if self.environment_active {
            Ok(())
        } else {
            Err(DispatchError::NotReady)
        }
    }

    fn state_mut(&mut self, mode: LanguageMode) -> &mut DispatchState {
        match mode {
            LanguageMode::Hydra => &mut self.hydra_state,
            LanguageMode::SuperCollider => &mut self.supercollider_state,
        }
    }

    /// Run one downstream call in `Dispatching`, returning to `Idle` either way.
    fn run<F>(&mut self, mode: LanguageMode, call: F) -> Outcome
    where
        F: FnOnce(&mut Self) -> Result<Outcome, DispatchError>,
    {
        if let Err(e) = self.ensure_ready() {
            return self.reject(e);
        }
        *self.state_mut(mode) = DispatchState::Dispatching;
        let result = call(self);
        *self.state_mut(mode) = DispatchState::Idle;
        match result {
            Ok(outcome) => outcome,
            Err(e) => self.reject(e),
        }
    }

    /// Turn an error into its single user-visible line.
    fn reject(&self, e: DispatchError) -> Outcome {
        if e.is_silent() {
            debug!(target: "dispatch", "{}", e);
            return Outcome::NoRegion;
        }
        warn!(target: "dispatch", "{}", e);
        self.post.append_line(&e.to_string());
        Outcome::Rejected(e)
    }
}

fn describe(program: &str, lifecycle: Lifecycle) -> String {
    match lifecycle {
        Lifecycle::Started => format!("{} started", program),
        Lifecycle::AlreadyRunning => format!("{} is already running", program),
        Lifecycle::Stopped => format!("{} stopped", program),
        Lifecycle::NotRunning => format!("{} is not running", program),
    }
}
