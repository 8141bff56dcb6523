#![allow(dead_code)]
//! Shared fakes for envil-core integration tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};

use envil_core::{Dispatcher, Segmenter};
use envil_lang::{EvalError, EvalResult, GatewayError, Interpreter, InterpreterGateway, Launcher};
use envil_net::{BroadcastChannel, ServerMessage};
use envil_types::PostWindow;

/// Everything the fake interpreter was asked to do.
#[derive(Clone, Default)]
pub struct Calls {
    pub interpreted: Arc<Mutex<Vec<String>>>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub launches: Arc<AtomicUsize>,
    pub dead: Arc<AtomicBool>,
}

impl Calls {
    pub fn interpreted(&self) -> Vec<String> {
        self.interpreted.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

/// Echoes code back; `fail` anywhere in the input is an interpreter error.
pub struct FakeInterpreter {
    calls: Calls,
}

impl Interpreter for FakeInterpreter {
    fn interpret(&mut self, code: &str) -> EvalResult {
        self.calls.interpreted.lock().unwrap().push(code.to_string());
        if code.contains("fail") {
            Err(EvalError::Failed("ERROR: syntax error, unexpected NAME".into()))
        } else {
            Ok(format!("-> {}\n", code.lines().count()))
        }
    }

    fn send(&mut self, code: &str) -> EvalResult<()> {
        self.calls.sent.lock().unwrap().push(code.to_string());
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        !self.calls.dead.load(Ordering::SeqCst)
    }

    fn quit(&mut self) -> EvalResult<()> {
        self.calls.dead.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    calls: Calls,
}

impl Launcher for FakeLauncher {
    fn launch(&mut self, _post: &PostWindow) -> Result<Box<dyn Interpreter>, GatewayError> {
        self.calls.launches.fetch_add(1, Ordering::SeqCst);
        self.calls.dead.store(false, Ordering::SeqCst);
        Ok(Box::new(FakeInterpreter { calls: self.calls.clone() }))
    }
}

/// A dispatcher over an in-memory channel with one subscribed receiver.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub calls: Calls,
    pub post: PostWindow,
    pub client: Receiver<ServerMessage>,
}

impl Harness {
    pub fn new() -> Self {
        let calls = Calls::default();
        let post = PostWindow::new();
        let launcher = FakeLauncher { calls: calls.clone() };
        let gateway = InterpreterGateway::new(Box::new(launcher), post.clone()).with_server_boot(false);

        let mut channel = BroadcastChannel::new();
        let (tx, rx) = mpsc::channel();
        channel.register(Box::new(tx));

        let dispatcher = Dispatcher::new(Segmenter::default(), Box::new(channel), gateway);
        Self { dispatcher, calls, post, client: rx }
    }

    /// Same, with the environment already started.
    pub fn started() -> Self {
        let mut harness = Self::new();
        harness.dispatcher.start_environment();
        harness
    }

    /// Post window lines added since `mark`.
    pub fn posted_since(&self, mark: usize) -> Vec<String> {
        self.post.lines().into_iter().skip(mark).collect()
    }

    /// Statements the subscriber has received so far.
    pub fn received(&self) -> Vec<String> {
        self.client
            .try_iter()
            .filter_map(|msg| match msg {
                ServerMessage::NewCommand { data } => Some(data),
                _ => None,
            })
            .collect()
    }
}
