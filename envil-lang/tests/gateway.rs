use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use envil_lang::{
    EvalError, EvalResult, GatewayError, Interpreter, InterpreterGateway, Launcher, Lifecycle,
    SessionStatus,
};
use envil_types::{DispatchError, PostWindow};

/// Shared record of what the scripted interpreter saw.
#[derive(Clone, Default)]
struct Calls {
    interpreted: Arc<Mutex<Vec<String>>>,
    sent: Arc<Mutex<Vec<String>>>,
    launches: Arc<AtomicUsize>,
    quits: Arc<AtomicUsize>,
    dead: Arc<AtomicBool>,
}

impl Calls {
    fn interpreted(&self) -> Vec<String> {
        self.interpreted.lock().unwrap().clone()
    }
}

struct ScriptedInterpreter {
    calls: Calls,
}

impl Interpreter for ScriptedInterpreter {
    fn interpret(&mut self, code: &str) -> EvalResult {
        self.calls.interpreted.lock().unwrap().push(code.to_string());
        match code {
            "boom" => Err(EvalError::Failed("ERROR: Message 'boom' not understood.".into())),
            "crash" => {
                self.calls.dead.store(true, Ordering::SeqCst);
                Err(EvalError::Disconnected)
            }
            _ => Ok(format!("  -> {}\n", code)),
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
        self.calls.quits.fetch_add(1, Ordering::SeqCst);
        self.calls.dead.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedLauncher {
    calls: Calls,
    fail: bool,
}

impl Launcher for ScriptedLauncher {
    fn launch(&mut self, _post: &PostWindow) -> Result<Box<dyn Interpreter>, GatewayError> {
        if self.fail {
            return Err(GatewayError::Launch("Could not find sclang. Install SuperCollider.".into()));
        }
        self.calls.launches.fetch_add(1, Ordering::SeqCst);
        self.calls.dead.store(false, Ordering::SeqCst);
        Ok(Box::new(ScriptedInterpreter { calls: self.calls.clone() }))
    }
}

fn gateway(boot_server: bool) -> (InterpreterGateway, Calls, PostWindow) {
    let calls = Calls::default();
    let post = PostWindow::new();
    let launcher = ScriptedLauncher { calls: calls.clone(), fail: false };
    let gw = InterpreterGateway::new(Box::new(launcher), post.clone()).with_server_boot(boot_server);
    (gw, calls, post)
}

#[test]
fn test_evaluate_without_session_fails_fast() {
    let (mut gw, calls, post) = gateway(false);
    match gw.evaluate("1 + 1") {
        Err(GatewayError::NoActiveSession) => {}
        other => panic!("expected NoActiveSession, got {:?}", other),
    }
    assert!(calls.interpreted().is_empty());
    assert_eq!(calls.launches.load(Ordering::SeqCst), 0);
    assert!(post.is_empty());
}

#[test]
fn test_start_then_evaluate_returns_trimmed_result() {
    let (mut gw, calls, post) = gateway(false);
    assert_eq!(gw.start().unwrap(), Lifecycle::Started);
    assert_eq!(gw.status(), SessionStatus::Running);
    assert_eq!(gw.evaluate("1 + 1").unwrap(), "-> 1 + 1");
    assert_eq!(calls.interpreted(), vec!["1 + 1"]);
    assert_eq!(post.lines(), vec!["Booting sclang", "Successfully booted sclang"]);
}

#[test]
fn test_start_is_idempotent() {
    let (mut gw, calls, post) = gateway(false);
    gw.start().unwrap();
    assert_eq!(gw.start().unwrap(), Lifecycle::AlreadyRunning);
    assert_eq!(calls.launches.load(Ordering::SeqCst), 1);
    assert_eq!(
        post.last_line().as_deref(),
        Some("there is already an instance of sclang running")
    );
}

#[test]
fn test_stop_without_session_is_noop() {
    let (mut gw, calls, post) = gateway(false);
    assert_eq!(gw.stop().unwrap(), Lifecycle::NotRunning);
    assert_eq!(calls.quits.load(Ordering::SeqCst), 0);
    assert!(post.is_empty());
}

#[test]
fn test_toggle_flips_session() {
    let (mut gw, calls, _post) = gateway(false);
    assert_eq!(gw.toggle().unwrap(), Lifecycle::Started);
    assert_eq!(gw.toggle().unwrap(), Lifecycle::Stopped);
    assert_eq!(gw.status(), SessionStatus::Stopped);
    assert_eq!(calls.quits.load(Ordering::SeqCst), 1);
    assert!(matches!(gw.evaluate("x"), Err(GatewayError::NoActiveSession)));
}

#[test]
fn test_evaluation_error_is_reported_verbatim() {
    let (mut gw, _calls, _post) = gateway(false);
    gw.start().unwrap();
    let err = gw.evaluate("boom").unwrap_err();
    assert_eq!(
        DispatchError::from(err),
        DispatchError::EvaluationFailed("ERROR: Message 'boom' not understood.".into())
    );
    // session survives an evaluation error
    assert_eq!(gw.status(), SessionStatus::Running);
}

#[test]
fn test_process_exit_destroys_session() {
    let (mut gw, _calls, _post) = gateway(false);
    gw.start().unwrap();
    assert!(gw.evaluate("crash").is_err());
    assert_eq!(gw.status(), SessionStatus::Stopped);
    assert!(matches!(gw.evaluate("1"), Err(GatewayError::NoActiveSession)));
}

#[test]
fn test_detached_evaluation_sends_without_waiting() {
    let (mut gw, calls, _post) = gateway(false);
    assert!(matches!(gw.evaluate_detached("x"), Err(GatewayError::NoActiveSession)));
    gw.start().unwrap();
    gw.evaluate_detached("Pbind().play").unwrap();
    assert_eq!(*calls.sent.lock().unwrap(), vec!["Pbind().play"]);
    assert!(calls.interpreted().is_empty());
}

#[test]
fn test_start_boots_server_when_configured() {
    let (mut gw, calls, post) = gateway(true);
    gw.start().unwrap();
    assert!(gw.server_running());
    assert_eq!(calls.interpreted(), vec!["s.boot"]);
    assert!(post.lines().contains(&"Successfully booted scsynth".to_string()));

    gw.stop().unwrap();
    assert!(!gw.server_running());
    assert_eq!(calls.interpreted(), vec!["s.boot", "Server.killAll"]);
}

#[test]
fn test_server_requires_session() {
    let (mut gw, _calls, post) = gateway(false);
    assert!(matches!(gw.boot_server(), Err(GatewayError::NoActiveSession)));
    assert_eq!(post.lines(), vec!["sclang not started, cannot boot scsynth"]);
}

#[test]
fn test_hush_requires_session() {
    let (mut gw, calls, post) = gateway(false);
    assert!(matches!(gw.hush(), Err(GatewayError::NoActiveSession)));
    assert_eq!(post.lines(), vec!["sclang not started, cannot hush"]);
    assert!(calls.interpreted().is_empty());
}

#[test]
fn test_toggle_server_and_hush() {
    let (mut gw, calls, _post) = gateway(false);
    gw.start().unwrap();
    assert_eq!(gw.toggle_server().unwrap(), Lifecycle::Started);
    assert_eq!(gw.boot_server().unwrap(), Lifecycle::AlreadyRunning);
    gw.hush().unwrap();
    assert_eq!(gw.toggle_server().unwrap(), Lifecycle::Stopped);
    assert_eq!(
        calls.interpreted(),
        vec!["s.boot", "CmdPeriod.run", "Server.killAll"]
    );
}

#[test]
fn test_launch_failure_leaves_no_session() {
    let post = PostWindow::new();
    let launcher = ScriptedLauncher { calls: Calls::default(), fail: true };
    let mut gw = InterpreterGateway::new(Box::new(launcher), post.clone());
    assert!(matches!(gw.start(), Err(GatewayError::Launch(_))));
    assert_eq!(gw.status(), SessionStatus::Stopped);
    assert_eq!(post.lines()[1], "Error booting sclang");
}
