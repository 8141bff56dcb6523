//! sclang subprocess driven over stdin/stdout.
//!
//! Each request is wrapped in a small sclang program that compiles the code,
//! runs it, and posts the outcome between `<<envil:ID:…>>` markers. A reader
//! thread per pipe copies output to the post window and routes marked replies
//! back to the waiting request.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use regex::Regex;

use envil_types::PostWindow;

use crate::backend::{EvalError, EvalResult, Interpreter, Launcher};
use crate::gateway::GatewayError;

const SCLANG_PATHS: [&str; 4] = [
    "sclang",
    "/Applications/SuperCollider.app/Contents/MacOS/sclang",
    "/usr/local/bin/sclang",
    "/usr/bin/sclang",
];

/// Printed by sclang once the class library is compiled.
const READY_BANNER: &str = "Welcome to SuperCollider";

/// sclang's terminal mode evaluates its input buffer on form feed.
const EVAL_CHAR: char = '\x0c';

/// How long `quit` waits for a clean exit before killing.
const QUIT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct SclangOptions {
    /// Explicit executable; otherwise the usual install locations are tried.
    pub executable: Option<PathBuf>,
    /// Passed as `-l <file>`.
    pub conf: Option<PathBuf>,
    pub boot_timeout: Duration,
    /// `None` waits indefinitely.
    pub eval_timeout: Option<Duration>,
}

impl Default for SclangOptions {
    fn default() -> Self {
        Self {
            executable: None,
            conf: None,
            boot_timeout: Duration::from_secs(10),
            eval_timeout: None,
        }
    }
}

enum ProcessEvent {
    Ready,
    Reply { id: u64, outcome: Result<String, String> },
    Exited,
}

#[derive(Debug, PartialEq)]
enum Parsed {
    Post(String),
    Reply(u64, Result<String, String>),
}

struct Capture {
    id: u64,
    is_error: bool,
    text: String,
}

impl Capture {
    fn finish(self) -> Parsed {
        if self.is_error {
            Parsed::Reply(self.id, Err(self.text))
        } else {
            Parsed::Reply(self.id, Ok(self.text))
        }
    }
}

fn end_marker(id: u64) -> String {
    format!("<<envil:{}:end>>", id)
}

/// Splits sclang stdout into post-window text and request replies.
struct OutputParser {
    start_re: Regex,
    capture: Option<Capture>,
}

impl OutputParser {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            start_re: Regex::new(r"<<envil:(\d+):(result|error)>>")?,
            capture: None,
        })
    }

    fn feed(&mut self, line: &str, out: &mut Vec<Parsed>) {
        let mut rest = line;

        if let Some(mut capture) = self.capture.take() {
            let end = end_marker(capture.id);
            capture.text.push('\n');
            match rest.find(&end) {
                Some(idx) => {
                    capture.text.push_str(&rest[..idx]);
                    out.push(capture.finish());
                    rest = &rest[idx + end.len()..];
                }
                None => {
                    capture.text.push_str(rest);
                    self.capture = Some(capture);
                    return;
                }
            }
        }

        while let Some(caps) = self.start_re.captures(rest) {
            let (start, stop) = match caps.get(0) {
                Some(m) => (m.start(), m.end()),
                None => break,
            };
            let before = &rest[..start];
            if !before.is_empty() {
                out.push(Parsed::Post(before.to_string()));
            }

            let id: u64 = caps[1].parse().unwrap_or(0);
            let capture = Capture {
                id,
                is_error: &caps[2] == "error",
                text: String::new(),
            };
            let after = &rest[stop..];
            let end = end_marker(id);
            match after.find(&end) {
                Some(idx) => {
                    out.push(Capture { text: after[..idx].to_string(), ..capture }.finish());
                    rest = &after[idx + end.len()..];
                }
                None => {
                    self.capture = Some(Capture { text: after.to_string(), ..capture });
                    return;
                }
            }
        }

        if !rest.is_empty() {
            out.push(Parsed::Post(rest.to_string()));
        }
    }
}

/// Quote `code` as the body of an sclang string literal.
fn escape_sc_string(code: &str) -> String {
    let mut out = String::with_capacity(code.len() + 8);
    for ch in code.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            EVAL_CHAR => {}
            _ => out.push(ch),
        }
    }
    out
}

/// The sclang program that evaluates `code` and posts a marked reply.
fn wrap_request(id: u64, code: &str) -> String {
    format!(
        concat!(
            "{{\n",
            "    var envilFn = thisProcess.interpreter.compile(\"{code}\");\n",
            "    if(envilFn.isNil) {{\n",
            "        \"<<envil:{id}:error>>syntax error<<envil:{id}:end>>\".postln;\n",
            "    }} {{\n",
            "        {{\n",
            "            var envilResult = envilFn.value;\n",
            "            (\"<<envil:{id}:result>>\" ++ envilResult.asString ++ \"<<envil:{id}:end>>\").postln;\n",
            "        }}.try {{ |envilErr|\n",
            "            (\"<<envil:{id}:error>>\" ++ envilErr.errorString ++ \"<<envil:{id}:end>>\").postln;\n",
            "        }};\n",
            "    }};\n",
            "    nil\n",
            "}}.value;\n",
        ),
        code = escape_sc_string(code),
        id = id,
    )
}

/// Read `\n`-terminated lines, tolerating invalid UTF-8.
fn for_each_line<R: Read>(pipe: R, mut f: impl FnMut(&str)) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                f(line.trim_end_matches(&['\n', '\r'][..]));
            }
            Err(e) => {
                warn!(target: "sclang", "pipe read error: {}", e);
                break;
            }
        }
    }
}

/// A booted sclang process.
pub struct SclangProcess {
    child: Child,
    stdin: ChildStdin,
    events: Receiver<ProcessEvent>,
    next_id: u64,
    eval_timeout: Option<Duration>,
}

impl SclangProcess {
    /// Launch sclang and wait for it to finish booting.
    pub fn spawn(options: &SclangOptions, post: &PostWindow) -> Result<Self, GatewayError> {
        let candidates: Vec<PathBuf> = match &options.executable {
            Some(path) => vec![path.clone()],
            None => SCLANG_PATHS.iter().map(PathBuf::from).collect(),
        };

        for path in &candidates {
            let mut cmd = Command::new(path);
            cmd.arg("-i").arg("envil");
            if let Some(conf) = &options.conf {
                cmd.arg("-l").arg(conf);
            }
            match cmd
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
            {
                Ok(child) => {
                    info!(target: "sclang", "spawned {} (pid {})", path.display(), child.id());
                    return Self::attach(child, options, post);
                }
                Err(e) => {
                    debug!(target: "sclang", "could not start {}: {}", path.display(), e);
                    continue;
                }
            }
        }

        Err(GatewayError::Launch(
            "Could not find sclang. Install SuperCollider.".to_string(),
        ))
    }

    fn attach(mut child: Child, options: &SclangOptions, post: &PostWindow) -> Result<Self, GatewayError> {
        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(i), Some(o), Some(e)) => (i, o, e),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GatewayError::Launch("sclang pipes unavailable".to_string()));
            }
        };
        let mut parser = OutputParser::new().map_err(|e| GatewayError::Launch(e.to_string()))?;
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        let stdout_post = post.clone();
        thread::spawn(move || {
            stdout_reader_thread(stdout, &mut parser, &stdout_post, &event_tx);
        });

        let stderr_post = post.clone();
        thread::spawn(move || {
            for_each_line(stderr, |line| {
                let line = line.trim();
                if !line.is_empty() {
                    stderr_post.append_line(line);
                }
            });
        });

        let mut process = Self {
            child,
            stdin,
            events: event_rx,
            next_id: 0,
            eval_timeout: options.eval_timeout,
        };
        // dropping `process` on failure kills the child
        process.wait_ready(options.boot_timeout)?;
        Ok(process)
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<(), GatewayError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(ProcessEvent::Ready) => return Ok(()),
                Ok(ProcessEvent::Reply { .. }) => {}
                Ok(ProcessEvent::Exited) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(GatewayError::Launch("sclang exited during boot".to_string()));
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(GatewayError::Launch(format!(
                        "sclang did not boot within {}s",
                        timeout.as_secs()
                    )));
                }
            }
        }
    }

    fn write_code(&mut self, code: &str) -> io::Result<()> {
        let mut payload: String = code.chars().filter(|&c| c != EVAL_CHAR).collect();
        payload.push(EVAL_CHAR);
        self.stdin.write_all(payload.as_bytes())?;
        self.stdin.flush()
    }

    fn next_event(&self) -> EvalResult<ProcessEvent> {
        match self.eval_timeout {
            Some(timeout) => self.events.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => EvalError::Timeout(timeout),
                RecvTimeoutError::Disconnected => EvalError::Disconnected,
            }),
            None => self.events.recv().map_err(|_| EvalError::Disconnected),
        }
    }
}

fn stdout_reader_thread(
    stdout: impl Read,
    parser: &mut OutputParser,
    post: &PostWindow,
    events: &Sender<ProcessEvent>,
) {
    let mut parsed = Vec::new();
    for_each_line(stdout, |line| {
        if line.contains(READY_BANNER) {
            let _ = events.send(ProcessEvent::Ready);
        }
        parser.feed(line, &mut parsed);
        for item in parsed.drain(..) {
            match item {
                Parsed::Post(text) => post.append_line(&text),
                Parsed::Reply(id, outcome) => {
                    let _ = events.send(ProcessEvent::Reply { id, outcome });
                }
            }
        }
    });
    let _ = events.send(ProcessEvent::Exited);
    debug!(target: "sclang", "stdout reader exiting");
}

impl Interpreter for SclangProcess {
    fn interpret(&mut self, code: &str) -> EvalResult {
        let id = self.next_id;
        self.next_id += 1;
        self.write_code(&wrap_request(id, code))?;

        loop {
            match self.next_event()? {
                ProcessEvent::Reply { id: got, outcome } if got == id => {
                    return outcome.map_err(EvalError::Failed);
                }
                // replies to requests that already timed out
                ProcessEvent::Reply { .. } | ProcessEvent::Ready => {}
                ProcessEvent::Exited => return Err(EvalError::Disconnected),
            }
        }
    }

    fn send(&mut self, code: &str) -> EvalResult<()> {
        self.write_code(code)?;
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn quit(&mut self) -> EvalResult<()> {
        let _ = self.write_code("0.exit;");
        let deadline = Instant::now() + QUIT_GRACE;
        while Instant::now() < deadline {
            if !self.is_alive() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for SclangProcess {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Launches real sclang processes.
pub struct SclangLauncher {
    options: SclangOptions,
}

impl SclangLauncher {
    pub fn new(options: SclangOptions) -> Self {
        Self { options }
    }
}

impl Launcher for SclangLauncher {
    fn launch(&mut self, post: &PostWindow) -> Result<Box<dyn Interpreter>, GatewayError> {
        Ok(Box::new(SclangProcess::spawn(&self.options, post)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(lines: &[&str]) -> Vec<Parsed> {
        let mut parser = OutputParser::new().unwrap();
        let mut out = Vec::new();
        for line in lines {
            parser.feed(line, &mut out);
        }
        out
    }

    #[test]
    fn plain_output_is_posted_verbatim() {
        assert_eq!(
            feed_all(&["compiling class library...", "", "   ", "\tindented"]),
            vec![
                Parsed::Post("compiling class library...".to_string()),
                Parsed::Post("   ".to_string()),
                Parsed::Post("\tindented".to_string()),
            ]
        );
    }

    #[test]
    fn single_line_reply() {
        assert_eq!(
            feed_all(&["<<envil:3:result>>a Synth<<envil:3:end>>"]),
            vec![Parsed::Reply(3, Ok("a Synth".to_string()))]
        );
    }

    #[test]
    fn error_reply_spanning_lines() {
        assert_eq!(
            feed_all(&["<<envil:0:error>>ERROR: Message 'foo'", "not understood.<<envil:0:end>>"]),
            vec![Parsed::Reply(0, Err("ERROR: Message 'foo'\nnot understood.".to_string()))]
        );
    }

    #[test]
    fn text_around_markers_is_posted() {
        assert_eq!(
            feed_all(&["boot <<envil:1:result>>ok<<envil:1:end>> done"]),
            vec![
                Parsed::Post("boot ".to_string()),
                Parsed::Reply(1, Ok("ok".to_string())),
                Parsed::Post(" done".to_string()),
            ]
        );
    }

    #[test]
    fn escape_quotes_and_backslashes() {
        assert_eq!(escape_sc_string(r#""a\b""#), r#"\"a\\b\""#);
        assert_eq!(escape_sc_string("x\x0cy"), "xy");
    }

    #[test]
    fn wrapped_request_embeds_code_and_markers() {
        let program = wrap_request(9, "SinOsc.ar(\"x\")");
        assert!(program.contains("compile(\"SinOsc.ar(\\\"x\\\")\")"));
        assert!(program.contains("<<envil:9:result>>"));
        assert!(program.contains("<<envil:9:error>>"));
        assert!(program.contains("<<envil:9:end>>"));
        assert!(!program.contains(EVAL_CHAR));
    }

    #[test]
    fn missing_executable_reports_launch_error() {
        let options = SclangOptions {
            executable: Some(PathBuf::from("/nonexistent/envil-sclang")),
            ..SclangOptions::default()
        };
        match SclangProcess::spawn(&options, &PostWindow::new()) {
            Err(GatewayError::Launch(msg)) => assert!(msg.contains("Could not find sclang")),
            Err(other) => panic!("expected Launch error, got {:?}", other),
            Ok(_) => panic!("expected Launch error"),
        }
    }
}
