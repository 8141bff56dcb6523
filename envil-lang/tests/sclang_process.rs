#![cfg(unix)]
//! Drives `SclangProcess` against a shell script that speaks the reply
//! marker protocol, so the real pipe handling runs without SuperCollider.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use envil_lang::{EvalError, GatewayError, Interpreter, SclangOptions, SclangProcess};
use envil_types::PostWindow;

const FAKE_SCLANG: &str = r#"#!/bin/sh
echo "compiling class library..."
echo "  warning: startup file not found  " >&2
echo "Welcome to SuperCollider 3.13.0. For help type cmd-d."
id=0
while IFS= read -r line; do
    case "$line" in
        *'compile("1 + 2")'*)
            echo "a posted line"
            echo "<<envil:$id:result>>3<<envil:$id:end>>"
            id=$((id + 1)) ;;
        *'compile("oops")'*)
            echo "<<envil:$id:error>>ERROR: Message 'oops' not understood."
            echo "<<envil:$id:end>>"
            id=$((id + 1)) ;;
        *'compile("'*)
            id=$((id + 1)) ;;
    esac
done
"#;

fn write_script(dir: &Path) -> PathBuf {
    let path = dir.join("sclang");
    fs::write(&path, FAKE_SCLANG).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn wait_for_line(post: &PostWindow, line: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if post.lines().iter().any(|l| l == line) {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_scripted_sclang_session() {
    let dir = tempfile::tempdir().unwrap();
    let options = SclangOptions {
        executable: Some(write_script(dir.path())),
        conf: None,
        boot_timeout: Duration::from_secs(5),
        eval_timeout: Some(Duration::from_millis(300)),
    };
    let post = PostWindow::new();
    let mut sclang = SclangProcess::spawn(&options, &post).unwrap();
    assert!(sclang.is_alive());

    assert_eq!(sclang.interpret("1 + 2").unwrap(), "3");
    assert!(wait_for_line(&post, "compiling class library..."));
    assert!(wait_for_line(&post, "Welcome to SuperCollider 3.13.0. For help type cmd-d."));
    assert!(wait_for_line(&post, "warning: startup file not found"));
    assert!(wait_for_line(&post, "a posted line"));

    match sclang.interpret("oops") {
        Err(EvalError::Failed(detail)) => {
            assert_eq!(detail, "ERROR: Message 'oops' not understood.\n");
        }
        other => panic!("expected an interpreter error, got {:?}", other),
    }

    match sclang.interpret("hang") {
        Err(EvalError::Timeout(after)) => assert_eq!(after, Duration::from_millis(300)),
        other => panic!("expected a timeout, got {:?}", other),
    }
    // the session keeps working after a request times out
    assert_eq!(sclang.interpret("1 + 2").unwrap(), "3");

    sclang.quit().unwrap();
    assert!(!sclang.is_alive());
}

#[test]
fn test_exit_during_boot_is_a_launch_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sclang");
    fs::write(&path, "#!/bin/sh\necho \"compiling class library...\"\nexit 1\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

    let options = SclangOptions { executable: Some(path), ..SclangOptions::default() };
    let err = SclangProcess::spawn(&options, &PostWindow::new()).err().unwrap();
    assert!(matches!(err, GatewayError::Launch(ref detail) if detail == "sclang exited during boot"));
}
