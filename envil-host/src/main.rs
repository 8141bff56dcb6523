//! ENVIL host process.
//!
//! Reads one JSON command per stdin line, dispatches it, and keeps the
//! broadcast server serviced between commands. Post window lines go to stdout.

use std::fs::File;
use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};

use envil_core::{Command, Config, Dispatcher};
use envil_types::PostWindow;

const PUMP_INTERVAL: Duration = Duration::from_millis(20);

fn init_logging(verbose: bool) {
    use simplelog::{LevelFilter, WriteLogger};

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("envil")
        .join("envil.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("/tmp/envil.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("envil: cannot create log file: {}", e);
            return;
        }
    };

    if let Err(e) = WriteLogger::init(log_level, simplelog::Config::default(), log_file) {
        eprintln!("envil: failed to initialize logger: {}", e);
        return;
    }

    log::info!("envil starting (log level: {:?})", log_level);
}

/// Forward stdin lines until EOF; the channel closes when the thread exits.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::error!(target: "host", "stdin read failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn handle_line(dispatcher: &mut Dispatcher, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<Command>(line) {
        Ok(command) => {
            let outcome = dispatcher.dispatch(&command);
            log::debug!(target: "host", "{:?}", outcome);
        }
        Err(e) => log::error!(target: "host", "skipping malformed command {:?}: {}", line, e),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let config = match args.iter().position(|a| a == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(path) => Config::load_from(std::path::Path::new(path)).unwrap_or_else(|e| {
                log::warn!(target: "config", "ignoring {}: {}", path, e);
                Config::load()
            }),
            None => Config::load(),
        },
        None => Config::load(),
    };

    let post = PostWindow::with_echo(Box::new(io::stdout()));
    let mut dispatcher = Dispatcher::from_config(&config, post);
    let commands = spawn_stdin_reader();

    loop {
        match commands.recv_timeout(PUMP_INTERVAL) {
            Ok(line) => handle_line(&mut dispatcher, &line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        dispatcher.pump();
    }

    dispatcher.stop_environment();
    log::info!("envil exiting");
}
