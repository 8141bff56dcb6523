//! The user-visible, append-only output surface.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lines retained before the oldest are dropped.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

struct PostInner {
    lines: Vec<String>,
    capacity: usize,
    echo: Option<Box<dyn Write + Send>>,
}

/// Append-only line log shared between the dispatcher and interpreter threads.
///
/// Clones share the same buffer. Only the most recent lines are retained;
/// every line can also be echoed to a writer (the host uses stdout).
#[derive(Clone)]
pub struct PostWindow {
    inner: Arc<Mutex<PostInner>>,
}

impl Default for PostWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl PostWindow {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Retain at most `capacity` lines (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PostInner {
                lines: Vec::new(),
                capacity: capacity.max(1),
                echo: None,
            })),
        }
    }

    pub fn with_echo(writer: Box<dyn Write + Send>) -> Self {
        let window = Self::new();
        window.lock().echo = Some(writer);
        window
    }

    fn lock(&self) -> MutexGuard<'_, PostInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append text; embedded newlines produce several lines.
    pub fn append_line(&self, text: &str) {
        let mut inner = self.lock();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(echo) = inner.echo.as_mut() {
                let _ = writeln!(echo, "{}", line);
                let _ = echo.flush();
            }
            inner.lines.push(line.to_string());
        }
        if inner.lines.len() > inner.capacity {
            let excess = inner.lines.len() - inner.capacity;
            inner.lines.drain(..excess);
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_line(&self) -> Option<String> {
        self.lock().lines.last().cloned()
    }
}
