use log::debug;

use envil_lang::{GatewayError, InterpreterGateway, Lifecycle, SessionStatus};
use envil_types::{CursorPosition, DispatchError, LanguageMode, Selection, SourceBuffer};

use crate::region::{extract_region, region_text};

use super::{describe, Dispatcher, Outcome};

impl Dispatcher {
    /// A non-empty selection is evaluated as is; otherwise the region at its cursor.
    pub fn evaluate(&mut self, text: &str, selection: Option<&Selection>) -> Outcome {
        match selection {
            Some(sel) if !sel.is_empty() => self.run(LanguageMode::SuperCollider, |d| {
                let code = SourceBuffer::from_text(text).selected_text(sel);
                d.evaluate_code(&code)
            }),
            Some(sel) => self.evaluate_region(text, sel.active),
            // no cursor, no region
            None => {
                self.run(LanguageMode::SuperCollider, |_| Err(DispatchError::MalformedRegion))
            }
        }
    }

    /// Evaluate the top-level bracket region enclosing the cursor line.
    pub fn evaluate_region(&mut self, text: &str, cursor: CursorPosition) -> Outcome {
        self.run(LanguageMode::SuperCollider, |d| {
            d.require_session()?;
            let code = d.region_code(text, cursor)?;
            d.evaluate_code(&code)
        })
    }

    /// Same code selection as `evaluate`; the reply is left to the post window.
    pub fn evaluate_detached(&mut self, text: &str, selection: Option<&Selection>) -> Outcome {
        self.run(LanguageMode::SuperCollider, |d| {
            d.require_session()?;
            let code = match selection {
                Some(sel) if !sel.is_empty() => SourceBuffer::from_text(text).selected_text(sel),
                Some(sel) => d.region_code(text, sel.active)?,
                None => return Err(DispatchError::MalformedRegion),
            };
            d.gateway.evaluate_detached(&code)?;
            Ok(Outcome::Sent)
        })
    }

    // no session means no extraction work and no interpreter call
    fn require_session(&mut self) -> Result<(), DispatchError> {
        match self.gateway.status() {
            SessionStatus::Stopped => Err(DispatchError::NoActiveSession),
            SessionStatus::Running => Ok(()),
        }
    }

    fn region_code(&self, text: &str, cursor: CursorPosition) -> Result<String, DispatchError> {
        let buffer = SourceBuffer::from_text(text);
        let region = extract_region(&buffer, cursor, self.oracle.as_ref())?
            .ok_or(DispatchError::MalformedRegion)?;
        debug!(
            target: "dispatch",
            "region lines {}..={}", region.start_line, region.end_line
        );
        Ok(region_text(&buffer, &region))
    }

    fn evaluate_code(&mut self, code: &str) -> Result<Outcome, DispatchError> {
        let result = self.gateway.evaluate(code)?;
        if !result.is_empty() {
            self.post.append_line(&result);
        }
        Ok(Outcome::Evaluated(result))
    }

    /// Run a gateway lifecycle call. The gateway posts its own failures.
    pub(super) fn lifecycle<F>(&mut self, program: &str, call: F) -> Outcome
    where
        F: FnOnce(&mut InterpreterGateway) -> Result<Lifecycle, GatewayError>,
    {
        if let Err(e) = self.ensure_ready() {
            return self.reject(e);
        }
        match call(&mut self.gateway) {
            Ok(lifecycle) => Outcome::Lifecycle(describe(program, lifecycle)),
            Err(e) => Outcome::Rejected(e.into()),
        }
    }

    pub fn hush(&mut self) -> Outcome {
        if let Err(e) = self.ensure_ready() {
            return self.reject(e);
        }
        match self.gateway.hush() {
            Ok(result) => Outcome::Evaluated(result),
            // already posted by the gateway
            Err(GatewayError::NoActiveSession) => {
                Outcome::Rejected(DispatchError::NoActiveSession)
            }
            Err(e) => self.reject(e.into()),
        }
    }

    pub fn interpreter_status(&mut self) -> Outcome {
        if let Err(e) = self.ensure_ready() {
            return self.reject(e);
        }
        let sclang = match self.gateway.status() {
            SessionStatus::Running => "running",
            SessionStatus::Stopped => "stopped",
        };
        let scsynth = if self.gateway.server_running() { "running" } else { "stopped" };
        let line = format!("sclang {}, scsynth {}", sclang, scsynth);
        self.post.append_line(&line);
        Outcome::Lifecycle(line)
    }
}
