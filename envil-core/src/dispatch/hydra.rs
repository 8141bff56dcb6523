use log::debug;

use envil_types::{DispatchError, LanguageMode, Selection, SourceBuffer};

use super::{Dispatcher, Outcome};

impl Dispatcher {
    /// Segment the selection (or whole buffer) and publish each statement in order.
    pub fn evaluate_statements(&mut self, text: &str, selection: Option<&Selection>) -> Outcome {
        self.run(LanguageMode::Hydra, |d| {
            let buffer = SourceBuffer::from_text(text);
            let statements = d.segmenter.segment_selection(&buffer, selection);
            for statement in &statements {
                let reached = d.sink.publish(statement);
                debug!(target: "dispatch", "published to {} clients: {}", reached, statement);
            }
            Ok::<_, DispatchError>(Outcome::Published(statements.len()))
        })
    }
}
