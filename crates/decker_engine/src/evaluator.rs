//! The handler-evaluator boundary
//!
//! Handler bodies are opaque text; the runtime never interprets them. An
//! embedding plugs in a [`HandlerEvaluator`] and the runtime calls it with
//! the handler's code, its target model, and a typed event payload. Errors
//! cross the boundary as [`ScriptError`] values and are reported, never
//! propagated — one failing handler must not abort the tick.

use decker_core::Vec2;
use decker_model::ModelId;
use thiserror::Error;

use crate::collision::Edge;

/// A script failure inside a handler body
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,
    /// 1-based line within the handler body, when known
    pub line: Option<u32>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
        }
    }
}

/// Typed event data handed to a handler
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    None,
    Mouse {
        pos: Vec2,
    },
    Key {
        key: String,
    },
    KeyHold {
        key: String,
        elapsed: f64,
    },
    Periodic {
        elapsed: f64,
    },
    Bounce {
        other: ModelId,
        other_name: String,
        edge: Edge,
    },
    Message {
        text: String,
    },
    Text {
        text: String,
    },
    DoneLoading {
        url: String,
        did_load: bool,
    },
}

/// Everything an evaluator needs to run one handler
#[derive(Debug, Clone)]
pub struct HandlerInvocation {
    pub model: ModelId,
    pub model_name: String,
    pub handler: String,
    /// The handler body, read under the scene lock so evaluators don't have
    /// to take it
    pub code: String,
    pub payload: EventPayload,
}

/// Capability interface for whatever executes handler text
///
/// The runtime only dispatches handlers with non-empty bodies, tolerates any
/// error by reporting it, and keeps going.
pub trait HandlerEvaluator: Send {
    fn run_handler(&mut self, invocation: &HandlerInvocation) -> Result<(), ScriptError>;

    /// Handlers accepted but not yet finished (for evaluators that queue to
    /// a worker). The scheduler skips a periodic dispatch round while this
    /// is nonzero.
    fn queued_handlers(&self) -> usize {
        0
    }

    /// An animation carrying a completion token finished
    fn animation_finished(&mut self, _model: ModelId, _token: u64) {}
}

/// A no-op evaluator for embeddings that run without scripting
#[derive(Debug, Default)]
pub struct NullEvaluator;

impl HandlerEvaluator for NullEvaluator {
    fn run_handler(&mut self, _invocation: &HandlerInvocation) -> Result<(), ScriptError> {
        Ok(())
    }
}

/// A handler failure with its dispatch context, ready for a status surface
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerErrorReport {
    pub object: String,
    pub handler: String,
    pub line: Option<u32>,
    pub message: String,
}

impl std::fmt::Display for HandlerErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(
                f,
                "error in {}.{}, line {}: {}",
                self.object, self.handler, line, self.message
            ),
            None => write!(
                f,
                "error in {}.{}: {}",
                self.object, self.handler, self.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_report_formatting() {
        let report = HandlerErrorReport {
            object: "ball".into(),
            handler: "on_bounce".into(),
            line: Some(3),
            message: "name 'vel' is not defined".into(),
        };
        assert_eq!(
            report.to_string(),
            "error in ball.on_bounce, line 3: name 'vel' is not defined"
        );
    }
}
