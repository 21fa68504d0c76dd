//! The cross-context command boundary
//!
//! The scene graph has a single writer: the scheduler context. Script code
//! running elsewhere submits structural mutations through this channel; the
//! runtime drains it at the start of every tick, its defined synchronization
//! point. Submissions are fire-and-forget; requests block the calling thread
//! until the tick that applies them replies.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use decker_core::Value;
use decker_model::{AnimProp, AnimationDescriptor, ModelId, ModelKind};

use crate::error::EngineError;

/// A structural mutation request
#[derive(Debug)]
pub enum Command {
    /// Create a default model of `kind` under `parent`
    NewChild { parent: ModelId, kind: ModelKind },
    /// Duplicate a model (or a whole card) and attach the copy
    Clone { source: ModelId },
    /// Detach, tear down, and schedule a purge
    Delete { model: ModelId },
    /// Z-order move to an index (negative counts from the back)
    OrderToIndex { model: ModelId, index: isize },
    /// Z-order move by a delta
    OrderBy { model: ModelId, delta: isize },
    /// Validated property write
    SetProperty {
        model: ModelId,
        key: String,
        value: Value,
    },
    /// Queue an animation (start time stamps when processed)
    AddAnimation {
        model: ModelId,
        descriptor: AnimationDescriptor,
    },
    /// Cancel animations on one property, or all of them
    StopAnimations {
        model: ModelId,
        prop: Option<AnimProp>,
    },
    /// Replace a model's bounce partners
    SetBouncePartners {
        model: ModelId,
        partners: Vec<ModelId>,
    },
    /// Dispatch `on_message` to one model
    SendMessage { model: ModelId, text: String },
    /// Dispatch `on_message` to every model on the current card
    BroadcastMessage { text: String },
    /// Navigate to a card by index
    GotoCard { index: usize },
}

/// Reply for blocking requests
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Done,
    Model(Option<ModelId>),
}

pub(crate) struct Envelope {
    pub cmd: Command,
    pub reply: Option<Sender<Reply>>,
}

/// Script-context sender half of the command channel
///
/// Clone freely; every handle feeds the same runtime.
#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<Envelope>,
    /// Thread currently driving ticks; blocking from it would deadlock
    scheduler_thread: Arc<Mutex<Option<ThreadId>>>,
}

impl CommandSender {
    pub(crate) fn new(
        tx: Sender<Envelope>,
        scheduler_thread: Arc<Mutex<Option<ThreadId>>>,
    ) -> Self {
        Self {
            tx,
            scheduler_thread,
        }
    }

    /// Fire-and-forget submission; the mutation applies at the next tick
    pub fn submit(&self, cmd: Command) -> Result<(), EngineError> {
        self.tx
            .send(Envelope { cmd, reply: None })
            .map_err(|_| EngineError::ChannelClosed)
    }

    /// Blocking submission: waits until the runtime processes the command
    /// and returns its reply. Refused on the scheduler context itself — an
    /// in-context caller holds the runtime already and can mutate directly.
    pub fn request(&self, cmd: Command) -> Result<Reply, EngineError> {
        let on_scheduler = self
            .scheduler_thread
            .lock()
            .unwrap()
            .map(|id| id == thread::current().id())
            .unwrap_or(false);
        if on_scheduler {
            return Err(EngineError::WouldDeadlock);
        }
        let (reply_tx, reply_rx) = channel();
        self.tx
            .send(Envelope {
                cmd,
                reply: Some(reply_tx),
            })
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.recv().map_err(|_| EngineError::ChannelClosed)
    }
}

pub(crate) fn command_channel() -> (Sender<Envelope>, Receiver<Envelope>) {
    channel()
}
