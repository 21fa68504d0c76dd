//! The Decker runtime
//!
//! Owns the scene (single writer), the handler evaluator, and the command
//! channel. [`Runtime::tick`] is the heart: drain commands, advance
//! animations (two passes), run one full collision detection pass, resolve
//! every bounce, then dispatch handlers — always with the scene lock
//! released, since handlers re-enter through [`crate::RuntimeHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use decker_animation::AnimationEvent;
use decker_core::{Value, Vec2};
use decker_model::{
    handlers, AnimationDescriptor, ModelId, ModelKind, PropertyChange, Scene,
};
use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use crate::collision::{self, BounceEvent};
use crate::command::{command_channel, Command, CommandSender, Envelope, Reply};
use crate::error::{EngineError, Result};
use crate::evaluator::{
    EventPayload, HandlerErrorReport, HandlerEvaluator, HandlerInvocation, ScriptError,
};
use crate::handle::RuntimeHandle;

/// The runtime core driven by the periodic scheduler
pub struct Runtime {
    scene: Arc<Mutex<Scene>>,
    evaluator: Box<dyn HandlerEvaluator>,
    commands_rx: Receiver<Envelope>,
    commands_tx: Sender<Envelope>,
    scheduler_thread: Arc<Mutex<Option<ThreadId>>>,
    needs_redraw: Arc<AtomicBool>,
    /// Deterministic engine clock in seconds, advanced by each tick's dt
    clock: f64,
    tick_count: u64,
    last_periodic: f64,
    current_card: ModelId,
    pressed_keys: FxHashMap<String, f64>,
    mouse_moved: FxHashMap<ModelId, Vec2>,
    /// Torn-down subtrees waiting one tick before leaving the arena, so the
    /// collision pass prunes references first
    graveyard: Vec<(u64, ModelId)>,
    changes: Vec<PropertyChange>,
    errors: Vec<HandlerErrorReport>,
}

impl Runtime {
    pub fn new(evaluator: Box<dyn HandlerEvaluator>) -> Self {
        Self::with_scene(Scene::new(), evaluator)
    }

    pub fn with_scene(scene: Scene, evaluator: Box<dyn HandlerEvaluator>) -> Self {
        let current_card = scene.cards()[0];
        let (commands_tx, commands_rx) = command_channel();
        Self {
            scene: Arc::new(Mutex::new(scene)),
            evaluator,
            commands_rx,
            commands_tx,
            scheduler_thread: Arc::new(Mutex::new(None)),
            needs_redraw: Arc::new(AtomicBool::new(false)),
            clock: 0.0,
            tick_count: 0,
            last_periodic: 0.0,
            current_card,
            pressed_keys: FxHashMap::default(),
            mouse_moved: FxHashMap::default(),
            graveyard: Vec::new(),
            changes: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Shared scene handle; lock scopes must stay short and never span an
    /// evaluator call
    pub fn scene(&self) -> Arc<Mutex<Scene>> {
        Arc::clone(&self.scene)
    }

    /// Script-facing facade bound to this runtime
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle::new(
            Arc::clone(&self.scene),
            CommandSender::new(self.commands_tx.clone(), Arc::clone(&self.scheduler_thread)),
        )
    }

    pub fn current_card(&self) -> ModelId {
        self.current_card
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub(crate) fn needs_redraw_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.needs_redraw)
    }

    /// Check and clear the coalesced redraw flag
    pub fn take_needs_redraw(&self) -> bool {
        self.needs_redraw.swap(false, Ordering::Acquire)
    }

    /// Drain property-change notifications accumulated since the last call
    pub fn take_changes(&mut self) -> Vec<PropertyChange> {
        std::mem::take(&mut self.changes)
    }

    /// Drain handler error reports for the status surface
    pub fn take_errors(&mut self) -> Vec<HandlerErrorReport> {
        std::mem::take(&mut self.errors)
    }

    /// Run `on_setup` for the whole stack (cards included, depth-first) and
    /// show the first card. Call once before ticking.
    pub fn start(&mut self) {
        let targets = {
            let scene = self.scene.lock().unwrap();
            let mut t = vec![scene.root()];
            t.extend(scene.descendants(scene.root()));
            t
        };
        for id in targets {
            self.dispatch_handler(id, handlers::ON_SETUP, EventPayload::None);
        }
        self.dispatch_handler(self.current_card, handlers::ON_SHOW_CARD, EventPayload::None);
    }

    /// Dispatch `on_exit_stack` before the host tears the runtime down
    pub fn exit_stack(&mut self) {
        let root = self.scene.lock().unwrap().root();
        self.dispatch_handler(root, handlers::ON_EXIT_STACK, EventPayload::None);
    }

    // ------------------------------------------------------------------
    // The tick
    // ------------------------------------------------------------------

    /// One fixed-rate update step. `dt` is the elapsed time in seconds since
    /// the previous tick.
    pub fn tick(&mut self, dt: f64) {
        *self.scheduler_thread.lock().unwrap() = Some(thread::current().id());
        self.clock += dt;
        self.tick_count += 1;
        let mut did_run = false;

        // Commands from the script context apply at this synchronization
        // point, before any engine pass observes the scene
        self.process_commands();

        // Animation update pass + finish pass, then one full collision
        // detection pass before any resolution
        let (anim_out, bounce_dispatches) = {
            let mut scene = self.scene.lock().unwrap();
            let anim_out =
                decker_animation::tick(&mut scene, self.current_card, self.clock, dt);
            let collisions = collision::detect(&mut scene, self.current_card);
            let mut bounce_events: Vec<BounceEvent> = Vec::new();
            for c in &collisions {
                bounce_events.extend(collision::perform_bounce(&mut scene, c, dt));
            }
            did_run |= anim_out.did_run || !collisions.is_empty();
            let dispatches: Vec<(ModelId, EventPayload)> = bounce_events
                .into_iter()
                .map(|event| {
                    let other_name = scene
                        .model(event.other)
                        .map(|m| m.name().to_string())
                        .unwrap_or_default();
                    (
                        event.target,
                        EventPayload::Bounce {
                            other: event.other,
                            other_name,
                            edge: event.edge,
                        },
                    )
                })
                .collect();
            (anim_out, dispatches)
        };

        // Handler dispatch happens with the lock released; motion applied
        // above is visible to these handlers, and anything they mutate is
        // visible to the next tick's detection
        for event in &anim_out.events {
            if let AnimationEvent::Finished {
                model,
                token: Some(token),
                ..
            } = event
            {
                self.evaluator.animation_finished(*model, *token);
            }
        }
        for (target, payload) in bounce_dispatches {
            self.dispatch_handler(target, handlers::ON_BOUNCE, payload);
        }

        // Periodic and key-hold handlers run at half rate, and skip a round
        // entirely while earlier handler work is still queued
        if self.tick_count % 2 == 0 && self.evaluator.queued_handlers() == 0 {
            did_run |= self.run_periodic_pass();
        }

        // Purge graveyard entries that have had their post-teardown tick
        let due: Vec<ModelId> = {
            let tick_count = self.tick_count;
            let (due, keep): (Vec<_>, Vec<_>) = self
                .graveyard
                .drain(..)
                .partition(|(after, _)| *after <= tick_count);
            self.graveyard = keep;
            due.into_iter().map(|(_, id)| id).collect()
        };
        if !due.is_empty() {
            let mut scene = self.scene.lock().unwrap();
            for id in due {
                scene.purge(id);
            }
        }

        // One coalesced redraw request per tick, at the end, when anything
        // observable happened
        {
            let mut scene = self.scene.lock().unwrap();
            let changed = scene.take_changes();
            did_run |= !changed.is_empty();
            self.changes.extend(changed);
        }
        if did_run {
            self.needs_redraw.store(true, Ordering::Release);
        }
    }

    fn run_periodic_pass(&mut self) -> bool {
        let elapsed = self.clock - self.last_periodic;
        self.last_periodic = self.clock;
        let mut did_run = false;

        // Key-hold events go to the current card, the kind that declares
        // the key handlers
        let clock = self.clock;
        let held: Vec<(String, f64)> = self
            .pressed_keys
            .iter_mut()
            .map(|(key, since)| {
                let held_for = clock - *since;
                *since = clock;
                (key.clone(), held_for)
            })
            .collect();
        for (key, held_for) in held {
            self.dispatch_handler(
                self.current_card,
                handlers::ON_KEY_HOLD,
                EventPayload::KeyHold {
                    key,
                    elapsed: held_for,
                },
            );
            did_run = true;
        }

        let targets = {
            let scene = self.scene.lock().unwrap();
            let mut t = vec![self.current_card];
            t.extend(scene.descendants(self.current_card));
            t
        };
        for id in targets {
            if let Some(pos) = self.mouse_moved.remove(&id) {
                self.dispatch_handler(id, handlers::ON_MOUSE_MOVE, EventPayload::Mouse { pos });
                did_run = true;
            }
            did_run |= self.dispatch_handler(
                id,
                handlers::ON_PERIODIC,
                EventPayload::Periodic { elapsed },
            );
        }
        did_run
    }

    // ------------------------------------------------------------------
    // Command processing
    // ------------------------------------------------------------------

    fn process_commands(&mut self) {
        while let Ok(envelope) = self.commands_rx.try_recv() {
            let reply = self.apply_command(envelope.cmd);
            if let Some(tx) = envelope.reply {
                let _ = tx.send(reply);
            }
        }
    }

    fn apply_command(&mut self, cmd: Command) -> Reply {
        match cmd {
            Command::NewChild { parent, kind } => {
                let created = self.scene.lock().unwrap().new_child(parent, kind);
                match created {
                    Ok(id) => {
                        self.run_setup_tree(id);
                        Reply::Model(Some(id))
                    }
                    Err(err) => {
                        warn!(%err, "new_child command failed");
                        Reply::Model(None)
                    }
                }
            }
            Command::Clone { source } => Reply::Model(self.clone_model(source).ok()),
            Command::Delete { model } => {
                if let Err(err) = self.delete_model(model) {
                    debug!(%err, "delete command ignored");
                }
                Reply::Done
            }
            Command::OrderToIndex { model, index } => {
                if let Err(err) = self.scene.lock().unwrap().move_child_to_index(model, index) {
                    debug!(%err, "order command ignored");
                }
                Reply::Done
            }
            Command::OrderBy { model, delta } => {
                if let Err(err) = self.scene.lock().unwrap().move_child_by(model, delta) {
                    debug!(%err, "order command ignored");
                }
                Reply::Done
            }
            Command::SetProperty { model, key, value } => {
                self.scene.lock().unwrap().set_property(model, &key, value);
                Reply::Done
            }
            Command::AddAnimation { model, descriptor } => {
                self.add_animation(model, descriptor);
                Reply::Done
            }
            Command::StopAnimations { model, prop } => {
                let mut scene = self.scene.lock().unwrap();
                decker_animation::stop_animations(&mut scene, model, prop);
                Reply::Done
            }
            Command::SetBouncePartners { model, partners } => {
                if let Some(m) = self.scene.lock().unwrap().model_mut(model) {
                    m.set_bounce_partners(partners);
                }
                Reply::Done
            }
            Command::SendMessage { model, text } => {
                self.send_message(model, &text);
                Reply::Done
            }
            Command::BroadcastMessage { text } => {
                self.broadcast_message(&text);
                Reply::Done
            }
            Command::GotoCard { index } => {
                self.goto_card(index);
                Reply::Done
            }
        }
    }

    // ------------------------------------------------------------------
    // Structural operations (scheduler context)
    // ------------------------------------------------------------------

    /// Queue an animation, stamping its start against the engine clock
    pub fn add_animation(&mut self, model: ModelId, descriptor: AnimationDescriptor) {
        let mut scene = self.scene.lock().unwrap();
        decker_animation::add_animation(&mut scene, model, descriptor, self.clock);
    }

    /// Duplicate a model into its card (or a card into the stack), then run
    /// `on_setup` for the copy
    pub fn clone_model(&mut self, source: ModelId) -> Result<ModelId> {
        let copy = {
            let mut scene = self.scene.lock().unwrap();
            let src = scene.model(source).ok_or(decker_model::SceneError::UnknownModel)?;
            let kind = src.kind();
            let speed = src.speed();
            let visible = src.visible_flag();
            match kind {
                ModelKind::Stack => return Err(EngineError::UnsupportedKind),
                ModelKind::Card => {
                    let copy = scene.create_copy(source)?;
                    let cards = scene.cards();
                    let index = cards.iter().position(|c| *c == source).unwrap_or(cards.len());
                    let root = scene.root();
                    scene.attach_child(root, copy, Some(index + 1))?;
                    copy
                }
                _ => {
                    let copy = scene.create_copy(source)?;
                    // Motion state doesn't round-trip through data, so a
                    // clone inherits it explicitly
                    scene.set_property_quiet(copy, "speed", Value::Point(speed));
                    scene.set_property_quiet(copy, "visible", Value::Bool(visible));
                    let card = scene.card_of(source).unwrap_or(scene.root());
                    scene.attach_child(card, copy, None)?;
                    copy
                }
            }
        };
        self.run_setup_tree(copy);
        if self.scene.lock().unwrap().model(copy).map(|m| m.kind()) == Some(ModelKind::Card) {
            self.show_card(copy);
        }
        Ok(copy)
    }

    /// Detach and tear down a model; the arena slot is reclaimed one tick
    /// later, after the collision pass has pruned references to it
    pub fn delete_model(&mut self, model: ModelId) -> Result<()> {
        let mut scene = self.scene.lock().unwrap();
        let m = scene.model(model).ok_or(decker_model::SceneError::UnknownModel)?;
        match m.kind() {
            ModelKind::Stack => return Err(EngineError::UnsupportedKind),
            ModelKind::Card => {
                if scene.cards().len() <= 1 {
                    return Err(EngineError::UnsupportedKind);
                }
            }
            _ => {
                // Grouped children leave via ungroup, not deletion
                let parent_kind = m
                    .parent()
                    .and_then(|p| scene.model(p))
                    .map(|p| p.kind());
                if parent_kind == Some(ModelKind::Group) {
                    return Err(EngineError::UnsupportedKind);
                }
            }
        }
        let was_current_card = model == self.current_card;
        let cards_before = scene.cards();
        let removed_index = cards_before.iter().position(|c| *c == model);

        scene.detach_child(model)?;
        scene.set_down(model);
        self.graveyard.push((self.tick_count + 1, model));

        if was_current_card {
            let cards = scene.cards();
            let index = removed_index.unwrap_or(0).min(cards.len() - 1);
            let next = cards[index];
            drop(scene);
            self.show_card(next);
        }
        Ok(())
    }

    /// Navigate to a card by index, dispatching hide/show handlers
    pub fn goto_card(&mut self, index: usize) {
        let target = {
            let scene = self.scene.lock().unwrap();
            scene.cards().get(index).copied()
        };
        let Some(target) = target else {
            return;
        };
        if target == self.current_card {
            return;
        }
        self.dispatch_handler(self.current_card, handlers::ON_HIDE_CARD, EventPayload::None);
        self.show_card(target);
    }

    fn show_card(&mut self, card: ModelId) {
        self.current_card = card;
        self.mouse_moved.clear();
        self.dispatch_handler(card, handlers::ON_SHOW_CARD, EventPayload::None);
        self.needs_redraw.store(true, Ordering::Release);
    }

    fn run_setup_tree(&mut self, root: ModelId) {
        let targets = {
            let scene = self.scene.lock().unwrap();
            let mut t = vec![root];
            t.extend(scene.descendants(root));
            t
        };
        for id in targets {
            self.dispatch_handler(id, handlers::ON_SETUP, EventPayload::None);
        }
    }

    // ------------------------------------------------------------------
    // Input entry points (host/window layer)
    // ------------------------------------------------------------------

    pub fn mouse_down(&mut self, model: ModelId, pos: Vec2) {
        self.dispatch_handler(model, handlers::ON_MOUSE_DOWN, EventPayload::Mouse { pos });
    }

    pub fn mouse_up(&mut self, model: ModelId, pos: Vec2) {
        self.dispatch_handler(model, handlers::ON_MOUSE_UP, EventPayload::Mouse { pos });
    }

    pub fn mouse_enter(&mut self, model: ModelId, pos: Vec2) {
        self.dispatch_handler(model, handlers::ON_MOUSE_ENTER, EventPayload::Mouse { pos });
    }

    pub fn mouse_exit(&mut self, model: ModelId, pos: Vec2) {
        self.mouse_moved.remove(&model);
        self.dispatch_handler(model, handlers::ON_MOUSE_EXIT, EventPayload::Mouse { pos });
    }

    /// Record a mouse move; the handler dispatches coalesced on the next
    /// periodic pass
    pub fn note_mouse_move(&mut self, model: ModelId, pos: Vec2) {
        self.mouse_moved.insert(model, pos);
    }

    pub fn click(&mut self, model: ModelId) {
        self.dispatch_handler(model, handlers::ON_CLICK, EventPayload::None);
    }

    pub fn text_changed(&mut self, model: ModelId, text: &str) {
        self.dispatch_handler(
            model,
            handlers::ON_TEXT_CHANGED,
            EventPayload::Text { text: text.into() },
        );
    }

    pub fn text_enter(&mut self, model: ModelId, text: &str) {
        self.dispatch_handler(
            model,
            handlers::ON_TEXT_ENTER,
            EventPayload::Text { text: text.into() },
        );
    }

    pub fn done_loading(&mut self, model: ModelId, url: &str, did_load: bool) {
        self.dispatch_handler(
            model,
            handlers::ON_DONE_LOADING,
            EventPayload::DoneLoading {
                url: url.into(),
                did_load,
            },
        );
    }

    /// The host resized the window showing the current card
    pub fn card_resized(&mut self) {
        let card = self.current_card;
        self.dispatch_handler(card, handlers::ON_RESIZE, EventPayload::None);
    }

    pub fn key_down(&mut self, key: &str) {
        self.pressed_keys.insert(key.to_string(), self.clock);
        self.dispatch_handler(
            self.current_card,
            handlers::ON_KEY_DOWN,
            EventPayload::Key { key: key.into() },
        );
    }

    pub fn key_up(&mut self, key: &str) {
        self.pressed_keys.remove(key);
        self.dispatch_handler(
            self.current_card,
            handlers::ON_KEY_UP,
            EventPayload::Key { key: key.into() },
        );
    }

    /// Drop all held keys (focus loss)
    pub fn clear_pressed_keys(&mut self) {
        self.pressed_keys.clear();
    }

    // ------------------------------------------------------------------
    // Messaging and dispatch
    // ------------------------------------------------------------------

    pub fn send_message(&mut self, model: ModelId, text: &str) {
        self.dispatch_handler(
            model,
            handlers::ON_MESSAGE,
            EventPayload::Message { text: text.into() },
        );
    }

    /// `on_message` for the current card and everything on it
    pub fn broadcast_message(&mut self, text: &str) {
        let targets = {
            let scene = self.scene.lock().unwrap();
            let mut t = vec![self.current_card];
            t.extend(scene.descendants(self.current_card));
            t
        };
        for id in targets {
            self.send_message(id, text);
        }
    }

    /// Run one handler if the model is live and the handler non-empty.
    /// Script errors are reported to the status surface and swallowed; a
    /// failing handler never aborts the tick. Returns whether a handler ran.
    fn dispatch_handler(&mut self, model: ModelId, handler: &str, payload: EventPayload) -> bool {
        let invocation = {
            let scene = self.scene.lock().unwrap();
            let Some(m) = scene.model(model) else {
                return false;
            };
            if m.is_torn_down() || !m.has_handler(handler) {
                return false;
            }
            HandlerInvocation {
                model,
                model_name: m.name().to_string(),
                handler: handler.to_string(),
                code: m.handler(handler).unwrap_or_default().to_string(),
                payload,
            }
        };
        if let Err(ScriptError { message, line }) = self.evaluator.run_handler(&invocation) {
            let report = HandlerErrorReport {
                object: invocation.model_name.clone(),
                handler: invocation.handler.clone(),
                line,
                message,
            };
            error!(%report, "handler failed");
            self.errors.push(report);
        }
        true
    }
}
