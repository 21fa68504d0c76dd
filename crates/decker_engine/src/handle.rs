//! Script-facing runtime facade
//!
//! The explicit, typed surface handler code talks to — no dynamic attribute
//! dispatch, no live model references. Data reads and writes take the scene
//! lock for their own duration only; structural mutations travel the
//! command channel and apply at the next tick.

use std::sync::{Arc, Mutex};

use decker_core::{Size, Value, Vec2};
use decker_model::{
    AnimProp, AnimationDescriptor, AnimationKind, ModelId, ModelKind, Scene, SetOutcome,
};

use crate::command::{Command, CommandSender, Reply};
use crate::error::{EngineError, Result};

/// A cloneable handle bound to one runtime's scene and command queue
#[derive(Clone)]
pub struct RuntimeHandle {
    scene: Arc<Mutex<Scene>>,
    commands: CommandSender,
}

impl RuntimeHandle {
    pub(crate) fn new(scene: Arc<Mutex<Scene>>, commands: CommandSender) -> Self {
        Self { scene, commands }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn kind(&self, model: ModelId) -> Option<ModelKind> {
        self.scene.lock().unwrap().model(model).map(|m| m.kind())
    }

    pub fn name(&self, model: ModelId) -> Option<String> {
        self.scene
            .lock()
            .unwrap()
            .model(model)
            .map(|m| m.name().to_string())
    }

    pub fn parent(&self, model: ModelId) -> Option<ModelId> {
        self.scene.lock().unwrap().model(model)?.parent()
    }

    pub fn children(&self, model: ModelId) -> Vec<ModelId> {
        self.scene
            .lock()
            .unwrap()
            .model(model)
            .map(|m| m.children().to_vec())
            .unwrap_or_default()
    }

    /// Child lookup by name is an explicit query, not attribute fallback
    pub fn child_by_name(&self, parent: ModelId, name: &str) -> Option<ModelId> {
        let scene = self.scene.lock().unwrap();
        scene
            .model(parent)?
            .children()
            .iter()
            .copied()
            .find(|c| scene.model(*c).is_some_and(|m| m.name() == name))
    }

    pub fn get_property(&self, model: ModelId, key: &str) -> Option<Value> {
        self.scene.lock().unwrap().get_property(model, key)
    }

    pub fn handler(&self, model: ModelId, name: &str) -> Option<String> {
        self.scene
            .lock()
            .unwrap()
            .model(model)?
            .handler(name)
            .map(str::to_string)
    }

    /// Position in card coordinates (what scripts see as "position")
    pub fn position(&self, model: ModelId) -> Option<Vec2> {
        self.scene.lock().unwrap().abs_position(model)
    }

    pub fn center(&self, model: ModelId) -> Option<Vec2> {
        self.scene.lock().unwrap().abs_center(model)
    }

    pub fn size(&self, model: ModelId) -> Option<Size> {
        self.scene.lock().unwrap().model(model).map(|m| m.size())
    }

    pub fn speed(&self, model: ModelId) -> Option<Vec2> {
        self.scene.lock().unwrap().model(model).map(|m| m.speed())
    }

    pub fn rotation(&self, model: ModelId) -> Option<f64> {
        self.scene.lock().unwrap().model(model)?.rotation()
    }

    /// Effective visibility (hidden ancestors hide the subtree)
    pub fn is_visible(&self, model: ModelId) -> bool {
        self.scene.lock().unwrap().is_visible(model)
    }

    pub fn is_touching(&self, a: ModelId, b: ModelId) -> bool {
        self.scene.lock().unwrap().models_touch(a, b)
    }

    pub fn is_touching_point(&self, model: ModelId, point: Vec2) -> bool {
        self.scene.lock().unwrap().contains_point(model, point)
    }

    // ------------------------------------------------------------------
    // Data writes (short lock scopes, no structural changes)
    // ------------------------------------------------------------------

    pub fn set_property(&self, model: ModelId, key: &str, value: Value) -> SetOutcome {
        self.scene.lock().unwrap().set_property(model, key, value)
    }

    pub fn set_position(&self, model: ModelId, pos: Vec2) -> SetOutcome {
        self.scene.lock().unwrap().set_abs_position(model, pos)
    }

    pub fn set_center(&self, model: ModelId, center: Vec2) -> SetOutcome {
        self.scene.lock().unwrap().set_abs_center(model, center)
    }

    pub fn set_speed(&self, model: ModelId, speed: Vec2) -> SetOutcome {
        self.set_property(model, "speed", Value::Point(speed))
    }

    pub fn set_rotation(&self, model: ModelId, rotation: f64) -> Result<()> {
        if self.kind(model).map(|k| k.can_rotate()) != Some(true) {
            return Err(EngineError::UnsupportedKind);
        }
        self.set_property(model, "rotation", Value::Real(rotation));
        Ok(())
    }

    pub fn show(&self, model: ModelId) {
        self.set_property(model, "visible", Value::Bool(true));
    }

    pub fn hide(&self, model: ModelId) {
        self.set_property(model, "visible", Value::Bool(false));
    }

    pub fn set_handler(&self, model: ModelId, name: &str, body: &str) -> Result<()> {
        let mut scene = self.scene.lock().unwrap();
        let m = scene
            .model_mut(model)
            .ok_or(decker_model::SceneError::UnknownModel)?;
        if m.set_handler(name, body) {
            Ok(())
        } else {
            Err(EngineError::UnsupportedKind)
        }
    }

    /// Replace this model's bounce partners; observation baselines reset
    pub fn set_bounce_partners(&self, model: ModelId, partners: &[ModelId]) {
        let mut scene = self.scene.lock().unwrap();
        if let Some(m) = scene.model_mut(model) {
            m.set_bounce_partners(partners.iter().copied());
        }
    }

    // ------------------------------------------------------------------
    // Animations (queued; start time stamps at the next tick)
    // ------------------------------------------------------------------

    pub fn animate_position(
        &self,
        model: ModelId,
        duration: f64,
        end: Vec2,
        token: Option<u64>,
    ) -> Result<()> {
        self.queue_animation(model, AnimationKind::position(end), duration, token)
    }

    pub fn animate_center(
        &self,
        model: ModelId,
        duration: f64,
        end: Vec2,
        token: Option<u64>,
    ) -> Result<()> {
        self.queue_animation(model, AnimationKind::center(end), duration, token)
    }

    pub fn animate_size(
        &self,
        model: ModelId,
        duration: f64,
        end: Size,
        token: Option<u64>,
    ) -> Result<()> {
        self.queue_animation(model, AnimationKind::size(end), duration, token)
    }

    pub fn animate_rotation(
        &self,
        model: ModelId,
        duration: f64,
        end: f64,
        force_direction: i8,
        token: Option<u64>,
    ) -> Result<()> {
        if self.kind(model).map(|k| k.can_rotate()) != Some(true) {
            return Err(EngineError::UnsupportedKind);
        }
        self.queue_animation(
            model,
            AnimationKind::rotation(end, force_direction),
            duration,
            token,
        )
    }

    fn queue_animation(
        &self,
        model: ModelId,
        kind: AnimationKind,
        duration: f64,
        token: Option<u64>,
    ) -> Result<()> {
        let mut descriptor = AnimationDescriptor::new(kind, duration);
        if let Some(token) = token {
            descriptor = descriptor.with_completion(token);
        }
        self.commands
            .submit(Command::AddAnimation { model, descriptor })
    }

    pub fn stop_animating(&self, model: ModelId, prop: Option<AnimProp>) -> Result<()> {
        self.commands.submit(Command::StopAnimations { model, prop })
    }

    // ------------------------------------------------------------------
    // Structural mutations (command channel)
    // ------------------------------------------------------------------

    /// Create a new object on a card; blocks until the tick that applies it
    pub fn new_child(&self, parent: ModelId, kind: ModelKind) -> Result<ModelId> {
        match self.commands.request(Command::NewChild { parent, kind })? {
            Reply::Model(Some(id)) => Ok(id),
            _ => Err(EngineError::NoResult),
        }
    }

    /// Duplicate a model; blocks for the new id since callers configure the
    /// copy right away
    pub fn clone_model(&self, source: ModelId) -> Result<ModelId> {
        match self.commands.request(Command::Clone { source })? {
            Reply::Model(Some(id)) => Ok(id),
            _ => Err(EngineError::NoResult),
        }
    }

    /// Delete fire-and-forget; the model tears down at the next tick
    pub fn delete(&self, model: ModelId) -> Result<()> {
        self.commands.submit(Command::Delete { model })
    }

    pub fn order_to_front(&self, model: ModelId) -> Result<()> {
        self.commands
            .submit(Command::OrderToIndex { model, index: -1 })
    }

    pub fn order_to_back(&self, model: ModelId) -> Result<()> {
        self.commands
            .submit(Command::OrderToIndex { model, index: 0 })
    }

    pub fn order_forward(&self, model: ModelId) -> Result<()> {
        self.commands.submit(Command::OrderBy { model, delta: 1 })
    }

    pub fn order_backward(&self, model: ModelId) -> Result<()> {
        self.commands.submit(Command::OrderBy { model, delta: -1 })
    }

    pub fn order_to_index(&self, model: ModelId, index: isize) -> Result<()> {
        self.commands.submit(Command::OrderToIndex { model, index })
    }

    pub fn send_message(&self, model: ModelId, text: &str) -> Result<()> {
        self.commands.submit(Command::SendMessage {
            model,
            text: text.to_string(),
        })
    }

    pub fn broadcast_message(&self, text: &str) -> Result<()> {
        self.commands.submit(Command::BroadcastMessage {
            text: text.to_string(),
        })
    }

    pub fn goto_card(&self, index: usize) -> Result<()> {
        self.commands.submit(Command::GotoCard { index })
    }
}
