//! The scene arena
//!
//! All models live in one slotmap arena owned by [`Scene`]; tree structure
//! is expressed with ids, so teardown and detach can never leave a dangling
//! parent pointer behind. The scene is single-writer: the scheduler context
//! owns it, and every other context reaches it through short lock scopes or
//! the engine's command channel.

use decker_core::{convex_contains, convex_overlap, Affine, Rect, Value, Vec2};
use rustc_hash::FxHashSet;
use slotmap::{new_key_type, SlotMap};
use tracing::warn;

use crate::error::SceneError;
use crate::model::{Model, ModelKind, SetOutcome};

new_key_type! {
    /// Handle to a model in the scene arena
    pub struct ModelId;
}

/// Identifiers reserved for script globals; object names may not shadow them
pub const RESERVED_NAMES: &[&str] = &[
    "self", "card", "stack", "mouse_pos", "key_name", "message", "elapsed_time", "other_object",
    "edge", "url", "did_load", "wait", "run_after_delay", "time", "paste", "alert", "ask_text",
    "goto_card", "goto_next_card", "goto_previous_card", "broadcast_message", "stop_stack",
    "is_key_pressed", "is_mouse_pressed", "color_rgb",
];

/// A property change waiting to be delivered to observers
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub model: ModelId,
    pub key: String,
}

/// The mutable scene graph: one stack, its cards, and their objects
#[derive(Debug)]
pub struct Scene {
    models: SlotMap<ModelId, Model>,
    root: ModelId,
    changes: Vec<PropertyChange>,
}

impl Scene {
    /// A stack with a single empty card
    pub fn new() -> Self {
        let mut models: SlotMap<ModelId, Model> = SlotMap::with_key();
        let mut stack = Model::new(ModelKind::Stack);
        stack.set_property("name", Value::from("stack"));
        let root = models.insert(stack);

        let mut scene = Self {
            models,
            root,
            changes: Vec::new(),
        };
        scene
            .new_child(root, ModelKind::Card)
            .expect("fresh stack accepts a card");
        scene.clear_dirty(root);
        scene.changes.clear();
        scene
    }

    pub fn root(&self) -> ModelId {
        self.root
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(id)
    }

    pub fn model_mut(&mut self, id: ModelId) -> Option<&mut Model> {
        self.models.get_mut(id)
    }

    /// True when the id refers to a model that has not been torn down
    pub fn is_live(&self, id: ModelId) -> bool {
        self.models.get(id).is_some_and(|m| !m.is_torn_down())
    }

    pub fn cards(&self) -> Vec<ModelId> {
        self.models
            .get(self.root)
            .map(|stack| stack.children().to_vec())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Tree construction and structure
    // ------------------------------------------------------------------

    /// Insert a detached model into the arena (no parent, not yet named
    /// against any scope)
    pub fn insert(&mut self, model: Model) -> ModelId {
        self.models.insert(model)
    }

    /// Create a new default model of `kind`, name it against its scope, and
    /// attach it under `parent`
    pub fn new_child(&mut self, parent: ModelId, kind: ModelKind) -> Result<ModelId, SceneError> {
        let id = self.insert(Model::new(kind));
        self.attach_child(parent, id, None)?;
        Ok(id)
    }

    /// Attach a detached model (and its subtree) under `parent` at `index`
    /// (append when `None`). Names in the attached subtree are de-duplicated
    /// against the destination scope before any link is made.
    pub fn attach_child(
        &mut self,
        parent: ModelId,
        child: ModelId,
        index: Option<usize>,
    ) -> Result<(), SceneError> {
        let parent_model = self.models.get(parent).ok_or(SceneError::UnknownModel)?;
        if parent_model.is_torn_down() {
            return Err(SceneError::TornDown);
        }
        let child_model = self.models.get(child).ok_or(SceneError::UnknownModel)?;
        if child_model.parent().is_some() {
            return Err(SceneError::AlreadyAttached);
        }
        if child == parent || self.is_ancestor_of(child, parent) {
            return Err(SceneError::WouldCycle);
        }
        let child_kind = child_model.kind();
        match (self.models[parent].kind(), child_kind) {
            (ModelKind::Stack, ModelKind::Card) => {}
            (ModelKind::Stack, _) | (_, ModelKind::Card) | (_, ModelKind::Stack) => {
                return Err(SceneError::KindMismatch);
            }
            _ => {}
        }

        // Sibling cards name-check against each other; everything else
        // against the whole destination card scope
        let scope = if child_kind == ModelKind::Card {
            self.root
        } else {
            self.card_of(parent).unwrap_or(self.root)
        };
        self.dedupe_subtree_names(scope, child);

        let parent_model = &mut self.models[parent];
        let index = index
            .unwrap_or(parent_model.children.len())
            .min(parent_model.children.len());
        parent_model.children.insert(index, child);
        parent_model.is_dirty = true;
        self.models[child].parent = Some(parent);
        Ok(())
    }

    /// Detach `child` from its parent, returning the index it occupied so
    /// the mutation can be inverted. The subtree stays in the arena.
    pub fn detach_child(&mut self, child: ModelId) -> Result<usize, SceneError> {
        let parent = self
            .models
            .get(child)
            .ok_or(SceneError::UnknownModel)?
            .parent()
            .ok_or(SceneError::NotAttached)?;
        let parent_model = &mut self.models[parent];
        let index = parent_model
            .children
            .iter()
            .position(|c| *c == child)
            .ok_or(SceneError::NotAttached)?;
        parent_model.children.remove(index);
        parent_model.is_dirty = true;
        self.models[child].parent = None;
        Ok(index)
    }

    /// Move a model to `index` within its parent's child list (z-order).
    /// Negative indexes count from the back, as scripts expect.
    pub fn move_child_to_index(&mut self, child: ModelId, index: isize) -> Result<(), SceneError> {
        let parent = self
            .models
            .get(child)
            .ok_or(SceneError::UnknownModel)?
            .parent()
            .ok_or(SceneError::NotAttached)?;
        let len = self.models[parent].children.len() as isize;
        let index = index.rem_euclid(len);
        let parent_model = &mut self.models[parent];
        let current = parent_model
            .children
            .iter()
            .position(|c| *c == child)
            .ok_or(SceneError::NotAttached)?;
        parent_model.children.remove(current);
        parent_model.children.insert(index as usize, child);
        parent_model.is_dirty = true;
        Ok(())
    }

    pub fn move_child_by(&mut self, child: ModelId, delta: isize) -> Result<(), SceneError> {
        let parent = self
            .models
            .get(child)
            .ok_or(SceneError::UnknownModel)?
            .parent()
            .ok_or(SceneError::NotAttached)?;
        let current = self.models[parent]
            .children
            .iter()
            .position(|c| *c == child)
            .ok_or(SceneError::NotAttached)? as isize;
        self.move_child_to_index(child, current + delta)
    }

    /// Wrap sibling models in a new group. The group's frame becomes the
    /// union of the members' frames and members are re-anchored inside it,
    /// preserving z-order. All members must share one parent.
    pub fn group_models(&mut self, ids: &[ModelId]) -> Result<ModelId, SceneError> {
        let (first, rest) = ids.split_first().ok_or(SceneError::UnknownModel)?;
        let parent = self
            .models
            .get(*first)
            .ok_or(SceneError::UnknownModel)?
            .parent()
            .ok_or(SceneError::NotAttached)?;
        for id in rest {
            let p = self
                .models
                .get(*id)
                .ok_or(SceneError::UnknownModel)?
                .parent();
            if p != Some(parent) {
                return Err(SceneError::KindMismatch);
            }
        }

        let frames: Vec<Rect> = ids
            .iter()
            .filter_map(|id| self.abs_frame(*id))
            .collect();
        let corners: Vec<Vec2> = frames
            .iter()
            .flat_map(|f| f.corners())
            .collect();
        let bounds = Rect::bounding(&corners);

        // Keep z-order: members sorted by their index under the old parent,
        // group inserted where the lowest member sat
        let siblings = self.models[parent].children.clone();
        let mut ordered: Vec<(usize, ModelId)> = ids
            .iter()
            .map(|id| {
                let index = siblings.iter().position(|c| c == id).unwrap_or(usize::MAX);
                (index, *id)
            })
            .collect();
        ordered.sort_by_key(|(index, _)| *index);
        let insert_at = ordered.first().map(|(index, _)| *index).unwrap_or(0);

        let group = self.insert(Model::new(ModelKind::Group));
        self.attach_child(parent, group, Some(insert_at))?;
        self.set_property_quiet(group, "position", Value::Point(bounds.origin()));
        self.set_property_quiet(group, "size", Value::Size(bounds.size()));

        for (_, id) in ordered {
            let abs = self.abs_position(id);
            self.detach_child(id)?;
            self.attach_child(group, id, None)?;
            if let Some(abs) = abs {
                self.set_abs_position(id, abs);
            }
        }
        Ok(group)
    }

    /// Dissolve a group, re-anchoring its members under the group's parent
    /// at the group's z-position. Returns the members in z-order.
    pub fn ungroup(&mut self, group: ModelId) -> Result<Vec<ModelId>, SceneError> {
        let model = self.models.get(group).ok_or(SceneError::UnknownModel)?;
        if model.kind() != ModelKind::Group {
            return Err(SceneError::KindMismatch);
        }
        let parent = model.parent().ok_or(SceneError::NotAttached)?;
        let members = model.children().to_vec();

        // Card-space anchors must be read while the full ancestor chain is
        // still intact
        let anchors: Vec<Option<Vec2>> = members
            .iter()
            .map(|id| self.abs_position(*id))
            .collect();
        let mut insert_at = self.detach_child(group)?;
        for (id, abs) in members.iter().zip(anchors) {
            self.detach_child(*id)?;
            self.attach_child(parent, *id, Some(insert_at))?;
            if let Some(abs) = abs {
                self.set_abs_position(*id, abs);
            }
            insert_at += 1;
        }
        self.set_down(group);
        Ok(members)
    }

    fn is_ancestor_of(&self, candidate: ModelId, of: ModelId) -> bool {
        let mut cursor = self.models.get(of).and_then(Model::parent);
        while let Some(id) = cursor {
            if id == candidate {
                return true;
            }
            cursor = self.models.get(id).and_then(Model::parent);
        }
        false
    }

    /// Pre-order walk of the subtree below `id`, in z-order
    pub fn descendants(&self, id: ModelId) -> Vec<ModelId> {
        let mut out = Vec::new();
        let mut stack: Vec<ModelId> = match self.models.get(id) {
            Some(m) => m.children().iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(m) = self.models.get(next) {
                stack.extend(m.children().iter().rev());
            }
        }
        out
    }

    /// The nearest card at or above `id`; `None` for the stack itself
    pub fn card_of(&self, id: ModelId) -> Option<ModelId> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let model = self.models.get(current)?;
            match model.kind() {
                ModelKind::Card => return Some(current),
                ModelKind::Stack => return None,
                _ => cursor = model.parent(),
            }
        }
        None
    }

    /// Depth-first search for a model by name, starting at `from`
    pub fn find_by_name(&self, from: ModelId, name: &str) -> Option<ModelId> {
        if self.models.get(from)?.name() == name {
            return Some(from);
        }
        self.descendants(from)
            .into_iter()
            .find(|id| self.models.get(*id).is_some_and(|m| m.name() == name))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Tear down a subtree, bottom-up: children first, then the node itself.
    /// Animation and bounce state is cleared and the tombstone set; other
    /// models' references to this subtree are pruned lazily by the collision
    /// pass. Tearing down an already torn-down subtree is a guarded no-op.
    pub fn set_down(&mut self, id: ModelId) {
        let Some(model) = self.models.get(id) else {
            return;
        };
        if model.is_torn_down() {
            warn!(?id, "set_down called twice on the same model");
            return;
        }
        for child in model.children().to_vec() {
            self.set_down(child);
        }
        if let Some(m) = self.models.get_mut(id) {
            m.tear_down();
        }
    }

    /// Reverse a teardown for a detach/reattach flow (cut/paste, undo).
    /// Only meaningful on a torn-down subtree.
    pub fn set_back_up(&mut self, id: ModelId) {
        let Some(model) = self.models.get(id) else {
            return;
        };
        if !model.is_torn_down() {
            return;
        }
        self.models[id].revive();
        for child in self.models[id].children().to_vec() {
            self.set_back_up(child);
        }
    }

    /// Swap in a freshly loaded stack tree, dropping the old one
    pub(crate) fn replace_root(&mut self, new_root: ModelId) {
        let old_root = self.root;
        self.root = new_root;
        self.purge(old_root);
        self.changes.clear();
        self.clear_dirty(new_root);
    }

    /// Drop a detached subtree from the arena entirely
    pub fn purge(&mut self, id: ModelId) {
        let Some(model) = self.models.get(id) else {
            return;
        };
        if model.parent().is_some() {
            warn!(?id, "refusing to purge a model that is still attached");
            return;
        }
        for child in model.children().to_vec() {
            // Children are detached implicitly with their parent
            if let Some(m) = self.models.get_mut(child) {
                m.parent = None;
            }
            self.purge(child);
        }
        self.models.remove(id);
    }

    // ------------------------------------------------------------------
    // Naming
    // ------------------------------------------------------------------

    /// All names used in the subtree rooted at `scope`
    pub fn names_in_scope(&self, scope: ModelId) -> FxHashSet<String> {
        let mut names = FxHashSet::default();
        if let Some(m) = self.models.get(scope) {
            names.insert(m.name().to_string());
        }
        for id in self.descendants(scope) {
            if let Some(m) = self.models.get(id) {
                names.insert(m.name().to_string());
            }
        }
        names
    }

    fn name_taken(name: &str, existing: &FxHashSet<String>) -> bool {
        name.is_empty() || existing.contains(name) || RESERVED_NAMES.contains(&name)
    }

    /// First free `base_N` name, counting up from 1
    pub fn next_available_name(base: &str, existing: &FxHashSet<String>) -> String {
        let base = base.trim_end_matches('_');
        let base = if base.is_empty() { "object" } else { base };
        let mut i = 1;
        loop {
            let candidate = format!("{base}_{i}");
            if !Self::name_taken(&candidate, existing) {
                return candidate;
            }
            i += 1;
        }
    }

    /// Pick a name based on `desired` that collides with neither `existing`
    /// nor the reserved script globals
    pub fn dedupe_name(desired: &str, existing: &FxHashSet<String>) -> String {
        if !Self::name_taken(desired, existing) {
            return desired.to_string();
        }
        let base = desired.trim_end_matches(|c: char| c.is_ascii_digit() || c == '_');
        Self::next_available_name(base, existing)
    }

    /// De-duplicate every name in the subtree rooted at `subtree` against the
    /// names already present under `scope`. Unnamed models get a generated
    /// `kind_N` name.
    fn dedupe_subtree_names(&mut self, scope: ModelId, subtree: ModelId) {
        let mut existing = self.names_in_scope(scope);
        let mut todo = vec![subtree];
        while let Some(id) = todo.pop() {
            let Some(model) = self.models.get(id) else {
                continue;
            };
            todo.extend(model.children().iter().copied());
            let name = model.name().to_string();
            let unique = if name.is_empty() {
                Self::next_available_name(model.kind().name_base(), &existing)
            } else {
                Self::dedupe_name(&name, &existing)
            };
            if unique != name {
                self.models[id].set_property("name", Value::Str(unique.clone()));
            }
            existing.insert(unique);
        }
    }

    // ------------------------------------------------------------------
    // Properties and notifications
    // ------------------------------------------------------------------

    /// Read a property; resolves the computed `center` pseudo-property
    pub fn get_property(&self, id: ModelId, key: &str) -> Option<Value> {
        if key == "center" {
            return Some(Value::Point(self.abs_center(id)?));
        }
        self.models.get(id)?.property(key).cloned()
    }

    /// Validated property write with change notification
    pub fn set_property(&mut self, id: ModelId, key: &str, value: Value) -> SetOutcome {
        self.set_property_inner(id, key, value, true)
    }

    /// Validated property write without notification (load paths, silent
    /// speed resets)
    pub fn set_property_quiet(&mut self, id: ModelId, key: &str, value: Value) -> SetOutcome {
        self.set_property_inner(id, key, value, false)
    }

    fn set_property_inner(
        &mut self,
        id: ModelId,
        key: &str,
        value: Value,
        notify: bool,
    ) -> SetOutcome {
        if key == "center" {
            if let Some(p) = value.as_point() {
                return self.set_abs_center_inner(id, p, notify);
            }
            return SetOutcome::Rejected { notify: false };
        }
        let Some(model) = self.models.get_mut(id) else {
            return SetOutcome::Unchanged;
        };
        let outcome = model.set_property(key, value);
        if notify {
            match &outcome {
                SetOutcome::Changed(_) | SetOutcome::Rejected { notify: true } => {
                    self.changes.push(PropertyChange {
                        model: id,
                        key: key.to_string(),
                    });
                }
                _ => {}
            }
        }
        outcome
    }

    /// Drain pending change notifications (one per accepted or
    /// notify-on-reject mutation, in order)
    pub fn take_changes(&mut self) -> Vec<PropertyChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    // ------------------------------------------------------------------
    // Dirty tracking
    // ------------------------------------------------------------------

    /// True if anything in the subtree has unsaved changes
    pub fn is_dirty(&self, id: ModelId) -> bool {
        let Some(model) = self.models.get(id) else {
            return false;
        };
        model.is_dirty
            || model
                .children()
                .iter()
                .any(|child| self.is_dirty(*child))
    }

    /// Clear the dirty flag across a subtree (post-save)
    pub fn clear_dirty(&mut self, id: ModelId) {
        let Some(model) = self.models.get_mut(id) else {
            return;
        };
        model.is_dirty = false;
        for child in model.children().to_vec() {
            self.clear_dirty(child);
        }
    }

    // ------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------

    /// Effective visibility: hidden ancestors below the card hide the
    /// whole subtree
    pub fn is_visible(&self, id: ModelId) -> bool {
        let Some(model) = self.models.get(id) else {
            return false;
        };
        if !model.visible_flag() {
            return false;
        }
        match model.parent() {
            Some(parent)
                if !self
                    .models
                    .get(parent)
                    .map(|p| p.kind().is_card_or_stack())
                    .unwrap_or(true) =>
            {
                self.is_visible(parent)
            }
            _ => true,
        }
    }

    // ------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------

    /// Compose ancestor transforms from this model's local frame up to (not
    /// including) the nearest card/stack. Ancestors closest to the card are
    /// applied last when transforming a point.
    pub fn affine_to_card(&self, id: ModelId) -> Affine {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(model) = self.models.get(current) else {
                break;
            };
            if model.kind().is_card_or_stack() {
                break;
            }
            chain.push(current);
            cursor = model.parent();
        }
        let mut aff = Affine::IDENTITY;
        for id in chain.into_iter().rev() {
            let model = &self.models[id];
            aff = aff
                * Affine::local_to_parent(
                    model.position(),
                    model.size(),
                    model.rotation().unwrap_or(0.0),
                );
        }
        aff
    }

    fn parent_affine(&self, id: ModelId) -> Affine {
        match self.models.get(id).and_then(Model::parent) {
            Some(parent) => self.affine_to_card(parent),
            None => Affine::IDENTITY,
        }
    }

    /// Position in the owning card's coordinate space
    pub fn abs_position(&self, id: ModelId) -> Option<Vec2> {
        let model = self.models.get(id)?;
        let aff = self.parent_affine(id);
        Some(aff.apply(model.position()))
    }

    pub fn set_abs_position(&mut self, id: ModelId, pos: Vec2) -> SetOutcome {
        let Some(inv) = self.parent_affine(id).invert() else {
            return SetOutcome::Unchanged;
        };
        let local = inv.apply(pos);
        self.set_property(id, "position", Value::Point(local))
    }

    /// Center point in the owning card's coordinate space
    pub fn abs_center(&self, id: ModelId) -> Option<Vec2> {
        let model = self.models.get(id)?;
        let size = model.size();
        let unrotated_child_of_card = model
            .parent()
            .and_then(|p| self.models.get(p))
            .map(|p| p.kind().is_card_or_stack())
            .unwrap_or(true)
            && model.rotation().unwrap_or(0.0) == 0.0;
        if unrotated_child_of_card {
            return Some(model.position() + size.half());
        }
        Some(self.affine_to_card(id).apply(size.half()))
    }

    pub fn set_abs_center(&mut self, id: ModelId, center: Vec2) -> SetOutcome {
        self.set_abs_center_inner(id, center, true)
    }

    fn set_abs_center_inner(&mut self, id: ModelId, center: Vec2, notify: bool) -> SetOutcome {
        let Some(model) = self.models.get(id) else {
            return SetOutcome::Unchanged;
        };
        let half = model.size().half();
        let parent_is_card = model
            .parent()
            .and_then(|p| self.models.get(p))
            .map(|p| p.kind().is_card_or_stack())
            .unwrap_or(true);
        let local = if parent_is_card {
            center - half
        } else {
            let Some(inv) = self.parent_affine(id).invert() else {
                return SetOutcome::Unchanged;
            };
            inv.apply(center) - half
        };
        self.set_property_inner(id, "position", Value::Point(local), notify)
    }

    /// The model's rectangle corners in card space, rotation applied
    pub fn rotated_corners(&self, id: ModelId) -> Option<[Vec2; 4]> {
        let model = self.models.get(id)?;
        let local = Rect::from_origin_size(Vec2::ZERO, model.size());
        Some(self.affine_to_card(id).transform_quad(local.corners()))
    }

    /// Axis-aligned bounds in card space
    pub fn abs_frame(&self, id: ModelId) -> Option<Rect> {
        let model = self.models.get(id)?;
        let parent_is_card = model
            .parent()
            .and_then(|p| self.models.get(p))
            .map(|p| p.kind().is_card_or_stack())
            .unwrap_or(true);
        if parent_is_card && model.rotation().unwrap_or(0.0) == 0.0 {
            return Some(Rect::from_origin_size(model.position(), model.size()));
        }
        Some(Rect::bounding(&self.rotated_corners(id)?))
    }

    /// The hit-region polygon in card space; empty when invisible
    pub fn hit_region(&self, id: ModelId) -> Option<[Vec2; 4]> {
        if !self.is_visible(id) {
            return None;
        }
        self.rotated_corners(id)
    }

    /// True when `point` (card space) falls inside the model's hit region
    pub fn contains_point(&self, id: ModelId, point: Vec2) -> bool {
        match self.hit_region(id) {
            Some(region) => convex_contains(&region, point),
            None => false,
        }
    }

    /// True when the two models' hit regions overlap
    pub fn models_touch(&self, a: ModelId, b: ModelId) -> bool {
        match (self.hit_region(a), self.hit_region(b)) {
            (Some(ra), Some(rb)) => convex_overlap(&ra, &rb),
            _ => false,
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decker_core::Size;

    fn scene_with_button() -> (Scene, ModelId, ModelId) {
        let mut scene = Scene::new();
        let card = scene.cards()[0];
        let button = scene.new_child(card, ModelKind::Button).unwrap();
        (scene, card, button)
    }

    #[test]
    fn test_new_scene_has_stack_and_card() {
        let scene = Scene::new();
        assert_eq!(scene.model(scene.root()).unwrap().kind(), ModelKind::Stack);
        assert_eq!(scene.cards().len(), 1);
        assert_eq!(scene.model(scene.cards()[0]).unwrap().name(), "card_1");
    }

    #[test]
    fn test_new_child_gets_generated_name() {
        let (mut scene, card, button) = scene_with_button();
        assert_eq!(scene.model(button).unwrap().name(), "button_1");
        let second = scene.new_child(card, ModelKind::Button).unwrap();
        assert_eq!(scene.model(second).unwrap().name(), "button_2");
    }

    #[test]
    fn test_attach_dedupes_against_card_scope() {
        let (mut scene, card, _button) = scene_with_button();
        let mut loose = Model::new(ModelKind::Image);
        loose.set_property("name", Value::from("button_1"));
        let id = scene.insert(loose);
        scene.attach_child(card, id, None).unwrap();
        assert_eq!(scene.model(id).unwrap().name(), "button_2");
    }

    #[test]
    fn test_reserved_names_are_avoided() {
        let existing = FxHashSet::default();
        assert_eq!(Scene::dedupe_name("self", &existing), "self_1");
    }

    #[test]
    fn test_attach_rejects_cycles() {
        let (mut scene, card, _) = scene_with_button();
        let group = scene.new_child(card, ModelKind::Group).unwrap();
        let inner = scene.new_child(group, ModelKind::Group).unwrap();
        scene.detach_child(group).unwrap();
        assert_eq!(
            scene.attach_child(inner, group, None),
            Err(SceneError::WouldCycle)
        );
    }

    #[test]
    fn test_detach_returns_index_for_undo() {
        let (mut scene, card, button) = scene_with_button();
        let second = scene.new_child(card, ModelKind::Button).unwrap();
        assert_eq!(scene.detach_child(button).unwrap(), 0);
        assert_eq!(scene.model(card).unwrap().children(), &[second]);
        scene.attach_child(card, button, Some(0)).unwrap();
        assert_eq!(scene.model(card).unwrap().children(), &[button, second]);
    }

    #[test]
    fn test_move_child_to_negative_index() {
        let (mut scene, card, button) = scene_with_button();
        let b2 = scene.new_child(card, ModelKind::Button).unwrap();
        let b3 = scene.new_child(card, ModelKind::Button).unwrap();
        scene.move_child_to_index(button, -1).unwrap();
        assert_eq!(scene.model(card).unwrap().children(), &[b2, b3, button]);
    }

    #[test]
    fn test_set_down_is_recursive_and_guarded() {
        let (mut scene, card, _) = scene_with_button();
        let group = scene.new_child(card, ModelKind::Group).unwrap();
        let inner = scene.new_child(group, ModelKind::Button).unwrap();
        scene.detach_child(group).unwrap();
        scene.set_down(group);
        assert!(scene.model(group).unwrap().is_torn_down());
        assert!(scene.model(inner).unwrap().is_torn_down());
        // Second teardown is a logged no-op
        scene.set_down(group);
        scene.set_back_up(group);
        assert!(!scene.model(inner).unwrap().is_torn_down());
    }

    #[test]
    fn test_property_read_after_teardown_does_not_fail() {
        let (mut scene, _, button) = scene_with_button();
        scene.detach_child(button).unwrap();
        scene.set_down(button);
        assert_eq!(
            scene.get_property(button, "name"),
            Some(Value::from("button_1"))
        );
    }

    #[test]
    fn test_purge_refuses_attached_models() {
        let (mut scene, _card, button) = scene_with_button();
        scene.purge(button);
        assert!(scene.model(button).is_some());
        scene.detach_child(button).unwrap();
        scene.purge(button);
        assert!(scene.model(button).is_none());
    }

    #[test]
    fn test_change_notifications() {
        let (mut scene, _, button) = scene_with_button();
        scene.set_property(button, "position", Value::Point(Vec2::new(5.0, 5.0)));
        scene.set_property_quiet(button, "position", Value::Point(Vec2::new(9.0, 9.0)));
        let changes = scene.take_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "position");
        assert!(scene.take_changes().is_empty());
    }

    #[test]
    fn test_rejected_rename_still_notifies() {
        let (mut scene, _, button) = scene_with_button();
        scene.set_property(button, "name", Value::from("!!!"));
        let changes = scene.take_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(scene.model(button).unwrap().name(), "button_1");
    }

    #[test]
    fn test_dirty_tracking_is_subtree_recursive() {
        let (mut scene, card, button) = scene_with_button();
        scene.clear_dirty(scene.root());
        assert!(!scene.is_dirty(scene.root()));
        scene.set_property(button, "title", Value::from("Go"));
        assert!(scene.is_dirty(scene.root()));
        assert!(scene.is_dirty(card));
        scene.clear_dirty(scene.root());
        assert!(!scene.is_dirty(card));
    }

    #[test]
    fn test_abs_position_round_trip_under_rotation() {
        let mut scene = Scene::new();
        let card = scene.cards()[0];
        let group = scene.new_child(card, ModelKind::Group).unwrap();
        scene.set_property(group, "position", Value::Point(Vec2::new(40.0, 30.0)));
        scene.set_property(group, "size", Value::Size(Size::new(100.0, 80.0)));
        let image = scene.new_child(group, ModelKind::Image).unwrap();
        scene.set_property(image, "position", Value::Point(Vec2::new(10.0, 5.0)));

        for rot in [0.0, 45.0, 90.0, 180.0, 270.0] {
            scene.set_property(group, "rotation", Value::Real(rot));
            let abs = scene.abs_position(image).unwrap();
            scene.set_abs_position(image, abs);
            let local = scene.model(image).unwrap().position();
            assert!(
                (local.x - 10.0).abs() < 1e-9 && (local.y - 5.0).abs() < 1e-9,
                "rotation {rot}: {local:?}"
            );
        }
    }

    #[test]
    fn test_abs_center_fast_path_matches_affine_path() {
        let mut scene = Scene::new();
        let card = scene.cards()[0];
        let image = scene.new_child(card, ModelKind::Image).unwrap();
        scene.set_property(image, "position", Value::Point(Vec2::new(10.0, 20.0)));
        scene.set_property(image, "size", Value::Size(Size::new(40.0, 20.0)));
        assert_eq!(scene.abs_center(image), Some(Vec2::new(30.0, 30.0)));
        // Rotating about the center leaves the center fixed
        scene.set_property(image, "rotation", Value::Real(90.0));
        let c = scene.abs_center(image).unwrap();
        assert!((c.x - 30.0).abs() < 1e-9 && (c.y - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_center_pseudo_property() {
        let mut scene = Scene::new();
        let card = scene.cards()[0];
        let button = scene.new_child(card, ModelKind::Button).unwrap();
        scene.set_property(button, "size", Value::Size(Size::new(20.0, 20.0)));
        scene.set_property(button, "center", Value::Point(Vec2::new(50.0, 50.0)));
        assert_eq!(
            scene.model(button).unwrap().position(),
            Vec2::new(40.0, 40.0)
        );
        assert_eq!(
            scene.get_property(button, "center"),
            Some(Value::Point(Vec2::new(50.0, 50.0)))
        );
    }

    #[test]
    fn test_visibility_follows_ancestors() {
        let mut scene = Scene::new();
        let card = scene.cards()[0];
        let group = scene.new_child(card, ModelKind::Group).unwrap();
        let button = scene.new_child(group, ModelKind::Button).unwrap();
        assert!(scene.is_visible(button));
        scene.set_property(group, "visible", Value::Bool(false));
        assert!(!scene.is_visible(button));
        assert!(scene.model(button).unwrap().visible_flag());
    }

    #[test]
    fn test_contains_point_rotation_aware() {
        let mut scene = Scene::new();
        let card = scene.cards()[0];
        let shape = scene.new_child(card, ModelKind::Shape).unwrap();
        scene.set_property(shape, "position", Value::Point(Vec2::new(0.0, 0.0)));
        scene.set_property(shape, "size", Value::Size(Size::new(40.0, 4.0)));
        scene.set_property(shape, "rotation", Value::Real(90.0));
        // After rotating the thin bar about its center, a point above the
        // center is inside and a point far to the right is not
        assert!(scene.contains_point(shape, Vec2::new(20.0, 15.0)));
        assert!(!scene.contains_point(shape, Vec2::new(38.0, 2.0)));
    }

    #[test]
    fn test_group_and_ungroup_preserve_card_positions() {
        let mut scene = Scene::new();
        let card = scene.cards()[0];
        let a = scene.new_child(card, ModelKind::Shape).unwrap();
        let b = scene.new_child(card, ModelKind::Shape).unwrap();
        scene.set_property(a, "position", Value::Point(Vec2::new(10.0, 10.0)));
        scene.set_property(a, "size", Value::Size(Size::new(20.0, 20.0)));
        scene.set_property(b, "position", Value::Point(Vec2::new(60.0, 40.0)));
        scene.set_property(b, "size", Value::Size(Size::new(20.0, 20.0)));

        let group = scene.group_models(&[a, b]).unwrap();
        assert_eq!(scene.model(group).unwrap().name(), "group_1");
        assert_eq!(scene.model(card).unwrap().children(), &[group]);
        assert_eq!(scene.model(group).unwrap().children(), &[a, b]);
        // Group frame is the members' union; members keep their card-space
        // positions
        assert_eq!(
            scene.model(group).unwrap().position(),
            Vec2::new(10.0, 10.0)
        );
        assert_eq!(scene.model(group).unwrap().size(), Size::new(70.0, 50.0));
        assert_eq!(scene.abs_position(a), Some(Vec2::new(10.0, 10.0)));
        assert_eq!(scene.abs_position(b), Some(Vec2::new(60.0, 40.0)));

        let members = scene.ungroup(group).unwrap();
        assert_eq!(members, vec![a, b]);
        assert_eq!(scene.model(card).unwrap().children(), &[a, b]);
        assert_eq!(scene.model(a).unwrap().position(), Vec2::new(10.0, 10.0));
        assert_eq!(scene.model(b).unwrap().position(), Vec2::new(60.0, 40.0));
        assert!(scene.model(group).unwrap().is_torn_down());
    }

    #[test]
    fn test_group_rejects_mixed_parents() {
        let mut scene = Scene::new();
        let card = scene.cards()[0];
        let a = scene.new_child(card, ModelKind::Shape).unwrap();
        let g = scene.new_child(card, ModelKind::Group).unwrap();
        let inner = scene.new_child(g, ModelKind::Shape).unwrap();
        assert_eq!(
            scene.group_models(&[a, inner]),
            Err(SceneError::KindMismatch)
        );
    }

    #[test]
    fn test_find_by_name() {
        let (scene, _, button) = scene_with_button();
        assert_eq!(scene.find_by_name(scene.root(), "button_1"), Some(button));
        assert_eq!(scene.find_by_name(scene.root(), "nope"), None);
    }
}
