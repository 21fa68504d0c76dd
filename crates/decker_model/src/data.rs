//! Persistence records
//!
//! A [`ModelData`] is the plain serializable snapshot of a model subtree:
//! type tag, non-empty handlers, typed properties (minus runtime-only and
//! computed keys), and children in z-order. The same records back saved
//! stacks, the clipboard, and script-driven cloning — a snapshot holds no
//! live references.

use decker_core::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SceneError;
use crate::model::{Model, ModelKind};
use crate::scene::{ModelId, Scene};

/// Keys that never round-trip: runtime motion state and computed values
const TRANSIENT_KEYS: &[&str] = &["visible", "speed", "center"];

/// Plain-data snapshot of one model subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub handlers: IndexMap<String, String>,
    pub properties: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ModelData>,
}

impl Scene {
    /// Snapshot a subtree as plain data
    pub fn get_data(&self, id: ModelId) -> Option<ModelData> {
        let model = self.model(id)?;
        let handlers = model
            .handlers()
            .iter()
            .filter(|(_, body)| !body.trim().is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let properties = model
            .properties()
            .iter()
            .filter(|(key, value)| {
                if TRANSIENT_KEYS.contains(&key.as_str()) {
                    return false;
                }
                // An empty data dict carries no information
                if key.as_str() == "data" {
                    return value.as_dict().is_some_and(|d| !d.is_empty());
                }
                true
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let children = model
            .children()
            .iter()
            .filter_map(|child| self.get_data(*child))
            .collect();
        Some(ModelData {
            kind: model.kind().as_str().to_string(),
            handlers,
            properties,
            children,
        })
    }

    /// Rebuild a detached model subtree from plain data. The returned root
    /// has no parent; attach it with [`Scene::attach_child`], which also
    /// de-duplicates names against the destination scope.
    pub fn model_from_data(&mut self, data: &ModelData) -> Result<ModelId, SceneError> {
        let kind = ModelKind::from_str(&data.kind)
            .ok_or_else(|| SceneError::UnknownType(data.kind.clone()))?;
        let mut model = Model::new(kind);
        for (name, body) in &data.handlers {
            if !model.set_handler(name, body.clone()) {
                // Saved stacks may carry handlers this build doesn't declare;
                // keep them so a round-trip loses nothing
                model.insert_handler(name.clone(), body.clone());
            }
        }
        for (key, value) in &data.properties {
            if model.property_type(key).is_some() {
                model.set_property(key, value.clone());
            }
        }
        let id = self.insert(model);
        for child_data in &data.children {
            let child = self.model_from_data(child_data)?;
            if let Some(m) = self.model_mut(child) {
                m.parent = Some(id);
            }
            if let Some(m) = self.model_mut(id) {
                m.children.push(child);
            }
        }
        Ok(id)
    }

    /// Duplicate a subtree via its data snapshot. Powers copy/paste and the
    /// script `clone` operation; the copy is detached and carries fresh
    /// (not-yet-deduplicated) names identical to the source's.
    pub fn create_copy(&mut self, id: ModelId) -> Result<ModelId, SceneError> {
        let data = self.get_data(id).ok_or(SceneError::UnknownModel)?;
        self.model_from_data(&data)
    }

    /// Build a whole scene from a saved stack record. The record's root must
    /// be a stack; a stack saved with no cards gets one empty card so the
    /// scene is always navigable.
    pub fn from_data(data: &ModelData) -> Result<Scene, SceneError> {
        match ModelKind::from_str(&data.kind) {
            Some(ModelKind::Stack) => {}
            Some(_) => return Err(SceneError::KindMismatch),
            None => return Err(SceneError::UnknownType(data.kind.clone())),
        }
        let mut scene = Scene::new();
        let root = scene.model_from_data(data)?;
        scene.replace_root(root);
        if scene.cards().is_empty() {
            scene.new_child(root, ModelKind::Card)?;
        }
        Ok(scene)
    }
}
