//! Paint traversal
//!
//! Rendering is an external collaborator; the scene only walks its tree in
//! z-order and hands the visitor each visible model's resolved geometry.

use decker_core::{Affine, Rect};

use crate::model::Model;
use crate::scene::{ModelId, Scene};

/// Resolved geometry for one model, ready for a render surface
pub struct PaintNode<'a> {
    pub id: ModelId,
    pub model: &'a Model,
    /// Local-frame to card-frame transform
    pub transform: Affine,
    /// Axis-aligned bounds in card space
    pub abs_frame: Rect,
}

/// Visitor receiving models front-to-back parents-first
pub trait PaintVisitor {
    fn paint(&mut self, node: &PaintNode);
}

impl<F: FnMut(&PaintNode)> PaintVisitor for F {
    fn paint(&mut self, node: &PaintNode) {
        self(node)
    }
}

impl Scene {
    /// Walk `root`'s subtree in z-order, skipping invisible subtrees, and
    /// hand each model to the visitor with its resolved geometry
    pub fn paint_traverse(&self, root: ModelId, visitor: &mut dyn PaintVisitor) {
        let Some(model) = self.model(root) else {
            return;
        };
        if model.is_torn_down() || !model.visible_flag() {
            return;
        }
        if let Some(abs_frame) = self.abs_frame(root) {
            visitor.paint(&PaintNode {
                id: root,
                model,
                transform: self.affine_to_card(root),
                abs_frame,
            });
        }
        for child in model.children() {
            self.paint_traverse(*child, visitor);
        }
    }
}
