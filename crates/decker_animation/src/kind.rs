//! Per-kind animation behavior
//!
//! Begin/apply/finish/cancel are free functions dispatched on
//! [`AnimationKind`]; the descriptor carries only values, never closures, so
//! nothing can alias model state across the tick.

use decker_core::{Value, Vec2};
use decker_model::{AnimationKind, ModelId, Scene};

/// Capture origin/offset from the model's current state and, for motion
/// kinds, publish the implied speed so collision gating sees the movement.
pub fn begin(scene: &mut Scene, id: ModelId, kind: &mut AnimationKind, duration: f64) {
    match kind {
        AnimationKind::Position { end, origin, offset } => {
            let Some(current) = scene.abs_position(id) else {
                return;
            };
            *origin = Some(current);
            *offset = *end - current;
            scene.set_property(id, "speed", Value::Point(*offset * (1.0 / duration)));
        }
        AnimationKind::Center { end, origin, offset } => {
            let Some(current) = scene.abs_center(id) else {
                return;
            };
            *origin = Some(current);
            *offset = *end - current;
            scene.set_property(id, "speed", Value::Point(*offset * (1.0 / duration)));
        }
        AnimationKind::Size { end, origin, offset } => {
            let Some(model) = scene.model(id) else {
                return;
            };
            let current = model.size();
            *origin = Some(current);
            *offset = Vec2::new(end.width - current.width, end.height - current.height);
        }
        AnimationKind::Rotation {
            end,
            force_direction,
            origin,
            offset,
        } => {
            let Some(current) = scene.model(id).and_then(|m| m.rotation()) else {
                return;
            };
            *origin = Some(current);
            let mut delta = *end - current;
            if *force_direction > 0 {
                if delta <= 0.0 {
                    delta += 360.0;
                }
            } else if *force_direction < 0 {
                if delta >= 0.0 {
                    delta -= 360.0;
                }
            } else {
                // Shortest arc
                if delta > 180.0 {
                    delta -= 360.0;
                }
                if delta < -180.0 {
                    delta += 360.0;
                }
            }
            *offset = delta;
        }
    }
}

/// Apply the interpolated value for `progress` in [0, 1]
pub fn apply(scene: &mut Scene, id: ModelId, kind: &AnimationKind, progress: f64) {
    match kind {
        AnimationKind::Position { origin, offset, .. } => {
            if let Some(origin) = origin {
                scene.set_abs_position(id, *origin + *offset * progress);
            }
        }
        AnimationKind::Center { origin, offset, .. } => {
            if let Some(origin) = origin {
                scene.set_abs_center(id, *origin + *offset * progress);
            }
        }
        AnimationKind::Size { origin, offset, .. } => {
            if let Some(origin) = origin {
                let size = Vec2::new(origin.width, origin.height) + *offset * progress;
                scene.set_property(id, "size", Value::Point(size));
            }
        }
        AnimationKind::Rotation { origin, offset, .. } => {
            if let Some(origin) = origin {
                scene.set_property(id, "rotation", Value::Real(origin + offset * progress));
            }
        }
    }
}

/// Post-finish side effects: a completed motion leaves the model at rest,
/// silently (observers already saw the final position)
pub fn finish(scene: &mut Scene, id: ModelId, kind: &AnimationKind) {
    if matches!(
        kind,
        AnimationKind::Position { .. } | AnimationKind::Center { .. }
    ) {
        scene.set_property_quiet(id, "speed", Value::Point(Vec2::ZERO));
    }
}

/// Cancellation side effects: stop the implied motion, notifying observers
pub fn cancel(scene: &mut Scene, id: ModelId, kind: &AnimationKind) {
    if matches!(
        kind,
        AnimationKind::Position { .. } | AnimationKind::Center { .. }
    ) {
        scene.set_property(id, "speed", Value::Point(Vec2::ZERO));
    }
}
