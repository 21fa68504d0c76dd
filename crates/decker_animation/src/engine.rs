//! Animation queue engine
//!
//! Each model keys animation queues by property; only the head of a queue
//! runs. A tick is two passes: every running animation applies its update,
//! then finished heads pop and their successors start. Deferring the finish
//! pass means nothing a finish side effect starts can be observed mid-tick.

use std::collections::VecDeque;

use decker_model::{AnimProp, AnimationDescriptor, ModelId, Scene};
use smallvec::SmallVec;
use tracing::trace;

use crate::kind;

/// Events produced by a tick or a stop request
#[derive(Debug, Clone, PartialEq)]
pub enum AnimationEvent {
    /// A descriptor ran to completion (its final update already applied)
    Finished {
        model: ModelId,
        prop: AnimProp,
        token: Option<u64>,
    },
    /// A started descriptor was cancelled by a stop request
    Cancelled {
        model: ModelId,
        prop: AnimProp,
        token: Option<u64>,
    },
}

/// What a tick did, for redraw coalescing
#[derive(Debug, Default)]
pub struct TickOutput {
    pub events: Vec<AnimationEvent>,
    /// True when any animation updated or any speed integrated
    pub did_run: bool,
}

/// Queue a new animation on `(model, prop)`. If the queue was empty the
/// descriptor starts immediately; otherwise it waits for its predecessors,
/// so scripts can chain animations on one property without bookkeeping.
pub fn add_animation(scene: &mut Scene, id: ModelId, mut desc: AnimationDescriptor, now: f64) {
    let Some(model) = scene.model(id) else {
        return;
    };
    if model.is_torn_down() {
        return;
    }
    let prop = desc.kind.prop();
    let queue_empty = model
        .animations
        .get(&prop)
        .map(VecDeque::is_empty)
        .unwrap_or(true);
    if queue_empty {
        start_descriptor(scene, id, &mut desc, now);
    }
    if let Some(model) = scene.model_mut(id) {
        model.animations.entry(prop).or_default().push_back(desc);
    }
}

fn start_descriptor(scene: &mut Scene, id: ModelId, desc: &mut AnimationDescriptor, now: f64) {
    if desc.start_time.is_none() {
        desc.start_time = Some(now);
        kind::begin(scene, id, &mut desc.kind, desc.duration);
    }
}

/// Cancel animations on one property, or on all of them. Only a descriptor
/// that had started gets cancellation side effects; queued followers are
/// dropped silently.
pub fn stop_animations(
    scene: &mut Scene,
    id: ModelId,
    prop: Option<AnimProp>,
) -> Vec<AnimationEvent> {
    let mut events = Vec::new();
    let props: SmallVec<[AnimProp; 3]> = match (prop, scene.model(id)) {
        (Some(p), Some(_)) => SmallVec::from_slice(&[p]),
        (None, Some(model)) => model.animations.keys().copied().collect(),
        (_, None) => return events,
    };
    for prop in props {
        let Some(queue) = scene
            .model_mut(id)
            .and_then(|m| m.animations.remove(&prop))
        else {
            continue;
        };
        if let Some(head) = queue.front() {
            if head.start_time.is_some() {
                kind::cancel(scene, id, &head.kind);
                events.push(AnimationEvent::Cancelled {
                    model: id,
                    prop,
                    token: head.on_finished,
                });
            }
        }
    }
    events
}

/// Advance every live animation under `card` (card first, then descendants
/// in z-order) and integrate constant-speed motion.
///
/// `now` is the engine clock after adding `dt`; both are in seconds.
pub fn tick(scene: &mut Scene, card: ModelId, now: f64, dt: f64) -> TickOutput {
    let mut out = TickOutput::default();
    let mut targets = vec![card];
    targets.extend(scene.descendants(card));

    // Pass 1: integrate speeds and apply every running animation's update
    let mut finish_list: Vec<(ModelId, AnimProp)> = Vec::new();
    for id in targets {
        let Some(model) = scene.model(id) else {
            continue;
        };
        if model.is_torn_down() {
            continue;
        }

        // Constant-speed motion, suppressed while a position animation owns
        // the property
        if !model.kind().is_card_or_stack() {
            let speed = model.speed();
            if !speed.is_zero() && !model.animations.contains_key(&AnimProp::Position) {
                let pos = model.position();
                scene.set_property(id, "position", (pos + speed * dt).into());
                out.did_run = true;
            }
        }

        let Some(model) = scene.model(id) else {
            continue;
        };
        let mut updates: SmallVec<[(AnimProp, decker_model::AnimationKind, f64); 3]> =
            SmallVec::new();
        for (prop, queue) in &model.animations {
            let Some(head) = queue.front() else {
                continue;
            };
            if let Some(progress) = head.progress(now) {
                updates.push((*prop, head.kind.clone(), progress));
                if progress >= 1.0 {
                    finish_list.push((id, *prop));
                }
            }
        }
        for (_, anim_kind, progress) in &updates {
            kind::apply(scene, id, anim_kind, *progress);
            out.did_run = true;
        }
    }

    // Pass 2: pop finished heads and start their successors. Runs after all
    // updates so a successor's first effects are never observed mid-tick.
    for (id, prop) in finish_list {
        finish_animation(scene, id, prop, now, &mut out.events);
    }
    out
}

fn finish_animation(
    scene: &mut Scene,
    id: ModelId,
    prop: AnimProp,
    now: f64,
    events: &mut Vec<AnimationEvent>,
) {
    let Some(model) = scene.model_mut(id) else {
        return;
    };
    let Some(queue) = model.animations.get_mut(&prop) else {
        return;
    };
    let Some(done) = queue.pop_front() else {
        return;
    };
    let mut successor = queue.pop_front();
    if successor.is_none() {
        model.animations.remove(&prop);
    }

    // Finish effects first, successor start after, so a chained animation
    // never observes (or loses) state from its predecessor's wind-down
    trace!(?id, ?prop, "animation finished");
    kind::finish(scene, id, &done.kind);
    events.push(AnimationEvent::Finished {
        model: id,
        prop,
        token: done.on_finished,
    });

    if let Some(next) = &mut successor {
        start_descriptor(scene, id, next, now);
    }
    if let Some(next) = successor {
        if let Some(model) = scene.model_mut(id) {
            model.animations.entry(prop).or_default().push_front(next);
        }
    }
}
