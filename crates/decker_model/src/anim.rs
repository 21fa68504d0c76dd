//! Animation descriptors
//!
//! Descriptors are plain data: target values, a duration, and a lazily
//! stamped start time. The queues live on each [`crate::Model`]; the engine
//! in `decker_animation` owns the begin/apply/finish logic as pure functions
//! dispatched on [`AnimationKind`], so no closures capture model state.

use decker_core::{Size, Vec2};

/// Property key an animation occupies
///
/// Center animations share the `Position` key, which is what makes position
/// and center animations (and constant-speed motion) mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimProp {
    Position,
    Size,
    Rotation,
}

/// What an animation interpolates
///
/// `origin`/`offset` fields are captured when the descriptor starts running,
/// not when it is queued, so chained animations pick up wherever their
/// predecessor left the model.
#[derive(Debug, Clone, PartialEq)]
pub enum AnimationKind {
    Position {
        end: Vec2,
        origin: Option<Vec2>,
        offset: Vec2,
    },
    Center {
        end: Vec2,
        origin: Option<Vec2>,
        offset: Vec2,
    },
    Size {
        end: Size,
        origin: Option<Size>,
        offset: Vec2,
    },
    Rotation {
        end: f64,
        /// 0 = shortest arc, >0 = force counting up, <0 = force counting down
        force_direction: i8,
        origin: Option<f64>,
        offset: f64,
    },
}

impl AnimationKind {
    pub fn position(end: Vec2) -> Self {
        AnimationKind::Position {
            end,
            origin: None,
            offset: Vec2::ZERO,
        }
    }

    pub fn center(end: Vec2) -> Self {
        AnimationKind::Center {
            end,
            origin: None,
            offset: Vec2::ZERO,
        }
    }

    pub fn size(end: Size) -> Self {
        AnimationKind::Size {
            end,
            origin: None,
            offset: Vec2::ZERO,
        }
    }

    pub fn rotation(end: f64, force_direction: i8) -> Self {
        AnimationKind::Rotation {
            end,
            force_direction,
            origin: None,
            offset: 0.0,
        }
    }

    /// The queue key this animation occupies
    pub fn prop(&self) -> AnimProp {
        match self {
            AnimationKind::Position { .. } | AnimationKind::Center { .. } => AnimProp::Position,
            AnimationKind::Size { .. } => AnimProp::Size,
            AnimationKind::Rotation { .. } => AnimProp::Rotation,
        }
    }
}

/// Minimum animation duration in seconds; zero-length requests clamp here
pub const MIN_DURATION: f64 = 0.01;

/// One queued time-based interpolation targeting a single property key
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationDescriptor {
    pub kind: AnimationKind,
    /// Seconds; always at least [`MIN_DURATION`]
    pub duration: f64,
    /// Engine clock time at which this descriptor started running; `None`
    /// while still queued behind another descriptor
    pub start_time: Option<f64>,
    /// Opaque completion token reported back when the animation finishes
    pub on_finished: Option<u64>,
}

impl AnimationDescriptor {
    pub fn new(kind: AnimationKind, duration: f64) -> Self {
        Self {
            kind,
            duration: duration.max(MIN_DURATION),
            start_time: None,
            on_finished: None,
        }
    }

    pub fn with_completion(mut self, token: u64) -> Self {
        self.on_finished = Some(token);
        self
    }

    /// Saturating progress in [0, 1] at engine-clock time `now`
    pub fn progress(&self, now: f64) -> Option<f64> {
        self.start_time
            .map(|start| ((now - start) / self.duration).min(1.0))
    }
}
