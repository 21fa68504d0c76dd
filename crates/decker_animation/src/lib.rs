//! Decker animation system
//!
//! Time-based property animation for the Decker scene graph.
//!
//! # Features
//!
//! - **Per-property queues**: at most one running animation per
//!   (model, property); latecomers chain sequentially
//! - **Tagged descriptors**: position/center/size/rotation variants carrying
//!   only values — update and finish logic are pure functions on the tag
//! - **Two-pass ticking**: all updates apply before any finish effects, so
//!   chained animations never expose intermediate state mid-tick
//! - **Speed integration**: constant-speed motion advances every tick unless
//!   a position animation owns the property

pub mod engine;
pub mod kind;

pub use engine::{add_animation, stop_animations, tick, AnimationEvent, TickOutput};
