//! Decker runtime engine
//!
//! Ties the scene graph, animation system, and collision engine together
//! under a fixed-rate scheduler, and draws the boundary script code crosses
//! to reach any of them.
//!
//! # Architecture
//!
//! - **Single-writer scene**: the scheduler context owns the scene; script
//!   contexts reach it through [`RuntimeHandle`] — short lock scopes for
//!   data, a command queue (drained at tick start) for structure
//! - **Tick pipeline**: commands → animation update/finish passes →
//!   collision detection (one full pass) → bounce resolution → half-rate
//!   periodic/key-hold dispatch → one coalesced redraw request
//! - **Handler evaluator**: handler text is opaque; a pluggable
//!   [`HandlerEvaluator`] runs it, and its errors are reported, never
//!   propagated

pub mod collision;
pub mod command;
pub mod error;
pub mod evaluator;
pub mod handle;
pub mod runtime;
pub mod scheduler;

pub use collision::{BounceAxes, BounceEvent, Collision, Edge};
pub use command::{Command, CommandSender, Reply};
pub use error::{EngineError, Result};
pub use evaluator::{
    EventPayload, HandlerErrorReport, HandlerEvaluator, HandlerInvocation, NullEvaluator,
    ScriptError,
};
pub use handle::RuntimeHandle;
pub use runtime::Runtime;
pub use scheduler::{Scheduler, WakeCallback, DEFAULT_FPS};
