//! Decker scene graph
//!
//! The mutable model tree at the heart of the Decker runtime: a slotmap
//! arena of typed [`Model`] nodes linked by id, with validated property
//! stores, per-property animation queues, bounce-partner registries, and
//! plain-data persistence snapshots.
//!
//! # Features
//!
//! - **Arena tree**: parents and children reference each other by
//!   [`ModelId`], so teardown can never dangle
//! - **Typed properties**: declared-type coercion with silent rejection,
//!   ordered tables, change notifications, dirty tracking
//! - **Lifecycle**: bottom-up teardown with tombstones, reattach for
//!   cut/paste flows, deferred purge
//! - **Geometry**: absolute positions/centers/frames and rotation-aware hit
//!   regions composed from ancestor transforms
//! - **Persistence**: `ModelData` snapshots that round-trip through serde

pub mod anim;
pub mod data;
pub mod error;
pub mod model;
pub mod paint;
pub mod scene;

pub use anim::{AnimProp, AnimationDescriptor, AnimationKind};
pub use data::ModelData;
pub use error::SceneError;
pub use model::{handlers, BounceMode, BounceState, Model, ModelKind, SetOutcome};
pub use paint::{PaintNode, PaintVisitor};
pub use scene::{ModelId, PropertyChange, Scene, RESERVED_NAMES};
