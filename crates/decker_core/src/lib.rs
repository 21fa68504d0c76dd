//! Decker core types
//!
//! Shared vocabulary for the Decker runtime: card-space geometry (y-up,
//! degree rotations, affine transforms), RGBA colors, and the dynamically
//! typed property values every model carries.
//!
//! # Features
//!
//! - **Geometry**: `Vec2`/`Size`/`Rect`/`Affine` plus convex-polygon overlap
//!   and containment tests used for hit regions and edge touches
//! - **Colors**: hex parse/emit in `#RGB`/`#RGBA`/`#RRGGBB`/`#RRGGBBAA` forms
//! - **Values**: tagged `Value` with declared `PropType` coercion rules

pub mod color;
pub mod geometry;
pub mod value;

pub use color::Color;
pub use geometry::{convex_contains, convex_overlap, Affine, Rect, Size, Vec2};
pub use value::{PropType, Value};
