//! Typed property values
//!
//! Every model property carries a declared [`PropType`]; setters coerce
//! incoming values through [`PropType::coerce`] and silently reject values
//! that cannot be made to fit. Rejection is not an error: live editing keeps
//! the previous value and observers refresh from it.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::color::Color;
use crate::geometry::{Size, Vec2};

/// A dynamically typed property value
///
/// Untagged serialization keeps saved stacks readable: points and sizes are
/// `[x, y]` pairs, colors are `#`-prefixed hex strings. Variant order
/// matters for deserialization — `Color` before `Str` (the `#` prefix
/// disambiguates), `Point` before `Size` (a loaded pair reads as a point and
/// the declared property type coerces it back).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    UInt(u64),
    Real(f64),
    Color(Color),
    Str(String),
    Point(Vec2),
    Size(Size),
    Dict(Map<String, serde_json::Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<Vec2> {
        match self {
            Value::Point(p) => Some(*p),
            Value::Size(s) => Some(Vec2::new(s.width, s.height)),
            _ => None,
        }
    }

    pub fn as_size(&self) -> Option<Size> {
        match self {
            Value::Size(s) => Some(*s),
            Value::Point(p) => Some(Size::new(p.x, p.y)),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Value::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Map<String, serde_json::Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<Vec2> for Value {
    fn from(p: Vec2) -> Self {
        Value::Point(p)
    }
}

impl From<Size> for Value {
    fn from(s: Size) -> Self {
        Value::Size(s)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Declared type of a property, driving validation and coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropType {
    Str,
    Real,
    UInt,
    Bool,
    /// Whole-number point; coercion rounds components
    Point,
    /// Fractional point
    FloatPoint,
    Size,
    Color,
    Choice(&'static [&'static str]),
    Dict,
}

impl PropType {
    /// Coerce `value` to this type. `None` means the value is rejected and
    /// the property must be left unchanged.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (PropType::Str, v @ Value::Str(_)) => Some(v),
            (PropType::Real, v) => v.as_real().map(Value::Real),
            (PropType::UInt, Value::UInt(v)) => Some(Value::UInt(v)),
            (PropType::UInt, Value::Real(v)) => Some(Value::UInt(v.max(0.0) as u64)),
            (PropType::Bool, v @ Value::Bool(_)) => Some(v),
            (PropType::Point, v) => v
                .as_point()
                .map(|p| Value::Point(Vec2::new(p.x.round(), p.y.round()))),
            (PropType::FloatPoint, v) => v.as_point().map(Value::Point),
            (PropType::Size, v) => v.as_size().map(Value::Size),
            (PropType::Color, v @ Value::Color(_)) => Some(v),
            (PropType::Color, Value::Str(s)) => Color::from_hex(&s).map(Value::Color),
            (PropType::Choice(choices), Value::Str(s)) => {
                if choices.contains(&s.as_str()) {
                    Some(Value::Str(s))
                } else {
                    None
                }
            }
            (PropType::Dict, v @ Value::Dict(_)) => Some(v),
            _ => None,
        }
    }
}
