//! Model nodes
//!
//! A [`Model`] is one node of the scene tree: a typed kind, an ordered
//! property table with declared types, named event-handler bodies, child
//! links, per-property animation queues, and the bounce-partner registry the
//! collision engine reads. Models never own their relatives directly — the
//! arena in [`crate::scene`] holds every node and links them by id.

use std::collections::VecDeque;
use std::sync::OnceLock;

use decker_core::{Color, PropType, Size, Value, Vec2};
use indexmap::IndexMap;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::anim::{AnimProp, AnimationDescriptor};
use crate::scene::ModelId;

/// Event-handler names
pub mod handlers {
    pub const ON_SETUP: &str = "on_setup";
    pub const ON_CLICK: &str = "on_click";
    pub const ON_MOUSE_ENTER: &str = "on_mouse_enter";
    pub const ON_MOUSE_DOWN: &str = "on_mouse_down";
    pub const ON_MOUSE_MOVE: &str = "on_mouse_move";
    pub const ON_MOUSE_UP: &str = "on_mouse_up";
    pub const ON_MOUSE_EXIT: &str = "on_mouse_exit";
    pub const ON_BOUNCE: &str = "on_bounce";
    pub const ON_MESSAGE: &str = "on_message";
    pub const ON_PERIODIC: &str = "on_periodic";
    pub const ON_TEXT_ENTER: &str = "on_text_enter";
    pub const ON_TEXT_CHANGED: &str = "on_text_changed";
    pub const ON_DONE_LOADING: &str = "on_done_loading";
    pub const ON_SHOW_CARD: &str = "on_show_card";
    pub const ON_HIDE_CARD: &str = "on_hide_card";
    pub const ON_KEY_DOWN: &str = "on_key_down";
    pub const ON_KEY_UP: &str = "on_key_up";
    pub const ON_KEY_HOLD: &str = "on_key_hold";
    pub const ON_RESIZE: &str = "on_resize";
    pub const ON_EXIT_STACK: &str = "on_exit_stack";
}

const ALIGNMENT_CHOICES: &[&str] = &["Left", "Center", "Right"];
const FONT_CHOICES: &[&str] = &["Default", "Serif", "Sans-Serif", "Mono"];
const FIT_CHOICES: &[&str] = &["Center", "Stretch", "Contain", "Fill"];

/// The kind of a scene-tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Stack,
    Card,
    Group,
    Button,
    TextField,
    TextLabel,
    Image,
    WebView,
    Shape,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Stack => "stack",
            ModelKind::Card => "card",
            ModelKind::Group => "group",
            ModelKind::Button => "button",
            ModelKind::TextField => "textfield",
            ModelKind::TextLabel => "textlabel",
            ModelKind::Image => "image",
            ModelKind::WebView => "webview",
            ModelKind::Shape => "shape",
        }
    }

    pub fn from_str(s: &str) -> Option<ModelKind> {
        Some(match s {
            "stack" => ModelKind::Stack,
            "card" => ModelKind::Card,
            "group" => ModelKind::Group,
            "button" => ModelKind::Button,
            "textfield" | "field" => ModelKind::TextField,
            "textlabel" | "label" => ModelKind::TextLabel,
            "image" => ModelKind::Image,
            "webview" => ModelKind::WebView,
            "shape" => ModelKind::Shape,
            _ => return None,
        })
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Stack => "Stack",
            ModelKind::Card => "Card",
            ModelKind::Group => "Group",
            ModelKind::Button => "Button",
            ModelKind::TextField => "TextField",
            ModelKind::TextLabel => "TextLabel",
            ModelKind::Image => "Image",
            ModelKind::WebView => "WebView",
            ModelKind::Shape => "Shape",
        }
    }

    /// True for the two container kinds that root a coordinate space
    pub fn is_card_or_stack(&self) -> bool {
        matches!(self, ModelKind::Card | ModelKind::Stack)
    }

    pub fn can_rotate(&self) -> bool {
        matches!(
            self,
            ModelKind::Group | ModelKind::TextLabel | ModelKind::Image | ModelKind::Shape
        )
    }

    /// Smallest size a resize can produce for this kind
    pub fn min_size(&self) -> Size {
        match self {
            ModelKind::Stack | ModelKind::Card => Size::new(200.0, 200.0),
            ModelKind::Shape => Size::new(2.0, 2.0),
            _ => Size::new(20.0, 20.0),
        }
    }

    /// Prefix used when generating a fresh object name
    pub fn name_base(&self) -> &'static str {
        match self {
            ModelKind::Stack => "stack",
            ModelKind::Card => "card",
            ModelKind::Group => "group",
            ModelKind::Button => "button",
            ModelKind::TextField => "field",
            ModelKind::TextLabel => "label",
            ModelKind::Image => "image",
            ModelKind::WebView => "webview",
            ModelKind::Shape => "shape",
        }
    }

    fn property_type(&self, key: &str) -> Option<PropType> {
        // Shared keys first, then kind-specific ones
        let shared = match key {
            "name" => Some(PropType::Str),
            "position" => Some(PropType::FloatPoint),
            "center" => Some(PropType::FloatPoint),
            "size" => Some(PropType::Size),
            "speed" => Some(PropType::Point),
            "visible" => Some(PropType::Bool),
            "data" => Some(PropType::Dict),
            "rotation" if self.can_rotate() => Some(PropType::Real),
            _ => None,
        };
        if shared.is_some() {
            return shared;
        }
        match (self, key) {
            (ModelKind::Button, "title") => Some(PropType::Str),
            (ModelKind::TextField | ModelKind::TextLabel, "text") => Some(PropType::Str),
            (ModelKind::TextField | ModelKind::TextLabel, "alignment") => {
                Some(PropType::Choice(ALIGNMENT_CHOICES))
            }
            (ModelKind::TextField | ModelKind::TextLabel, "font") => {
                Some(PropType::Choice(FONT_CHOICES))
            }
            (ModelKind::TextField | ModelKind::TextLabel, "font_size") => Some(PropType::UInt),
            (ModelKind::TextField | ModelKind::TextLabel, "text_color") => Some(PropType::Color),
            (ModelKind::TextField, "editable") => Some(PropType::Bool),
            (ModelKind::Image, "file") => Some(PropType::Str),
            (ModelKind::Image, "fit") => Some(PropType::Choice(FIT_CHOICES)),
            (ModelKind::WebView, "url") => Some(PropType::Str),
            (ModelKind::Shape, "pen_color") => Some(PropType::Color),
            (ModelKind::Shape, "pen_thickness") => Some(PropType::UInt),
            (ModelKind::Shape, "fill_color") => Some(PropType::Color),
            (ModelKind::Card, "fill_color") => Some(PropType::Color),
            _ => None,
        }
    }

    fn default_properties(&self) -> IndexMap<String, Value> {
        let mut props = IndexMap::new();
        props.insert("name".into(), Value::from(""));
        props.insert("position".into(), Value::Point(Vec2::ZERO));
        props.insert("size".into(), Value::Size(self.min_size()));
        props.insert("speed".into(), Value::Point(Vec2::ZERO));
        props.insert("visible".into(), Value::Bool(true));
        if self.can_rotate() {
            props.insert("rotation".into(), Value::Real(0.0));
        }
        match self {
            ModelKind::Button => {
                props.insert("title".into(), Value::from("Button"));
            }
            ModelKind::TextField | ModelKind::TextLabel => {
                props.insert("text".into(), Value::from("Text"));
                props.insert("alignment".into(), Value::from("Left"));
                props.insert("font".into(), Value::from("Default"));
                props.insert("font_size".into(), Value::UInt(18));
                props.insert("text_color".into(), Value::Color(Color::BLACK));
                if *self == ModelKind::TextField {
                    props.insert("editable".into(), Value::Bool(true));
                }
            }
            ModelKind::Image => {
                props.insert("file".into(), Value::from(""));
                props.insert("fit".into(), Value::from("Contain"));
            }
            ModelKind::WebView => {
                props.insert("url".into(), Value::from(""));
            }
            ModelKind::Shape => {
                props.insert("pen_color".into(), Value::Color(Color::BLACK));
                props.insert("pen_thickness".into(), Value::UInt(2));
                props.insert("fill_color".into(), Value::Color(Color::WHITE));
            }
            ModelKind::Card => {
                props.insert("fill_color".into(), Value::Color(Color::WHITE));
                props.insert("size".into(), Value::Size(Size::new(500.0, 500.0)));
            }
            ModelKind::Stack => {
                props.insert("size".into(), Value::Size(Size::new(500.0, 500.0)));
            }
            _ => {}
        }
        props.insert("data".into(), Value::Dict(serde_json::Map::new()));
        props
    }

    fn default_handlers(&self) -> IndexMap<String, String> {
        use handlers::*;
        let mut map = IndexMap::new();
        // Kind-specific handlers lead so they show first in the editor
        let specific: &[&str] = match self {
            ModelKind::Button => &[ON_CLICK],
            ModelKind::TextField => &[ON_TEXT_ENTER, ON_TEXT_CHANGED],
            ModelKind::WebView => &[ON_DONE_LOADING],
            ModelKind::Card => &[
                ON_SHOW_CARD,
                ON_HIDE_CARD,
                ON_KEY_DOWN,
                ON_KEY_UP,
                ON_KEY_HOLD,
                ON_RESIZE,
            ],
            ModelKind::Stack => &[ON_EXIT_STACK],
            _ => &[],
        };
        for h in specific {
            map.insert((*h).into(), String::new());
        }
        for h in [
            ON_SETUP,
            ON_MOUSE_ENTER,
            ON_MOUSE_DOWN,
            ON_MOUSE_MOVE,
            ON_MOUSE_UP,
            ON_MOUSE_EXIT,
            ON_BOUNCE,
            ON_MESSAGE,
            ON_PERIODIC,
        ] {
            map.insert(h.into(), String::new());
        }
        map
    }
}

/// Containment relationship of a model and one of its bounce partners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BounceMode {
    /// First observation not made yet
    #[default]
    Unknown,
    /// This model's center was inside the partner's hit region
    Inside,
    /// This model's center was outside the partner's hit region
    Outside,
}

/// Per-partner state the collision engine carries tick to tick
#[derive(Debug, Clone, Copy, Default)]
pub struct BounceState {
    pub mode: BounceMode,
    /// Component-wise |distance| between absolute centers at the last tick
    pub last_dist: Vec2,
}

/// Result of a property set
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    /// Value stored; carries the previous value so callers can build an
    /// inverse for undo
    Changed(Value),
    /// Coerced value equals the current one
    Unchanged,
    /// Value failed validation and was dropped. `notify` is true when
    /// observers should still refresh (rejected rename)
    Rejected { notify: bool },
}

fn name_strip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\W+").unwrap())
}

fn name_pattern_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z_0-9]*$").unwrap())
}

/// One node of the scene tree
#[derive(Debug, Clone)]
pub struct Model {
    kind: ModelKind,
    properties: IndexMap<String, Value>,
    handlers: IndexMap<String, String>,
    pub(crate) parent: Option<ModelId>,
    pub(crate) children: Vec<ModelId>,
    /// Animation queues, keyed by animated property; only the queue head runs
    pub animations: FxHashMap<AnimProp, VecDeque<AnimationDescriptor>>,
    /// Registered bounce partners and their last observed state
    pub bounce: FxHashMap<ModelId, BounceState>,
    pub(crate) is_dirty: bool,
    torn_down: bool,
}

impl Model {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            properties: kind.default_properties(),
            handlers: kind.default_handlers(),
            parent: None,
            children: Vec::new(),
            animations: FxHashMap::default(),
            bounce: FxHashMap::default(),
            is_dirty: false,
            torn_down: false,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        self.properties
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn parent(&self) -> Option<ModelId> {
        self.parent
    }

    pub fn children(&self) -> &[ModelId] {
        &self.children
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Tear down this node: clear animation and bounce state and set the
    /// tombstone. The scene drives recursion and detachment.
    pub(crate) fn tear_down(&mut self) {
        self.torn_down = true;
        self.animations.clear();
        self.bounce.clear();
    }

    pub(crate) fn revive(&mut self) {
        self.torn_down = false;
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Ordered property table (insertion order = inspector order)
    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub fn property_type(&self, key: &str) -> Option<PropType> {
        self.kind.property_type(key)
    }

    pub fn position(&self) -> Vec2 {
        self.property("position")
            .and_then(Value::as_point)
            .unwrap_or(Vec2::ZERO)
    }

    pub fn size(&self) -> Size {
        self.property("size")
            .and_then(Value::as_size)
            .unwrap_or_default()
    }

    pub fn speed(&self) -> Vec2 {
        self.property("speed")
            .and_then(Value::as_point)
            .unwrap_or(Vec2::ZERO)
    }

    /// `None` for kinds that do not rotate
    pub fn rotation(&self) -> Option<f64> {
        if !self.kind.can_rotate() {
            return None;
        }
        self.property("rotation").and_then(Value::as_real)
    }

    pub fn visible_flag(&self) -> bool {
        self.property("visible")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Validate, coerce and store a property value.
    ///
    /// Mutation after teardown is a silent no-op. Rejected values leave the
    /// stored one untouched; a rejected rename still asks for notification so
    /// observers can refresh from the unchanged value.
    pub fn set_property(&mut self, key: &str, value: Value) -> SetOutcome {
        if self.torn_down {
            return SetOutcome::Unchanged;
        }
        if key == "center" {
            // Computed pseudo-property; the scene resolves it to a position
            return SetOutcome::Rejected { notify: false };
        }
        let Some(prop_type) = self.kind.property_type(key) else {
            return SetOutcome::Rejected { notify: false };
        };
        let Some(mut value) = prop_type.coerce(value) else {
            return SetOutcome::Rejected { notify: false };
        };

        match key {
            "name" => {
                let Value::Str(raw) = &value else {
                    return SetOutcome::Rejected { notify: false };
                };
                let stripped = name_strip_re().replace_all(raw, "").into_owned();
                if !name_pattern_re().is_match(&stripped) {
                    return SetOutcome::Rejected { notify: true };
                }
                value = Value::Str(stripped);
            }
            "size" => {
                let min = self.kind.min_size();
                if let Value::Size(s) = &mut value {
                    s.width = s.width.max(min.width);
                    s.height = s.height.max(min.height);
                }
            }
            "rotation" => {
                if let Value::Real(r) = &mut value {
                    *r = r.rem_euclid(360.0);
                }
            }
            _ => {}
        }

        match self.properties.get(key) {
            Some(current) if *current == value => SetOutcome::Unchanged,
            Some(_) | None => {
                let previous = self
                    .properties
                    .insert(key.to_string(), value.clone())
                    .unwrap_or(value);
                self.is_dirty = true;
                SetOutcome::Changed(previous)
            }
        }
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    /// Handler body, or `None` when the event does not exist for this kind.
    /// An empty body means "no handler".
    pub fn handler(&self, name: &str) -> Option<&str> {
        self.handlers.get(name).map(String::as_str)
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.get(name).is_some_and(|h| !h.trim().is_empty())
    }

    pub fn handlers(&self) -> &IndexMap<String, String> {
        &self.handlers
    }

    /// Replace a handler body. Returns false when this kind has no such
    /// event; loading from data may still add new keys via
    /// [`Model::insert_handler`].
    pub fn set_handler(&mut self, name: &str, body: impl Into<String>) -> bool {
        match self.handlers.get_mut(name) {
            Some(slot) => {
                let body = body.into();
                if *slot != body {
                    *slot = body;
                    self.is_dirty = true;
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn insert_handler(&mut self, name: String, body: String) {
        self.handlers.insert(name, body);
    }

    // ------------------------------------------------------------------
    // Bounce registry
    // ------------------------------------------------------------------

    /// Replace the set of bounce partners, resetting all observation state
    pub fn set_bounce_partners(&mut self, partners: impl IntoIterator<Item = ModelId>) {
        if self.torn_down {
            return;
        }
        self.bounce = partners
            .into_iter()
            .map(|id| (id, BounceState::default()))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_per_kind() {
        let button = Model::new(ModelKind::Button);
        assert_eq!(button.property("title"), Some(&Value::from("Button")));
        assert!(button.rotation().is_none());
        assert!(button.handler(handlers::ON_CLICK).is_some());

        let image = Model::new(ModelKind::Image);
        assert_eq!(image.rotation(), Some(0.0));
        assert!(image.handler(handlers::ON_CLICK).is_none());
    }

    #[test]
    fn test_rejected_rename_keeps_value_but_notifies() {
        let mut m = Model::new(ModelKind::Button);
        assert!(matches!(
            m.set_property("name", Value::from("ball_1")),
            SetOutcome::Changed(_)
        ));
        let outcome = m.set_property("name", Value::from("1bad!name"));
        assert_eq!(outcome, SetOutcome::Rejected { notify: true });
        assert_eq!(m.name(), "ball_1");
    }

    #[test]
    fn test_rename_strips_non_word_characters() {
        let mut m = Model::new(ModelKind::Button);
        m.set_property("name", Value::from("my button!"));
        assert_eq!(m.name(), "mybutton");
    }

    #[test]
    fn test_size_clamps_to_minimum() {
        let mut m = Model::new(ModelKind::Button);
        m.set_property("size", Value::Size(Size::new(5.0, 100.0)));
        assert_eq!(m.size(), Size::new(20.0, 100.0));
    }

    #[test]
    fn test_rotation_wraps() {
        let mut m = Model::new(ModelKind::Image);
        m.set_property("rotation", Value::Real(-90.0));
        assert_eq!(m.rotation(), Some(270.0));
        m.set_property("rotation", Value::Real(720.0));
        assert_eq!(m.rotation(), Some(0.0));
    }

    #[test]
    fn test_rotation_rejected_for_non_rotatable() {
        let mut m = Model::new(ModelKind::Button);
        assert_eq!(
            m.set_property("rotation", Value::Real(45.0)),
            SetOutcome::Rejected { notify: false }
        );
    }

    #[test]
    fn test_unchanged_set_reports_unchanged() {
        let mut m = Model::new(ModelKind::Button);
        m.set_property("position", Value::Point(Vec2::new(10.0, 10.0)));
        assert_eq!(
            m.set_property("position", Value::Point(Vec2::new(10.0, 10.0))),
            SetOutcome::Unchanged
        );
    }

    #[test]
    fn test_mutation_after_teardown_is_noop() {
        let mut m = Model::new(ModelKind::Button);
        m.tear_down();
        assert_eq!(
            m.set_property("title", Value::from("zap")),
            SetOutcome::Unchanged
        );
        assert_eq!(m.property("title"), Some(&Value::from("Button")));
    }

    #[test]
    fn test_choice_rejection_is_silent() {
        let mut m = Model::new(ModelKind::Image);
        assert_eq!(
            m.set_property("fit", Value::from("Sideways")),
            SetOutcome::Rejected { notify: false }
        );
        assert_eq!(m.property("fit"), Some(&Value::from("Contain")));
    }
}
