//! Bounce collision engine
//!
//! Each tick runs one full detection pass over every moving model with
//! registered bounce partners, collecting collisions into a map keyed by the
//! unordered participant pair. Only after detection completes does
//! resolution run, so resolving one pair can never change the edge or axis
//! decision of another pair found in the same tick.
//!
//! The bounce itself is not physical restitution: the moving model backs up
//! by half a tick of displacement and the flagged velocity components
//! negate.

use decker_core::{convex_overlap, Rect, Value, Vec2};
use decker_model::{BounceMode, ModelId, Scene};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::debug;

/// An edge of a model's rectangle, named in card space (y-up: `Top` is the
/// greater-y side)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Top, Edge::Bottom, Edge::Left, Edge::Right];

    pub fn opposite(self) -> Edge {
        match self {
            Edge::Top => Edge::Bottom,
            Edge::Bottom => Edge::Top,
            Edge::Left => Edge::Right,
            Edge::Right => Edge::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Edge::Top => "Top",
            Edge::Bottom => "Bottom",
            Edge::Left => "Left",
            Edge::Right => "Right",
        }
    }
}

/// Which velocity axes a collision flips for one participant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BounceAxes {
    pub horizontal: bool,
    pub vertical: bool,
}

impl BounceAxes {
    pub fn any(self) -> bool {
        self.horizontal || self.vertical
    }
}

/// One resolved detection: `a` is the moving model whose scan found the
/// contact, `b` its partner
#[derive(Debug, Clone)]
pub struct Collision {
    pub a: ModelId,
    pub b: ModelId,
    pub self_axes: BounceAxes,
    pub other_axes: BounceAxes,
    /// Touched edges of `b`, in Top/Bottom/Left/Right order
    pub edges: SmallVec<[Edge; 4]>,
    /// `a`'s containment mode for `b` at detection time
    pub mode: BounceMode,
}

/// A bounce handler invocation owed to one participant
#[derive(Debug, Clone, PartialEq)]
pub struct BounceEvent {
    /// The model whose `on_bounce` runs
    pub target: ModelId,
    /// The partner it bounced against
    pub other: ModelId,
    /// Contact edge, named in the target's own frame
    pub edge: Edge,
}

/// Maps a touched side of a rotated model to the edge names it reports.
/// Eight 45-degree buckets centered on the axis directions; angles exactly
/// on a 22.5-degree boundary truncate into the lower bucket.
fn rot_edges(rot: f64) -> &'static [Edge] {
    const MAP: [&[Edge]; 8] = [
        &[Edge::Top],
        &[Edge::Top, Edge::Right],
        &[Edge::Right],
        &[Edge::Bottom, Edge::Right],
        &[Edge::Bottom],
        &[Edge::Bottom, Edge::Left],
        &[Edge::Left],
        &[Edge::Top, Edge::Left],
    ];
    let i = ((rot + 22.5).rem_euclid(360.0) / 45.0) as usize;
    MAP[i.min(7)]
}

/// Distance edge strips are pulled back from the corners, so two touching
/// objects don't always register a corner hit
const CORNER_SETBACK: f64 = 4.0;

/// The touched edges of `b`, tested against `a`'s hit region with b's edge
/// strips transformed through its rotation. `skip_touch_check` is set for
/// In-mode scans where overlap is implied by containment.
pub fn touching_edges(
    scene: &Scene,
    a: ModelId,
    b: ModelId,
    skip_touch_check: bool,
) -> SmallVec<[Edge; 4]> {
    let mut edges: SmallVec<[Edge; 4]> = SmallVec::new();
    if !skip_touch_check && !scene.models_touch(a, b) {
        return edges;
    }
    let Some(region) = scene.hit_region(a) else {
        return edges;
    };
    let Some(b_model) = scene.model(b) else {
        return edges;
    };
    let size = b_model.size();
    let rot = b_model.rotation().unwrap_or(0.0);
    let aff = scene.affine_to_card(b);

    let strips = [
        // (local strip, side angle offset from "top")
        (
            Rect::new(
                CORNER_SETBACK,
                size.height - 1.0,
                size.width - 2.0 * CORNER_SETBACK,
                1.0,
            ),
            0.0,
        ),
        (
            Rect::new(CORNER_SETBACK, 0.0, size.width - 2.0 * CORNER_SETBACK, 1.0),
            180.0,
        ),
        (
            Rect::new(0.0, CORNER_SETBACK, 1.0, size.height - 2.0 * CORNER_SETBACK),
            270.0,
        ),
        (
            Rect::new(
                size.width - 1.0,
                CORNER_SETBACK,
                1.0,
                size.height - 2.0 * CORNER_SETBACK,
            ),
            90.0,
        ),
    ];

    let mut touched: FxHashSet<Edge> = FxHashSet::default();
    for (strip, angle) in strips {
        let quad = aff.transform_quad(strip.corners());
        if convex_overlap(&region, &quad) {
            touched.extend(rot_edges(rot + angle));
        }
    }

    // A three-edge contact spanning both sides of an axis is a sweep across
    // the middle, not a real opposed hit
    if touched.len() == 3 && touched.contains(&Edge::Top) && touched.contains(&Edge::Bottom) {
        touched.remove(&Edge::Top);
        touched.remove(&Edge::Bottom);
    }
    if touched.len() == 3 && touched.contains(&Edge::Left) && touched.contains(&Edge::Right) {
        touched.remove(&Edge::Left);
        touched.remove(&Edge::Right);
    }

    for e in Edge::ALL {
        if touched.contains(&e) {
            edges.push(e);
        }
    }
    edges
}

/// One full detection pass over the live models under `card`.
///
/// Prunes torn-down partners lazily, establishes containment baselines on
/// first observation, and gates edge contacts on relative motion and
/// velocity direction so resting contact doesn't retrigger. Collisions are
/// keyed by the unordered pair (normalized by object name), so A-B and B-A
/// scans produce a single entry.
pub fn detect(scene: &mut Scene, card: ModelId) -> Vec<Collision> {
    let mut collisions: Vec<Collision> = Vec::new();
    let mut seen_pairs: FxHashSet<(ModelId, ModelId)> = FxHashSet::default();

    for a in scene.descendants(card) {
        find_collisions_for(scene, a, &mut seen_pairs, &mut collisions);
    }
    collisions
}

fn find_collisions_for(
    scene: &mut Scene,
    a: ModelId,
    seen_pairs: &mut FxHashSet<(ModelId, ModelId)>,
    collisions: &mut Vec<Collision>,
) {
    let Some(a_model) = scene.model(a) else {
        return;
    };
    if a_model.is_torn_down() || !a_model.visible_flag() {
        return;
    }
    let a_speed = a_model.speed();
    if a_speed.is_zero() || a_model.bounce.is_empty() {
        return;
    }
    let partners: Vec<ModelId> = a_model.bounce.keys().copied().collect();
    let a_name = a_model.name().to_string();

    let mut prune: SmallVec<[ModelId; 2]> = SmallVec::new();
    for b in partners {
        let Some(b_model) = scene.model(b) else {
            prune.push(b);
            continue;
        };
        if b_model.is_torn_down() {
            prune.push(b);
            continue;
        }
        if !b_model.visible_flag() {
            continue;
        }
        let b_name = b_model.name().to_string();
        let b_speed = b_model.speed();

        let (Some(sc), Some(oc)) = (scene.abs_center(a), scene.abs_center(b)) else {
            continue;
        };
        let new_dist = sc.abs_diff(oc);

        let Some(state) = scene.model(a).and_then(|m| m.bounce.get(&b).copied()) else {
            continue;
        };
        if state.mode == BounceMode::Unknown {
            // First observation establishes the containment baseline;
            // no bounce this tick
            let mode = if scene.contains_point(b, sc) {
                BounceMode::Inside
            } else {
                BounceMode::Outside
            };
            if let Some(m) = scene.model_mut(a) {
                if let Some(s) = m.bounce.get_mut(&b) {
                    s.mode = mode;
                    s.last_dist = new_dist;
                }
            }
            continue;
        }

        let mode = state.mode;
        let last_dist = state.last_dist;
        let mut edges = touching_edges(scene, a, b, mode == BounceMode::Inside);
        if mode == BounceMode::Inside && edges.is_empty() && !scene.contains_point(b, sc) {
            // Escaped the enclosing object entirely (e.g. a fast mover
            // skipping the edge strips in one tick); synthesize the edges it
            // left through from the center relationship
            if sc.x < oc.x {
                edges.push(Edge::Left);
            }
            if sc.x > oc.x {
                edges.push(Edge::Right);
            }
            if sc.y < oc.y {
                edges.push(Edge::Bottom);
            }
            if sc.y > oc.y {
                edges.push(Edge::Top);
            }
        }

        if !edges.is_empty() {
            let mut self_axes = BounceAxes::default();
            let mut other_axes = BounceAxes::default();
            let horizontal_hit = edges.contains(&Edge::Left) || edges.contains(&Edge::Right);
            let vertical_hit = edges.contains(&Edge::Top) || edges.contains(&Edge::Bottom);

            match mode {
                BounceMode::Inside => {
                    // Bounce off the enclosing object's wall, only while
                    // still moving toward it (distance from center growing)
                    if horizontal_hit && new_dist.x > last_dist.x {
                        self_axes.horizontal = (a_speed.x > 0.0 && oc.x < sc.x)
                            || (a_speed.x < 0.0 && oc.x > sc.x);
                        other_axes.horizontal = (b_speed.x > 0.0 && sc.x < oc.x)
                            || (b_speed.x < 0.0 && sc.x > oc.x);
                    }
                    if vertical_hit && new_dist.y > last_dist.y {
                        self_axes.vertical = (a_speed.y > 0.0 && oc.y < sc.y)
                            || (a_speed.y < 0.0 && oc.y > sc.y);
                        other_axes.vertical = (b_speed.y > 0.0 && sc.y < oc.y)
                            || (b_speed.y < 0.0 && sc.y > oc.y);
                    }
                }
                BounceMode::Outside => {
                    // Bounce off the partner's outside wall, only while the
                    // two are still approaching
                    if horizontal_hit && new_dist.x < last_dist.x {
                        self_axes.horizontal = (a_speed.x > 0.0 && oc.x > sc.x)
                            || (a_speed.x < 0.0 && oc.x < sc.x);
                        other_axes.horizontal = (b_speed.x > 0.0 && sc.x > oc.x)
                            || (b_speed.x < 0.0 && sc.x < oc.x);
                    }
                    if vertical_hit && new_dist.y < last_dist.y {
                        self_axes.vertical = (a_speed.y > 0.0 && oc.y > sc.y)
                            || (a_speed.y < 0.0 && oc.y < sc.y);
                        other_axes.vertical = (b_speed.y > 0.0 && sc.y > oc.y)
                            || (b_speed.y < 0.0 && sc.y < oc.y);
                    }
                }
                BounceMode::Unknown => unreachable!("baseline handled above"),
            }

            if self_axes.any() || other_axes.any() {
                let key = if a_name <= b_name { (a, b) } else { (b, a) };
                if seen_pairs.insert(key) {
                    collisions.push(Collision {
                        a,
                        b,
                        self_axes,
                        other_axes,
                        edges,
                        mode,
                    });
                }
            }
        }

        if let Some(m) = scene.model_mut(a) {
            if let Some(s) = m.bounce.get_mut(&b) {
                s.last_dist = new_dist;
            }
        }
    }

    if !prune.is_empty() {
        debug!(model = %a_name, count = prune.len(), "pruning dead bounce partners");
        if let Some(m) = scene.model_mut(a) {
            for b in prune {
                m.bounce.remove(&b);
            }
        }
    }
}

/// Resolve one collision: back the mover out of overlap, negate the flagged
/// velocity components on each side that registered the other, and emit one
/// handler event per touched edge per registered side.
///
/// Edge names are normalized to each receiver's frame: the moving side sees
/// mirrored names for an outside contact (it hit with its own opposite
/// edge), while the partner's own edges were the ones touched, so its names
/// pass through unmirrored. Inside contacts mirror for neither.
pub fn perform_bounce(scene: &mut Scene, collision: &Collision, dt: f64) -> Vec<BounceEvent> {
    let Collision {
        a,
        b,
        self_axes,
        other_axes,
        edges,
        mode,
    } = collision;
    let (a, b) = (*a, *b);

    let a_registers_b = scene.model(a).map(|m| m.bounce.contains_key(&b)) == Some(true);
    let b_registers_a = scene.model(b).map(|m| m.bounce.contains_key(&a)) == Some(true);
    let inside = *mode == BounceMode::Inside;

    // Back up along the pre-bounce velocity by half a tick to pull the
    // mover out of overlap
    if let Some(m) = scene.model(a) {
        let speed = m.speed();
        let pos = m.position();
        scene.set_property(a, "position", Value::Point(pos - speed * (dt / 2.0)));
    }

    if a_registers_b {
        let mut speed = scene.model(a).map(|m| m.speed()).unwrap_or(Vec2::ZERO);
        if self_axes.horizontal {
            speed.x = -speed.x;
        }
        if self_axes.vertical {
            speed.y = -speed.y;
        }
        scene.set_property(a, "speed", Value::Point(speed));
    }
    if b_registers_a {
        let mut speed = scene.model(b).map(|m| m.speed()).unwrap_or(Vec2::ZERO);
        if other_axes.horizontal {
            speed.x = -speed.x;
        }
        if other_axes.vertical {
            speed.y = -speed.y;
        }
        scene.set_property(b, "speed", Value::Point(speed));
    }

    // A corner hit reports once per touched edge
    let mut events = Vec::new();
    if a_registers_b {
        for edge in edges {
            events.push(BounceEvent {
                target: a,
                other: b,
                edge: if inside { *edge } else { edge.opposite() },
            });
        }
    }
    if b_registers_a {
        for edge in edges {
            events.push(BounceEvent {
                target: b,
                other: a,
                edge: *edge,
            });
        }
    }
    events
}
