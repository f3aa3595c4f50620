use std::fmt;

use sim_schema::EdgeMovementState;

use crate::{
    components::UnitId,
    grid::{GridPos, GridVec},
};

/// Before/after endpoints of one physical edge during a round's movement.
///
/// Endpoint `i` moves `before[i] -> after[i]`. A whole-edge translation has
/// equal endpoint translation vectors; an expansion or contraction does not.
/// An unmoved edge is the degenerate case `before == after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeMovement {
    pub before: [GridPos; 2],
    pub after: [GridPos; 2],
}

impl EdgeMovement {
    pub fn new(before: [GridPos; 2], after: [GridPos; 2]) -> Self {
        Self { before, after }
    }

    /// Rigid translation of the whole edge by `shift`.
    pub fn translated(before: [GridPos; 2], shift: GridVec) -> Self {
        Self {
            before,
            after: [before[0] + shift, before[1] + shift],
        }
    }

    pub fn translation(&self, endpoint: usize) -> GridVec {
        self.after[endpoint] - self.before[endpoint]
    }

    /// Whether both endpoints share one translation vector.
    pub fn is_translation(&self) -> bool {
        self.translation(0) == self.translation(1)
    }

    /// Edges sharing any before- or after-endpoint belong to the same bond
    /// network at that point and are exempt from collision checking.
    pub fn shares_endpoint(&self, other: &EdgeMovement) -> bool {
        self.before
            .iter()
            .any(|p| other.before.contains(p))
            || self.after.iter().any(|p| other.after.contains(p))
    }

    pub fn to_state(&self) -> EdgeMovementState {
        EdgeMovementState {
            before: [self.before[0].into(), self.before[1].into()],
            after: [self.after[0].into(), self.after[1].into()],
        }
    }
}

impl fmt::Display for EdgeMovement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} -> {}-{}",
            self.before[0], self.before[1], self.after[0], self.after[1]
        )
    }
}

/// Diagnostic payload for a detected collision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionReport {
    pub first: EdgeMovement,
    pub second: EdgeMovement,
    /// Units owning the two edges, deduplicated.
    pub units: Vec<UnitId>,
}

impl fmt::Display for CollisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] against [{}]", self.first, self.second)?;
        if !self.units.is_empty() {
            write!(f, " involving")?;
            for unit in &self.units {
                write!(f, " {unit}")?;
            }
        }
        Ok(())
    }
}

/// Sign of the cross product `(b - a) x (c - a)`.
///
/// The axial-to-cartesian map is linear with positive determinant, so the
/// sign computed on axial coordinates classifies cartesian orientation.
fn orient(a: GridPos, b: GridPos, c: GridPos) -> i64 {
    let abx = (b.x - a.x) as i64;
    let aby = (b.y - a.y) as i64;
    let acx = (c.x - a.x) as i64;
    let acy = (c.y - a.y) as i64;
    abx * acy - aby * acx
}

/// Whether `p`, known collinear with `a`-`b`, lies within the segment's
/// per-axis interval.
fn on_segment(a: GridPos, b: GridPos, p: GridPos) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Exact 2D segment intersection; collinear touching counts as intersecting.
/// Degenerate (zero-length) segments behave as points.
pub fn segments_intersect(p1: GridPos, p2: GridPos, q1: GridPos, q2: GridPos) -> bool {
    let d1 = orient(q1, q2, p1);
    let d2 = orient(q1, q2, p2);
    let d3 = orient(p1, p2, q1);
    let d4 = orient(p1, p2, q2);

    if ((d1 > 0 && d2 < 0) || (d1 < 0 && d2 > 0)) && ((d3 > 0 && d4 < 0) || (d3 < 0 && d4 > 0)) {
        return true;
    }

    (d1 == 0 && on_segment(q1, q2, p1))
        || (d2 == 0 && on_segment(q1, q2, p2))
        || (d3 == 0 && on_segment(p1, p2, q1))
        || (d4 == 0 && on_segment(p1, p2, q2))
}

/// Decide whether two edge movements, executed simultaneously, intersect.
///
/// Symmetric in its arguments: translation pairs sweep both edges'
/// endpoints, mixed pairs are ordered by classification, and
/// deformation pairs evaluate both anchorings.
pub fn edges_collide(a: &EdgeMovement, b: &EdgeMovement) -> bool {
    if a.shares_endpoint(b) {
        return false;
    }
    match (a.is_translation(), b.is_translation()) {
        (true, true) => translation_translation(a, b),
        (true, false) => translation_deformation(a, b),
        (false, true) => translation_deformation(b, a),
        (false, false) => deformation_deformation(a, b) || deformation_deformation(b, a),
    }
}

fn sweep_hits(points: [GridPos; 2], shift: GridVec, seg: [GridPos; 2]) -> bool {
    points
        .into_iter()
        .any(|p| segments_intersect(p, p + shift, seg[0], seg[1]))
}

/// Both edges translate rigidly: work in `a`'s frame. A zero relative
/// vector cannot create a new contact. Sweeping the endpoints of each edge
/// against the other held static covers the case of a short edge passing
/// strictly through the interior of a long swept band.
fn translation_translation(a: &EdgeMovement, b: &EdgeMovement) -> bool {
    let rel = b.translation(0) - a.translation(0);
    if rel.is_zero() {
        return false;
    }
    sweep_hits(b.before, rel, a.before) || sweep_hits(a.before, -rel, b.before)
}

/// One edge translates (`t`), the other expands or contracts (`m`): the
/// translating edge is the static reference frame.
fn translation_deformation(t: &EdgeMovement, m: &EdgeMovement) -> bool {
    let shift = t.translation(0);
    (0..2).any(|i| {
        segments_intersect(
            m.before[i],
            m.after[i] - shift,
            t.before[0],
            t.before[1],
        )
    })
}

/// Both edges expand or contract: anchor at `a`'s start endpoint against the
/// fully-expanded virtual segment, then confirm at the end endpoint with the
/// reversed virtual segment. Both anchorings must intersect; a single
/// degenerate anchoring is not a collision.
fn deformation_deformation(a: &EdgeMovement, b: &EdgeMovement) -> bool {
    let t0 = a.translation(0);
    let virt_start = a.before[0];
    let virt_end = a.after[1] - t0;
    let hit_at_start = (0..2).any(|i| {
        segments_intersect(b.before[i], b.after[i] - t0, virt_start, virt_end)
    });
    if !hit_at_start {
        return false;
    }

    let t1 = a.translation(1);
    let virt_start = a.before[1];
    let virt_end = a.after[0] - t1;
    (0..2).any(|i| segments_intersect(b.before[i], b.after[i] - t1, virt_start, virt_end))
}
