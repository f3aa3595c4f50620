use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::{
    collision::EdgeMovement,
    components::{Part, ParticleId, UnitId},
    grid::{Direction, GridPos, GridVec},
};

/// Occupancy of one movable unit at the start of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitBody {
    Contracted(GridPos),
    Expanded { head: GridPos, tail: GridPos },
    Rigid(Vec<GridPos>),
}

impl UnitBody {
    fn nodes(&self) -> Vec<GridPos> {
        match self {
            UnitBody::Contracted(pos) => vec![*pos],
            UnitBody::Expanded { head, tail } => vec![*head, *tail],
            UnitBody::Rigid(nodes) => nodes.clone(),
        }
    }

    fn part_at(&self, node: GridPos) -> Part {
        match self {
            UnitBody::Expanded { tail, .. } if *tail == node => Part::Tail,
            _ => Part::Head,
        }
    }
}

/// A unit's action with directions already resolved to the global compass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolvedAction {
    #[default]
    Idle,
    Expand {
        direction: Direction,
    },
    Contract {
        into_head: bool,
    },
    Pull {
        partner: ParticleId,
        into_head: bool,
    },
    Push {
        partner: ParticleId,
        direction: Direction,
    },
}

/// Input to the joint-movement resolver for one unit.
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub id: UnitId,
    pub body: UnitBody,
    pub action: ResolvedAction,
    /// Released bond slots, global directions.
    pub released: HashSet<(Part, Direction)>,
    /// Bonds marked to travel with the head on expansion, global directions.
    pub marked: HashSet<Direction>,
}

impl MoveRequest {
    pub fn idle(id: UnitId, body: UnitBody) -> Self {
        Self {
            id,
            body,
            action: ResolvedAction::Idle,
            released: HashSet::new(),
            marked: HashSet::new(),
        }
    }

    fn retracting(&self) -> Option<GridPos> {
        let into_head = match self.action {
            ResolvedAction::Contract { into_head } => into_head,
            ResolvedAction::Pull { into_head, .. } => into_head,
            _ => return None,
        };
        match &self.body {
            UnitBody::Expanded { head, tail } => Some(if into_head { *tail } else { *head }),
            _ => None,
        }
    }

    fn remaining(&self) -> Option<GridPos> {
        let into_head = match self.action {
            ResolvedAction::Contract { into_head } => into_head,
            ResolvedAction::Pull { into_head, .. } => into_head,
            _ => return None,
        };
        match &self.body {
            UnitBody::Expanded { head, tail } => Some(if into_head { *head } else { *tail }),
            _ => None,
        }
    }

    fn is_particle(&self) -> bool {
        matches!(self.id, UnitId::Particle(_))
    }
}

/// New occupancy of one unit after a committed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPlacement {
    pub id: UnitId,
    pub body: UnitBody,
}

/// Which unit(s) produced an edge movement, for fault attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeProvenance {
    Bond(UnitId, UnitId),
    Interior(UnitId),
}

impl EdgeProvenance {
    pub fn units(&self) -> Vec<UnitId> {
        match self {
            EdgeProvenance::Bond(a, b) => vec![*a, *b],
            EdgeProvenance::Interior(unit) => vec![*unit],
        }
    }
}

/// Output of a successfully resolved movement phase.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Global offset per unit, indexed like the input slice.
    pub offsets: Vec<GridVec>,
    pub placements: Vec<UnitPlacement>,
    /// Every edge movement of the round: one per bond, one per internal
    /// particle edge in motion, one per rigid-object edge.
    pub edges: Vec<EdgeMovement>,
    /// Parallel to `edges`.
    pub provenance: Vec<EdgeProvenance>,
    pub bond_count: usize,
    pub moved_units: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MovementError {
    #[error("{id} is already expanded and cannot expand again")]
    AlreadyExpanded { id: UnitId },
    #[error("{id} is contracted and cannot contract")]
    NotExpanded { id: UnitId },
    #[error("{id} cannot expand into occupied node {target}")]
    ExpansionBlocked { id: UnitId, target: GridPos },
    #[error("handover partner {partner} of {id} is missing or incompatible")]
    InvalidPartner { id: UnitId, partner: ParticleId },
    #[error("handover between {a} and {b} is not mutual")]
    HandoverMismatch { a: UnitId, b: UnitId },
    #[error("bonds force conflicting offsets on {id}: {required} vs {existing}")]
    ConflictingOffsets {
        id: UnitId,
        required: GridVec,
        existing: GridVec,
    },
    #[error("{a} and {b} both claim node {node} after movement")]
    NodeContention { a: UnitId, b: UnitId, node: GridPos },
    #[error("{unreachable} of {total} bonded units cannot be reached from the anchor")]
    Disconnected { unreachable: usize, total: usize },
}

/// How one side of a bond behaves during the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BondSide {
    /// The bond endpoint moves by this vector in the unit's own frame.
    Rigid(GridVec),
    /// The handover bond; it rotates with both moving parts.
    Partner,
}

#[derive(Debug, Clone, Copy)]
struct BondLink {
    a: usize,
    a_node: GridPos,
    b: usize,
    b_node: GridPos,
    a_side: BondSide,
    b_side: BondSide,
}

/// Resolve every unit's staged action into a globally consistent joint
/// movement.
///
/// Bonds are derived fresh from adjacency, filtered by releases, classified
/// by the expansion/contraction/handover rules, and propagated breadth-first
/// from the anchor to assign each unit a global offset. The anchor's
/// non-moving reference part stays fixed in the global frame.
pub fn resolve(units: &[MoveRequest], anchor: usize) -> Result<Resolution, MovementError> {
    debug_assert!(anchor < units.len());

    let mut occupancy: HashMap<GridPos, usize> = HashMap::new();
    let mut particles: HashMap<ParticleId, usize> = HashMap::new();
    for (index, unit) in units.iter().enumerate() {
        for node in unit.body.nodes() {
            let previous = occupancy.insert(node, index);
            debug_assert!(previous.is_none(), "two units occupy {node} before the round");
        }
        if let UnitId::Particle(id) = unit.id {
            particles.insert(id, index);
        }
    }

    validate_actions(units, &occupancy, &particles)?;

    let links = collect_bonds(units, &occupancy);
    let offsets = propagate_offsets(units, &links, anchor)?;
    let placements = place_units(units, &offsets)?;
    let (edges, provenance) = build_edges(units, &links, &offsets);

    let moved_units = units
        .iter()
        .zip(&offsets)
        .filter(|(unit, offset)| !offset.is_zero() || unit.action != ResolvedAction::Idle)
        .count();

    Ok(Resolution {
        offsets,
        placements,
        bond_count: links.len(),
        moved_units,
        edges,
        provenance,
    })
}

fn validate_actions(
    units: &[MoveRequest],
    occupancy: &HashMap<GridPos, usize>,
    particles: &HashMap<ParticleId, usize>,
) -> Result<(), MovementError> {
    for unit in units {
        match unit.action {
            ResolvedAction::Idle => {}
            ResolvedAction::Expand { direction } => {
                let UnitBody::Contracted(pos) = unit.body else {
                    return Err(MovementError::AlreadyExpanded { id: unit.id });
                };
                let target = pos.neighbor(direction);
                if occupancy.contains_key(&target) {
                    return Err(MovementError::ExpansionBlocked {
                        id: unit.id,
                        target,
                    });
                }
            }
            ResolvedAction::Contract { .. } => {
                if !matches!(unit.body, UnitBody::Expanded { .. }) {
                    return Err(MovementError::NotExpanded { id: unit.id });
                }
            }
            ResolvedAction::Pull { partner, .. } => {
                if !matches!(unit.body, UnitBody::Expanded { .. }) {
                    return Err(MovementError::NotExpanded { id: unit.id });
                }
                let partner_unit = particles
                    .get(&partner)
                    .map(|&index| &units[index])
                    .ok_or(MovementError::InvalidPartner {
                        id: unit.id,
                        partner,
                    })?;
                let vacated = unit.retracting().expect("pull implies expanded");
                let mutual = match partner_unit.action {
                    ResolvedAction::Push {
                        partner: named,
                        direction,
                    } => {
                        let UnitBody::Contracted(pos) = partner_unit.body else {
                            return Err(MovementError::InvalidPartner {
                                id: unit.id,
                                partner,
                            });
                        };
                        UnitId::Particle(named) == unit.id && pos.neighbor(direction) == vacated
                    }
                    _ => false,
                };
                if !mutual {
                    return Err(MovementError::HandoverMismatch {
                        a: unit.id,
                        b: partner_unit.id,
                    });
                }
            }
            ResolvedAction::Push { partner, direction } => {
                let UnitBody::Contracted(pos) = unit.body else {
                    return Err(MovementError::AlreadyExpanded { id: unit.id });
                };
                let partner_unit = particles
                    .get(&partner)
                    .map(|&index| &units[index])
                    .ok_or(MovementError::InvalidPartner {
                        id: unit.id,
                        partner,
                    })?;
                let target = pos.neighbor(direction);
                let mutual = match partner_unit.action {
                    ResolvedAction::Pull { partner: named, .. } => {
                        UnitId::Particle(named) == unit.id
                            && partner_unit.retracting() == Some(target)
                    }
                    _ => false,
                };
                if !mutual {
                    return Err(MovementError::HandoverMismatch {
                        a: unit.id,
                        b: partner_unit.id,
                    });
                }
            }
        }
    }
    Ok(())
}

fn is_released(unit: &MoveRequest, node: GridPos, direction: Direction) -> bool {
    unit.released
        .contains(&(unit.body.part_at(node), direction))
}

/// How the bond endpoint on `unit`'s side behaves, given the bond sits at
/// `node` pointing toward `direction`, with `other` on the far side.
fn bond_side(
    unit: &MoveRequest,
    node: GridPos,
    direction: Direction,
    other: &MoveRequest,
) -> BondSide {
    match unit.action {
        ResolvedAction::Idle => BondSide::Rigid(GridVec::ZERO),
        ResolvedAction::Expand { direction: expand } => {
            // The bond along the expansion direction always travels with the
            // head; the bond opposite it never does; marked bonds travel.
            let travels = direction == expand
                || (unit.marked.contains(&direction) && direction != expand.opposite());
            BondSide::Rigid(if travels {
                expand.offset()
            } else {
                GridVec::ZERO
            })
        }
        ResolvedAction::Contract { .. } => {
            let retracting = unit.retracting().expect("contract implies expanded");
            if node == retracting {
                let remaining = unit.remaining().expect("contract implies expanded");
                BondSide::Rigid(remaining - retracting)
            } else {
                BondSide::Rigid(GridVec::ZERO)
            }
        }
        ResolvedAction::Pull { partner, .. } => {
            let retracting = unit.retracting().expect("pull implies expanded");
            if node == retracting && other.id == UnitId::Particle(partner) {
                BondSide::Partner
            } else {
                // Bonds on the vacated node transfer to the pusher's new
                // head in place; everything else stays put.
                BondSide::Rigid(GridVec::ZERO)
            }
        }
        ResolvedAction::Push { partner, direction: push } => {
            if direction == push && other.id == UnitId::Particle(partner) {
                BondSide::Partner
            } else {
                // Marking has no effect on handover bonds; all other bonds
                // stay at the tail.
                BondSide::Rigid(GridVec::ZERO)
            }
        }
    }
}

fn collect_bonds(units: &[MoveRequest], occupancy: &HashMap<GridPos, usize>) -> Vec<BondLink> {
    let mut links = Vec::new();
    for (a, unit) in units.iter().enumerate() {
        for node in unit.body.nodes() {
            for direction in Direction::ALL {
                let far = node.neighbor(direction);
                // Visit each unordered node pair once.
                if far < node {
                    continue;
                }
                let Some(&b) = occupancy.get(&far) else {
                    continue;
                };
                if b == a {
                    continue;
                }
                let other = &units[b];
                if is_released(unit, node, direction)
                    || is_released(other, far, direction.opposite())
                {
                    continue;
                }
                links.push(BondLink {
                    a,
                    a_node: node,
                    b,
                    b_node: far,
                    a_side: bond_side(unit, node, direction, other),
                    b_side: bond_side(other, far, direction.opposite(), unit),
                });
            }
        }
    }
    links
}

fn propagate_offsets(
    units: &[MoveRequest],
    links: &[BondLink],
    anchor: usize,
) -> Result<Vec<GridVec>, MovementError> {
    let mut adjacency: Vec<Vec<(usize, GridVec)>> = vec![Vec::new(); units.len()];
    for link in links {
        let (delta_ab, delta_ba) = match (link.a_side, link.b_side) {
            // offset_a + disp_a == offset_b + disp_b
            (BondSide::Rigid(da), BondSide::Rigid(db)) => (da - db, db - da),
            // The handover bond couples the partners' frames directly.
            _ => (GridVec::ZERO, GridVec::ZERO),
        };
        adjacency[link.a].push((link.b, delta_ab));
        adjacency[link.b].push((link.a, delta_ba));
    }

    let mut offsets: Vec<Option<GridVec>> = vec![None; units.len()];
    offsets[anchor] = Some(GridVec::ZERO);
    let mut queue = VecDeque::from([anchor]);
    while let Some(current) = queue.pop_front() {
        let base = offsets[current].expect("queued units have offsets");
        for &(next, delta) in &adjacency[current] {
            let required = base + delta;
            match offsets[next] {
                None => {
                    offsets[next] = Some(required);
                    queue.push_back(next);
                }
                Some(existing) if existing != required => {
                    return Err(MovementError::ConflictingOffsets {
                        id: units[next].id,
                        required,
                        existing,
                    });
                }
                Some(_) => {}
            }
        }
    }

    let mut bonded: HashSet<usize> = HashSet::new();
    for link in links {
        bonded.insert(link.a);
        bonded.insert(link.b);
    }
    let unreachable = units
        .iter()
        .enumerate()
        .filter(|(index, unit)| {
            offsets[*index].is_none() && (unit.is_particle() || bonded.contains(index))
        })
        .count();
    if unreachable > 0 {
        return Err(MovementError::Disconnected {
            unreachable,
            total: units.len(),
        });
    }

    // Unreached units at this point are unbonded scenery objects.
    Ok(offsets
        .into_iter()
        .map(|offset| offset.unwrap_or(GridVec::ZERO))
        .collect())
}

fn place_units(
    units: &[MoveRequest],
    offsets: &[GridVec],
) -> Result<Vec<UnitPlacement>, MovementError> {
    let mut placements = Vec::with_capacity(units.len());
    for (unit, &offset) in units.iter().zip(offsets) {
        let body = match (&unit.body, unit.action) {
            (UnitBody::Contracted(pos), ResolvedAction::Expand { direction })
            | (UnitBody::Contracted(pos), ResolvedAction::Push { direction, .. }) => {
                UnitBody::Expanded {
                    head: pos.neighbor(direction) + offset,
                    tail: *pos + offset,
                }
            }
            (UnitBody::Expanded { .. }, ResolvedAction::Contract { .. })
            | (UnitBody::Expanded { .. }, ResolvedAction::Pull { .. }) => UnitBody::Contracted(
                unit.remaining().expect("contract implies expanded") + offset,
            ),
            (UnitBody::Contracted(pos), _) => UnitBody::Contracted(*pos + offset),
            (UnitBody::Expanded { head, tail }, _) => UnitBody::Expanded {
                head: *head + offset,
                tail: *tail + offset,
            },
            (UnitBody::Rigid(nodes), _) => {
                UnitBody::Rigid(nodes.iter().map(|&node| node + offset).collect())
            }
        };
        placements.push(UnitPlacement { id: unit.id, body });
    }

    let mut claimed: HashMap<GridPos, UnitId> = HashMap::new();
    for placement in &placements {
        for node in placement.body.nodes() {
            if let Some(first) = claimed.insert(node, placement.id) {
                return Err(MovementError::NodeContention {
                    a: first,
                    b: placement.id,
                    node,
                });
            }
        }
    }
    Ok(placements)
}

fn build_edges(
    units: &[MoveRequest],
    links: &[BondLink],
    offsets: &[GridVec],
) -> (Vec<EdgeMovement>, Vec<EdgeProvenance>) {
    let mut edges = Vec::with_capacity(links.len() + units.len());
    let mut provenance = Vec::with_capacity(links.len() + units.len());

    for link in links {
        let movement = match (link.a_side, link.b_side) {
            (BondSide::Rigid(da), BondSide::Rigid(db)) => {
                let shift = offsets[link.a] + da;
                debug_assert_eq!(shift, offsets[link.b] + db, "bond endpoints must agree");
                EdgeMovement::translated([link.a_node, link.b_node], shift)
            }
            _ => {
                // The handover bond rotates: the puller's endpoint follows
                // the retracting occupant to the remaining part, the
                // pusher's endpoint follows its new head into the vacated
                // node.
                let (pull, pull_index, pull_node, push_node) =
                    if matches!(units[link.a].action, ResolvedAction::Pull { .. }) {
                        (&units[link.a], link.a, link.a_node, link.b_node)
                    } else {
                        (&units[link.b], link.b, link.b_node, link.a_node)
                    };
                let offset = offsets[pull_index];
                let remaining = pull.remaining().expect("pull implies expanded");
                let retracting = pull.retracting().expect("pull implies expanded");
                debug_assert_eq!(pull_node, retracting);
                EdgeMovement::new(
                    [pull_node, push_node],
                    [remaining + offset, retracting + offset],
                )
            }
        };
        edges.push(movement);
        provenance.push(EdgeProvenance::Bond(units[link.a].id, units[link.b].id));
    }

    for (index, unit) in units.iter().enumerate() {
        let offset = offsets[index];
        match (&unit.body, unit.action) {
            (UnitBody::Contracted(pos), ResolvedAction::Expand { direction })
            | (UnitBody::Contracted(pos), ResolvedAction::Push { direction, .. }) => {
                edges.push(EdgeMovement::new(
                    [*pos, *pos],
                    [pos.neighbor(direction) + offset, *pos + offset],
                ));
                provenance.push(EdgeProvenance::Interior(unit.id));
            }
            (UnitBody::Expanded { head, tail }, ResolvedAction::Contract { .. })
            | (UnitBody::Expanded { head, tail }, ResolvedAction::Pull { .. }) => {
                let landing = unit.remaining().expect("contract implies expanded") + offset;
                edges.push(EdgeMovement::new([*head, *tail], [landing, landing]));
                provenance.push(EdgeProvenance::Interior(unit.id));
            }
            (UnitBody::Expanded { head, tail }, _) => {
                edges.push(EdgeMovement::translated([*head, *tail], offset));
                provenance.push(EdgeProvenance::Interior(unit.id));
            }
            (UnitBody::Rigid(nodes), _) => {
                for (i, &a) in nodes.iter().enumerate() {
                    for &b in &nodes[i + 1..] {
                        if a.direction_to(b).is_some() {
                            edges.push(EdgeMovement::translated([a, b], offset));
                            provenance.push(EdgeProvenance::Interior(unit.id));
                        }
                    }
                }
            }
            (UnitBody::Contracted(_), _) => {}
        }
    }

    (edges, provenance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: i32, y: i32) -> GridPos {
        GridPos::new(x, y)
    }

    fn particle(id: u32, body: UnitBody) -> MoveRequest {
        MoveRequest::idle(UnitId::Particle(ParticleId(id)), body)
    }

    fn offsets_of(resolution: &Resolution) -> &[GridVec] {
        &resolution.offsets
    }

    #[test]
    fn expansion_leaves_unmarked_bonds_at_the_tail() {
        let mut expander = particle(0, UnitBody::Contracted(pos(0, 0)));
        expander.action = ResolvedAction::Expand {
            direction: Direction::NorthEast,
        };
        let neighbor = particle(1, UnitBody::Contracted(pos(1, 0)));
        let resolution = resolve(&[expander, neighbor], 0).expect("valid round");

        assert_eq!(offsets_of(&resolution), &[GridVec::ZERO, GridVec::ZERO]);
        // The bond between the two stays exactly where it was.
        let bond = resolution.edges[0];
        assert_eq!(bond.before, bond.after);
        assert_eq!(
            resolution.placements[0].body,
            UnitBody::Expanded {
                head: pos(0, 1),
                tail: pos(0, 0)
            }
        );
        assert_eq!(resolution.placements[1].body, UnitBody::Contracted(pos(1, 0)));
    }

    #[test]
    fn marked_bond_travels_with_the_head() {
        let mut expander = particle(0, UnitBody::Contracted(pos(0, 0)));
        expander.action = ResolvedAction::Expand {
            direction: Direction::NorthEast,
        };
        expander.marked.insert(Direction::East);
        let neighbor = particle(1, UnitBody::Contracted(pos(1, 0)));
        let resolution = resolve(&[expander, neighbor], 0).expect("valid round");

        // The marked neighbor is dragged along the expansion vector.
        assert_eq!(
            offsets_of(&resolution),
            &[GridVec::ZERO, Direction::NorthEast.offset()]
        );
        assert_eq!(resolution.placements[1].body, UnitBody::Contracted(pos(1, 1)));
    }

    #[test]
    fn bond_opposite_the_expansion_never_travels_even_when_marked() {
        let mut expander = particle(0, UnitBody::Contracted(pos(0, 0)));
        expander.action = ResolvedAction::Expand {
            direction: Direction::East,
        };
        expander.marked.insert(Direction::West);
        let neighbor = particle(1, UnitBody::Contracted(pos(-1, 0)));
        let resolution = resolve(&[expander, neighbor], 0).expect("valid round");
        assert_eq!(offsets_of(&resolution), &[GridVec::ZERO, GridVec::ZERO]);
    }

    #[test]
    fn contraction_carries_and_merges_retracting_bonds() {
        // Anchor - expanded middle - trailing neighbor; the middle contracts
        // into its head and drags the trailing neighbor by one step.
        let anchor = particle(0, UnitBody::Contracted(pos(0, 0)));
        let mut middle = particle(
            1,
            UnitBody::Expanded {
                head: pos(1, 0),
                tail: pos(2, 0),
            },
        );
        middle.action = ResolvedAction::Contract { into_head: true };
        let trailing = particle(2, UnitBody::Contracted(pos(3, 0)));

        let resolution = resolve(&[anchor, middle, trailing], 0).expect("valid round");
        assert_eq!(
            offsets_of(&resolution),
            &[GridVec::ZERO, GridVec::ZERO, GridVec::new(-1, 0)]
        );
        assert_eq!(resolution.placements[1].body, UnitBody::Contracted(pos(1, 0)));
        assert_eq!(resolution.placements[2].body, UnitBody::Contracted(pos(2, 0)));
        // Carried bond: (2,0)-(3,0) relocates to (1,0)-(2,0).
        let carried = resolution
            .edges
            .iter()
            .find(|edge| edge.before == [pos(2, 0), pos(3, 0)])
            .expect("carried bond present");
        assert_eq!(carried.after, [pos(1, 0), pos(2, 0)]);
    }

    #[test]
    fn three_bonds_to_one_neighbor_block_contraction() {
        let mut middle = particle(
            0,
            UnitBody::Expanded {
                head: pos(1, 0),
                tail: pos(2, 0),
            },
        );
        middle.action = ResolvedAction::Contract { into_head: true };
        let neighbor = particle(
            1,
            UnitBody::Expanded {
                head: pos(1, 1),
                tail: pos(2, 1),
            },
        );

        let error = resolve(&[middle, neighbor], 0).expect_err("conflicting drag");
        assert!(matches!(error, MovementError::ConflictingOffsets { .. }));
    }

    #[test]
    fn handover_rotates_partner_bond_and_leaves_transfers_in_place() {
        // Puller expanded over (1,0)-(2,0), pusher contracted at (3,0),
        // bystander hanging off the vacated node at (2,-1) via its NE slot.
        let anchor = particle(0, UnitBody::Contracted(pos(0, 0)));
        let mut puller = particle(
            1,
            UnitBody::Expanded {
                head: pos(1, 0),
                tail: pos(2, 0),
            },
        );
        puller.action = ResolvedAction::Pull {
            partner: ParticleId(2),
            into_head: true,
        };
        let mut pusher = particle(2, UnitBody::Contracted(pos(3, 0)));
        pusher.action = ResolvedAction::Push {
            partner: ParticleId(1),
            direction: Direction::West,
        };
        let bystander = particle(3, UnitBody::Contracted(pos(2, -1)));

        let resolution = resolve(&[anchor, puller, pusher, bystander], 0).expect("valid handover");
        assert_eq!(
            offsets_of(&resolution),
            &[GridVec::ZERO; 4],
            "a handover moves no frame"
        );
        assert_eq!(resolution.placements[1].body, UnitBody::Contracted(pos(1, 0)));
        assert_eq!(
            resolution.placements[2].body,
            UnitBody::Expanded {
                head: pos(2, 0),
                tail: pos(3, 0)
            }
        );

        // The partner bond rotates from (2,0)-(3,0) onto (1,0)-(2,0).
        let partner_bond = resolution
            .edges
            .iter()
            .find(|edge| edge.before == [pos(2, 0), pos(3, 0)])
            .expect("partner bond present");
        assert_eq!(partner_bond.after, [pos(1, 0), pos(2, 0)]);

        // The bystander's bond to the vacated node does not move at all.
        let transferred = resolution
            .edges
            .iter()
            .find(|edge| edge.before.contains(&pos(2, -1)))
            .expect("transferred bond present");
        assert_eq!(transferred.before, transferred.after);
    }

    #[test]
    fn marking_has_no_effect_on_handover_bonds() {
        let mut puller = particle(
            0,
            UnitBody::Expanded {
                head: pos(1, 0),
                tail: pos(2, 0),
            },
        );
        puller.action = ResolvedAction::Pull {
            partner: ParticleId(1),
            into_head: true,
        };
        let mut pusher = particle(1, UnitBody::Contracted(pos(3, 0)));
        pusher.action = ResolvedAction::Push {
            partner: ParticleId(0),
            direction: Direction::West,
        };
        pusher.marked.insert(Direction::East);
        let trailing = particle(2, UnitBody::Contracted(pos(4, 0)));

        let resolution = resolve(&[puller, pusher, trailing], 0).expect("valid handover");
        // The trailing neighbor's bond stays at the pusher's tail.
        assert_eq!(resolution.offsets[2], GridVec::ZERO);
        assert_eq!(resolution.placements[2].body, UnitBody::Contracted(pos(4, 0)));
    }

    #[test]
    fn disagreeing_handover_partners_fail() {
        let mut puller = particle(
            0,
            UnitBody::Expanded {
                head: pos(1, 0),
                tail: pos(2, 0),
            },
        );
        puller.action = ResolvedAction::Pull {
            partner: ParticleId(1),
            into_head: true,
        };
        let pusher = particle(1, UnitBody::Contracted(pos(3, 0)));

        let error = resolve(&[puller, pusher], 0).expect_err("no matching push");
        assert!(matches!(error, MovementError::HandoverMismatch { .. }));
    }

    #[test]
    fn expansion_into_an_occupied_node_is_blocked() {
        let mut expander = particle(0, UnitBody::Contracted(pos(0, 0)));
        expander.action = ResolvedAction::Expand {
            direction: Direction::East,
        };
        let blocker = particle(1, UnitBody::Contracted(pos(1, 0)));
        let error = resolve(&[expander, blocker], 0).expect_err("blocked");
        assert_eq!(
            error,
            MovementError::ExpansionBlocked {
                id: UnitId::Particle(ParticleId(0)),
                target: pos(1, 0),
            }
        );
    }

    #[test]
    fn simultaneous_expansion_into_one_node_is_contention() {
        let mut left = particle(0, UnitBody::Contracted(pos(0, 0)));
        left.action = ResolvedAction::Expand {
            direction: Direction::East,
        };
        let mut right = particle(1, UnitBody::Contracted(pos(2, 0)));
        right.action = ResolvedAction::Expand {
            direction: Direction::West,
        };
        // Keep the pair connected underneath the contested node.
        let bridge = MoveRequest::idle(
            UnitId::Object(crate::components::ObjectId(0)),
            UnitBody::Rigid(vec![pos(0, -1), pos(1, -1), pos(2, -1)]),
        );

        let error = resolve(&[left, right, bridge], 0).expect_err("contended node");
        assert!(matches!(
            error,
            MovementError::NodeContention { node, .. } if node == pos(1, 0)
        ));
    }

    #[test]
    fn detached_structure_is_reported_disconnected() {
        let a = particle(0, UnitBody::Contracted(pos(0, 0)));
        let b = particle(1, UnitBody::Contracted(pos(5, 5)));
        let error = resolve(&[a, b], 0).expect_err("no bond path");
        assert_eq!(
            error,
            MovementError::Disconnected {
                unreachable: 1,
                total: 2
            }
        );
    }

    #[test]
    fn released_bonds_do_not_propagate_movement() {
        let anchor = particle(0, UnitBody::Contracted(pos(0, 0)));
        let mut middle = particle(
            1,
            UnitBody::Expanded {
                head: pos(1, 0),
                tail: pos(2, 0),
            },
        );
        middle.action = ResolvedAction::Contract { into_head: true };
        // The retracting tail lets go of everything it would otherwise drag;
        // the trailing neighbor keeps a second path to the anchor below and
        // releases the bond toward the middle as well.
        middle.released.insert((Part::Tail, Direction::SouthWest));
        middle.released.insert((Part::Tail, Direction::SouthEast));
        let mut trailing = particle(2, UnitBody::Contracted(pos(3, 0)));
        trailing
            .released
            .insert((Part::Head, Direction::West));
        let object = MoveRequest::idle(
            UnitId::Object(crate::components::ObjectId(0)),
            UnitBody::Rigid(vec![pos(0, -1), pos(1, -1), pos(2, -1), pos(3, -1)]),
        );

        let resolution = resolve(&[anchor, middle, trailing, object], 0).expect("valid round");
        assert_eq!(resolution.offsets[2], GridVec::ZERO);
        assert_eq!(resolution.placements[2].body, UnitBody::Contracted(pos(3, 0)));
    }

    #[test]
    fn offsets_compose_along_contracting_chains() {
        let anchor = particle(0, UnitBody::Contracted(pos(0, 0)));
        let mut first = particle(
            1,
            UnitBody::Expanded {
                head: pos(1, 0),
                tail: pos(2, 0),
            },
        );
        first.action = ResolvedAction::Contract { into_head: true };
        let mut second = particle(
            2,
            UnitBody::Expanded {
                head: pos(3, 0),
                tail: pos(4, 0),
            },
        );
        second.action = ResolvedAction::Contract { into_head: true };
        let tip = particle(3, UnitBody::Contracted(pos(5, 0)));

        let resolution = resolve(&[anchor, first, second, tip], 0).expect("valid round");
        assert_eq!(resolution.offsets[3], GridVec::new(-2, 0));
        assert_eq!(resolution.placements[3].body, UnitBody::Contracted(pos(3, 0)));
    }
}
