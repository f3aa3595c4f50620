use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use bevy::prelude::*;
use bitflags::bitflags;

use crate::{
    grid::{Compass, Direction, GridPos, GridVec},
    history::ValueHistory,
    intents::ParticleProgram,
};

/// Identifier of a particle, stable across its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleId(pub u32);

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a rigid environment object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Any movable unit participating in the bond structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitId {
    Particle(ParticleId),
    Object(ObjectId),
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitId::Particle(id) => write!(f, "particle {id}"),
            UnitId::Object(id) => write!(f, "object {id}"),
        }
    }
}

/// Which end of a particle a bond slot or node belongs to. A contracted
/// particle's single node is addressed as `Head`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Part {
    Head,
    Tail,
}

bitflags! {
    /// Per-slot bond state for one of the 12 local bond slots.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BondFlags: u8 {
        /// A neighbor occupies the adjacent node this round.
        const ACTIVE = 1 << 0;
        /// This side released the bond; release by one side removes it.
        const RELEASED = 1 << 1;
        /// Marked to travel with the head on expansion.
        const MARKED = 1 << 2;
    }
}

/// Per-round bond slot table, indexed by global direction.
///
/// Rebuilt from adjacency at the start of every round; release and mark
/// flags are staged during the movement phase and discarded with the table.
#[derive(Debug, Clone, Default)]
pub struct BondTable {
    head: [BondFlags; Direction::COUNT],
    tail: [BondFlags; Direction::COUNT],
}

impl BondTable {
    pub fn clear(&mut self) {
        self.head = Default::default();
        self.tail = Default::default();
    }

    fn slots(&self, part: Part) -> &[BondFlags; Direction::COUNT] {
        match part {
            Part::Head => &self.head,
            Part::Tail => &self.tail,
        }
    }

    fn slots_mut(&mut self, part: Part) -> &mut [BondFlags; Direction::COUNT] {
        match part {
            Part::Head => &mut self.head,
            Part::Tail => &mut self.tail,
        }
    }

    pub fn flags(&self, part: Part, direction: Direction) -> BondFlags {
        self.slots(part)[direction.index() as usize]
    }

    pub fn set_active(&mut self, part: Part, direction: Direction) {
        self.slots_mut(part)[direction.index() as usize] |= BondFlags::ACTIVE;
    }

    pub fn release(&mut self, part: Part, direction: Direction) {
        self.slots_mut(part)[direction.index() as usize] |= BondFlags::RELEASED;
    }

    pub fn mark(&mut self, part: Part, direction: Direction) {
        self.slots_mut(part)[direction.index() as usize] |= BondFlags::MARKED;
    }

    /// Whether an unreleased bond is present at the slot.
    pub fn is_bonded(&self, part: Part, direction: Direction) -> bool {
        let flags = self.flags(part, direction);
        flags.contains(BondFlags::ACTIVE) && !flags.contains(BondFlags::RELEASED)
    }
}

/// An amoebot occupying one (contracted) or two adjacent (expanded) nodes.
///
/// Every round-visible quantity is wrapped in a [`ValueHistory`] so the
/// timeline can be scrubbed without re-simulating.
#[derive(Component, Debug, Clone)]
pub struct Particle {
    pub id: ParticleId,
    pub compass: Compass,
    pub head: ValueHistory<GridPos>,
    pub tail: ValueHistory<GridPos>,
    pub color: ValueHistory<u32>,
    pub heard_beeps: ValueHistory<u16>,
    pub bonds: BondTable,
}

pub const DEFAULT_PARTICLE_COLOR: u32 = 0x8a8a8a;

impl Particle {
    /// Create a contracted particle at `pos`, recorded at `round`.
    pub fn contracted(id: ParticleId, pos: GridPos, compass: Compass, round: u64) -> Self {
        Self {
            id,
            compass,
            head: ValueHistory::new(round, pos),
            tail: ValueHistory::new(round, pos),
            color: ValueHistory::new(round, DEFAULT_PARTICLE_COLOR),
            heard_beeps: ValueHistory::new(round, 0),
            bonds: BondTable::default(),
        }
    }

    /// Create an expanded particle. `head` and `tail` must be adjacent.
    pub fn expanded(
        id: ParticleId,
        head: GridPos,
        tail: GridPos,
        compass: Compass,
        round: u64,
    ) -> Self {
        debug_assert!(tail.direction_to(head).is_some(), "head must adjoin tail");
        Self {
            id,
            compass,
            head: ValueHistory::new(round, head),
            tail: ValueHistory::new(round, tail),
            color: ValueHistory::new(round, DEFAULT_PARTICLE_COLOR),
            heard_beeps: ValueHistory::new(round, 0),
            bonds: BondTable::default(),
        }
    }

    pub fn head_pos(&self) -> GridPos {
        *self.head.latest_value()
    }

    pub fn tail_pos(&self) -> GridPos {
        *self.tail.latest_value()
    }

    pub fn is_expanded(&self) -> bool {
        self.head_pos() != self.tail_pos()
    }

    /// Currently occupied nodes; one entry when contracted.
    pub fn nodes(&self) -> Vec<(GridPos, Part)> {
        if self.is_expanded() {
            vec![(self.head_pos(), Part::Head), (self.tail_pos(), Part::Tail)]
        } else {
            vec![(self.head_pos(), Part::Head)]
        }
    }

    pub fn part_at(&self, pos: GridPos) -> Option<Part> {
        if pos == self.head_pos() {
            Some(Part::Head)
        } else if pos == self.tail_pos() {
            Some(Part::Tail)
        } else {
            None
        }
    }
}

/// Program attached to a particle; invoked once per phase per round.
///
/// Kept apart from [`Particle`] so snapshot and commit passes can borrow
/// particle data while programs are borrowed mutably.
#[derive(Component)]
pub struct ProgramSlot(pub Box<dyn ParticleProgram>);

/// A rigid environment obstacle anchored at one node.
#[derive(Component, Debug, Clone)]
pub struct ParticleObject {
    pub id: ObjectId,
    /// Occupied nodes relative to the anchor; contains `GridVec::ZERO`.
    pub offsets: Vec<GridVec>,
    pub anchor: ValueHistory<GridPos>,
}

/// Boundary analysis of an object's occupied region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectBoundary {
    /// Occupied nodes adjacent to the unbounded exterior, sorted.
    pub outer: Vec<GridPos>,
    /// Per enclosed hole, the occupied nodes surrounding it, sorted; holes
    /// ordered by their smallest empty node.
    pub holes: Vec<Vec<GridPos>>,
}

impl ParticleObject {
    pub fn new(id: ObjectId, anchor: GridPos, mut offsets: Vec<GridVec>, round: u64) -> Self {
        if !offsets.contains(&GridVec::ZERO) {
            offsets.push(GridVec::ZERO);
        }
        offsets.sort_by_key(|offset| (offset.x, offset.y));
        offsets.dedup();
        Self {
            id,
            offsets,
            anchor: ValueHistory::new(round, anchor),
        }
    }

    pub fn anchor_pos(&self) -> GridPos {
        *self.anchor.latest_value()
    }

    pub fn nodes(&self) -> Vec<GridPos> {
        let anchor = self.anchor_pos();
        self.offsets.iter().map(|&offset| anchor + offset).collect()
    }

    /// Compute the outer boundary and inner hole rings on demand.
    ///
    /// Empty nodes inside the bounding box that cannot reach the exterior
    /// form holes; the occupied nodes adjacent to each empty region form the
    /// corresponding boundary set.
    pub fn boundary(&self) -> ObjectBoundary {
        let nodes: HashSet<GridPos> = self.nodes().into_iter().collect();
        let min_x = nodes.iter().map(|n| n.x).min().expect("non-empty") - 1;
        let max_x = nodes.iter().map(|n| n.x).max().expect("non-empty") + 1;
        let min_y = nodes.iter().map(|n| n.y).min().expect("non-empty") - 1;
        let max_y = nodes.iter().map(|n| n.y).max().expect("non-empty") + 1;
        let in_box =
            |p: GridPos| p.x >= min_x && p.x <= max_x && p.y >= min_y && p.y <= max_y;

        // Flood the exterior from a box corner, then classify the leftover
        // empty nodes into hole regions.
        let mut exterior = HashSet::new();
        let mut queue = VecDeque::from([GridPos::new(min_x, min_y)]);
        while let Some(node) = queue.pop_front() {
            if !in_box(node) || nodes.contains(&node) || !exterior.insert(node) {
                continue;
            }
            for dir in Direction::ALL {
                queue.push_back(node.neighbor(dir));
            }
        }

        let mut hole_of: HashMap<GridPos, usize> = HashMap::new();
        let mut hole_seeds: Vec<GridPos> = Vec::new();
        for x in min_x..=max_x {
            for y in min_y..=max_y {
                let node = GridPos::new(x, y);
                if nodes.contains(&node)
                    || exterior.contains(&node)
                    || hole_of.contains_key(&node)
                {
                    continue;
                }
                let hole = hole_seeds.len();
                hole_seeds.push(node);
                let mut fill = VecDeque::from([node]);
                while let Some(next) = fill.pop_front() {
                    if !in_box(next)
                        || nodes.contains(&next)
                        || exterior.contains(&next)
                        || hole_of.contains_key(&next)
                    {
                        continue;
                    }
                    hole_of.insert(next, hole);
                    for dir in Direction::ALL {
                        fill.push_back(next.neighbor(dir));
                    }
                }
            }
        }

        let mut outer: Vec<GridPos> = Vec::new();
        let mut holes: Vec<HashSet<GridPos>> = vec![HashSet::new(); hole_seeds.len()];
        for &node in &nodes {
            for dir in Direction::ALL {
                let neighbor = node.neighbor(dir);
                if exterior.contains(&neighbor) {
                    outer.push(node);
                } else if let Some(&hole) = hole_of.get(&neighbor) {
                    holes[hole].insert(node);
                }
            }
        }
        outer.sort();
        outer.dedup();
        let mut holes: Vec<Vec<GridPos>> = holes
            .into_iter()
            .map(|set| {
                let mut ring: Vec<GridPos> = set.into_iter().collect();
                ring.sort();
                ring
            })
            .collect();
        holes.sort_by_key(|ring| ring.first().copied());
        ObjectBoundary { outer, holes }
    }
}
