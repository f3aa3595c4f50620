use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub};

use serde::{Deserialize, Serialize};
use sim_schema::GridPointState;

/// A node of the triangular lattice in axial coordinates.
///
/// The basis vectors map to cartesian `(1, 0)` and `(1/2, sqrt(3)/2)`; the
/// map is linear and orientation-preserving, so all collinearity and
/// intersection tests run directly on the integer axial coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

/// An integer displacement between lattice nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct GridVec {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn neighbor(self, direction: Direction) -> Self {
        self + direction.offset()
    }

    /// Direction from `self` to `other` if the two nodes are adjacent.
    pub fn direction_to(self, other: GridPos) -> Option<Direction> {
        let delta = other - self;
        Direction::ALL
            .into_iter()
            .find(|dir| dir.offset() == delta)
    }
}

impl GridVec {
    pub const ZERO: GridVec = GridVec { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

impl Add<GridVec> for GridPos {
    type Output = GridPos;

    fn add(self, rhs: GridVec) -> GridPos {
        GridPos::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign<GridVec> for GridPos {
    fn add_assign(&mut self, rhs: GridVec) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub<GridVec> for GridPos {
    type Output = GridPos;

    fn sub(self, rhs: GridVec) -> GridPos {
        GridPos::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Sub for GridPos {
    type Output = GridVec;

    fn sub(self, rhs: GridPos) -> GridVec {
        GridVec::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Add for GridVec {
    type Output = GridVec;

    fn add(self, rhs: GridVec) -> GridVec {
        GridVec::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for GridVec {
    type Output = GridVec;

    fn sub(self, rhs: GridVec) -> GridVec {
        GridVec::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for GridVec {
    type Output = GridVec;

    fn neg(self) -> GridVec {
        GridVec::new(-self.x, -self.y)
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl fmt::Display for GridVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<GridPos> for GridPointState {
    fn from(pos: GridPos) -> Self {
        GridPointState::new(pos.x, pos.y)
    }
}

impl From<GridPointState> for GridPos {
    fn from(state: GridPointState) -> Self {
        GridPos::new(state.x, state.y)
    }
}

/// The six lattice directions, numbered 0-5 counter-clockwise from east.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    East,
    NorthEast,
    NorthWest,
    West,
    SouthWest,
    SouthEast,
}

impl Direction {
    pub const COUNT: usize = 6;
    pub const ALL: [Direction; 6] = [
        Direction::East,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::West,
        Direction::SouthWest,
        Direction::SouthEast,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(value: u8) -> Option<Self> {
        match value {
            0 => Some(Direction::East),
            1 => Some(Direction::NorthEast),
            2 => Some(Direction::NorthWest),
            3 => Some(Direction::West),
            4 => Some(Direction::SouthWest),
            5 => Some(Direction::SouthEast),
            _ => None,
        }
    }

    /// Rotate counter-clockwise by `steps` sixths of a full turn.
    pub fn rotated(self, steps: i32) -> Self {
        let index = (self.index() as i32 + steps).rem_euclid(6) as u8;
        Self::from_index(index).expect("rem_euclid keeps the index in range")
    }

    pub fn opposite(self) -> Self {
        self.rotated(3)
    }

    pub fn offset(self) -> GridVec {
        match self {
            Direction::East => GridVec::new(1, 0),
            Direction::NorthEast => GridVec::new(0, 1),
            Direction::NorthWest => GridVec::new(-1, 1),
            Direction::West => GridVec::new(-1, 0),
            Direction::SouthWest => GridVec::new(0, -1),
            Direction::SouthEast => GridVec::new(1, -1),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::East => "E",
            Direction::NorthEast => "NE",
            Direction::NorthWest => "NW",
            Direction::West => "W",
            Direction::SouthWest => "SW",
            Direction::SouthEast => "SE",
        };
        write!(f, "{name}")
    }
}

/// Rotation sense of a particle's local direction numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Chirality {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl Chirality {
    pub fn sign(self) -> i32 {
        match self {
            Chirality::CounterClockwise => 1,
            Chirality::Clockwise => -1,
        }
    }
}

/// Fixed local-to-global direction mapping assigned to a particle at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compass {
    pub chirality: Chirality,
    /// Global direction of the particle's local direction 0.
    pub offset: Direction,
}

impl Compass {
    pub fn new(chirality: Chirality, offset: Direction) -> Self {
        Self { chirality, offset }
    }

    pub fn local_to_global(self, local: Direction) -> Direction {
        self.offset.rotated(self.chirality.sign() * local.index() as i32)
    }

    pub fn global_to_local(self, global: Direction) -> Direction {
        let steps = global.index() as i32 - self.offset.index() as i32;
        let index = (self.chirality.sign() * steps).rem_euclid(6) as u8;
        Direction::from_index(index).expect("rem_euclid keeps the index in range")
    }
}

impl Default for Compass {
    fn default() -> Self {
        Self::new(Chirality::CounterClockwise, Direction::East)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbor_offsets_cancel_in_opposite_pairs() {
        for dir in Direction::ALL {
            let there = GridPos::new(3, -2).neighbor(dir);
            assert_eq!(there.neighbor(dir.opposite()), GridPos::new(3, -2));
            assert_eq!((dir.offset() + dir.opposite().offset()), GridVec::ZERO);
        }
    }

    #[test]
    fn rotation_is_counter_clockwise_and_mod_six() {
        assert_eq!(Direction::East.rotated(1), Direction::NorthEast);
        assert_eq!(Direction::East.rotated(-1), Direction::SouthEast);
        assert_eq!(Direction::NorthWest.rotated(7), Direction::West);
        assert_eq!(Direction::West.opposite(), Direction::East);
    }

    #[test]
    fn direction_to_detects_adjacency() {
        let origin = GridPos::new(0, 0);
        assert_eq!(
            origin.direction_to(GridPos::new(1, -1)),
            Some(Direction::SouthEast)
        );
        assert_eq!(origin.direction_to(GridPos::new(2, 0)), None);
        assert_eq!(origin.direction_to(origin), None);
    }

    #[test]
    fn compass_roundtrips_for_both_chiralities() {
        for chirality in [Chirality::CounterClockwise, Chirality::Clockwise] {
            for offset in Direction::ALL {
                let compass = Compass::new(chirality, offset);
                for local in Direction::ALL {
                    let global = compass.local_to_global(local);
                    assert_eq!(compass.global_to_local(global), local);
                }
            }
        }
    }

    #[test]
    fn clockwise_compass_mirrors_rotation() {
        let compass = Compass::new(Chirality::Clockwise, Direction::NorthEast);
        assert_eq!(compass.local_to_global(Direction::East), Direction::NorthEast);
        assert_eq!(compass.local_to_global(Direction::NorthEast), Direction::East);
        assert_eq!(
            compass.local_to_global(Direction::NorthWest),
            Direction::SouthEast
        );
    }
}
