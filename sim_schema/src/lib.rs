//! Data contracts shared between the amoebot engine and its collaborators.
//!
//! Everything in this crate is plain serde data: snapshot states pulled by
//! renderers and inspectors, diagnostic payloads attached to round failures,
//! and the full history export consumed by the persistence layer. Engine
//! logic lives in `core_sim`; helpers that operate on these types without
//! the Bevy runtime live in `sim_runtime`.

use std::hash::Hasher;

use serde::{Deserialize, Serialize};

/// A deterministic FNV-1a 64-bit hasher.
///
/// Used instead of `DefaultHasher` (which is randomized) so snapshot hashes
/// compare equal across processes and machines.
#[derive(Debug, Default)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

/// A lattice node in axial coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct GridPointState {
    pub x: i32,
    pub y: i32,
}

impl GridPointState {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Committed state of one particle at a snapshot round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticleState {
    pub id: u32,
    pub head: GridPointState,
    pub tail: GridPointState,
    pub expanded: bool,
    /// `true` for counter-clockwise chirality.
    pub chirality_ccw: bool,
    /// Global direction index 0-5 of the particle's local direction 0.
    pub compass_offset: u8,
    /// Packed 0xRRGGBB display color.
    pub color: u32,
    /// Beep slots heard in the last communication phase (bits 0-5 head,
    /// bits 6-11 tail, indexed by global direction).
    pub heard_beeps: u16,
}

/// Committed state of one rigid environment object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectState {
    pub id: u32,
    pub anchor: GridPointState,
    /// Occupied nodes relative to `anchor`, sorted, first entry (0, 0).
    pub offsets: Vec<GridPointState>,
}

/// Before/after endpoints of one edge movement, exposed on collision faults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeMovementState {
    pub before: [GridPointState; 2],
    pub after: [GridPointState; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotHeader {
    pub round: u64,
    pub particle_count: u32,
    pub object_count: u32,
    pub hash: u64,
}

impl SnapshotHeader {
    pub fn new(round: u64, particle_count: usize, object_count: usize) -> Self {
        Self {
            round,
            particle_count: particle_count as u32,
            object_count: object_count as u32,
            hash: 0,
        }
    }
}

/// Full committed world state at one round, sorted by id for determinism.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldSnapshot {
    pub header: SnapshotHeader,
    pub particles: Vec<ParticleState>,
    pub objects: Vec<ObjectState>,
}

impl WorldSnapshot {
    /// Compute and store the body hash. Callers sort the state vectors
    /// before finalizing; the hash covers everything except itself.
    pub fn finalize(mut self) -> Self {
        self.header.hash = 0;
        let bytes = bincode::serialize(&self).expect("snapshot body serialization failed");
        let mut hasher = FnvHasher::new();
        hasher.write(&bytes);
        self.header.hash = hasher.finish();
        self
    }
}

pub fn encode_snapshot(snapshot: &WorldSnapshot) -> bincode::Result<Vec<u8>> {
    bincode::serialize(snapshot)
}

pub fn decode_snapshot(bytes: &[u8]) -> bincode::Result<WorldSnapshot> {
    bincode::deserialize(bytes)
}

/// One recorded (round, value) pair inside an exported history tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryRecordState<T> {
    pub round: u64,
    pub value: T,
}

/// Exported timeline of one tracked value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerState<T> {
    pub records: Vec<HistoryRecordState<T>>,
    pub marked_round: u64,
    pub tracking: bool,
}

/// Full recorded history of one particle plus its static configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticleHistoryState {
    pub id: u32,
    pub chirality_ccw: bool,
    pub compass_offset: u8,
    pub head: TrackerState<GridPointState>,
    pub tail: TrackerState<GridPointState>,
    pub color: TrackerState<u32>,
    pub heard_beeps: TrackerState<u16>,
}

/// Full recorded history of one rigid object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectHistoryState {
    pub id: u32,
    pub offsets: Vec<GridPointState>,
    pub anchor: TrackerState<GridPointState>,
}

/// Serializable snapshot of every history tracker in the simulation.
///
/// Bond state is recomputed from adjacency each round and is deliberately
/// absent here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryExport {
    pub round: u64,
    pub anchor: Option<u32>,
    pub particles: Vec<ParticleHistoryState>,
    pub objects: Vec<ObjectHistoryState>,
}

pub fn encode_history(export: &HistoryExport) -> bincode::Result<Vec<u8>> {
    bincode::serialize(export)
}

pub fn decode_history(bytes: &[u8]) -> bincode::Result<HistoryExport> {
    bincode::deserialize(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> WorldSnapshot {
        WorldSnapshot {
            header: SnapshotHeader::new(7, 1, 1),
            particles: vec![ParticleState {
                id: 0,
                head: GridPointState::new(1, 0),
                tail: GridPointState::new(0, 0),
                expanded: true,
                chirality_ccw: true,
                compass_offset: 0,
                color: 0x4080ff,
                heard_beeps: 0,
            }],
            objects: vec![ObjectState {
                id: 0,
                anchor: GridPointState::new(3, -1),
                offsets: vec![GridPointState::new(0, 0)],
            }],
        }
    }

    #[test]
    fn snapshot_hash_is_stable_across_finalizations() {
        let a = sample_snapshot().finalize();
        let b = sample_snapshot().finalize();
        assert_ne!(a.header.hash, 0);
        assert_eq!(a.header.hash, b.header.hash);
    }

    #[test]
    fn snapshot_hash_tracks_body_changes() {
        let a = sample_snapshot().finalize();
        let mut changed = sample_snapshot();
        changed.particles[0].head = GridPointState::new(2, 0);
        let changed = changed.finalize();
        assert_ne!(a.header.hash, changed.header.hash);
    }

    #[test]
    fn snapshot_roundtrips_through_bincode() {
        let snapshot = sample_snapshot().finalize();
        let bytes = encode_snapshot(&snapshot).expect("encode");
        let decoded = decode_snapshot(&bytes).expect("decode");
        assert_eq!(snapshot, decoded);
    }
}
