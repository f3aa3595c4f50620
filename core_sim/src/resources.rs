use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use bevy::prelude::*;

use crate::{
    components::{ParticleId, UnitId},
    grid::GridPos,
    movement::Resolution,
};

/// Global configuration parameters for the headless engine.
#[derive(Resource, Debug, Clone)]
pub struct SimulationConfig {
    pub snapshot_bind: SocketAddr,
    pub command_bind: SocketAddr,
    pub snapshot_history_limit: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            snapshot_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 42000),
            command_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 42001),
            snapshot_history_limit: 256,
        }
    }
}

/// Latest committed round index.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationRound(pub u64);

/// The round currently visible through every history tracker's marker.
///
/// While `paused` the engine refuses to execute rounds; resuming discards
/// any recordings later than the view.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineCursor {
    pub view: u64,
    pub paused: bool,
}

/// The particle whose non-moving reference part fixes the global frame for
/// a round. Defaults to the lowest particle id when unset.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub particle: Option<ParticleId>,
}

/// What occupies a lattice node at the start of the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub entity: Entity,
    pub unit: UnitId,
    pub expanded: bool,
    pub is_head: bool,
}

/// Node-to-occupant index, rebuilt at every round start.
#[derive(Resource, Debug, Default)]
pub struct NodeIndex {
    pub map: HashMap<GridPos, Occupant>,
}

/// Per-round movement scratch space.
///
/// Edge movements never outlive one round's validation pass; the arena is
/// cleared at round boundaries instead of freeing per-value allocations.
#[derive(Resource, Debug, Default)]
pub struct MovementArena {
    pub resolution: Option<Resolution>,
}

impl MovementArena {
    pub fn clear(&mut self) {
        self.resolution = None;
    }
}
