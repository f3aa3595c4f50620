use bevy::prelude::*;

use crate::{
    components::{Particle, ParticleObject},
    grid::Direction,
    resources::{NodeIndex, SimulationRound},
    systems::RoundContext,
};

/// Aggregate counters pulled by the server's status surface.
#[derive(Resource, Default, Debug, Clone)]
pub struct SimulationMetrics {
    pub round: u64,
    pub particle_count: usize,
    pub expanded_count: usize,
    pub object_count: usize,
    /// Bonds derived from the round-start adjacency, before releases.
    pub bond_count: usize,
    pub rounds_aborted: u64,
}

pub fn collect_metrics(
    round: Res<SimulationRound>,
    ctx: Res<RoundContext>,
    index: Res<NodeIndex>,
    particles: Query<&Particle>,
    objects: Query<&ParticleObject>,
    mut metrics: ResMut<SimulationMetrics>,
) {
    metrics.round = round.0;
    metrics.particle_count = particles.iter().count();
    metrics.expanded_count = particles
        .iter()
        .filter(|particle| particle.is_expanded())
        .count();
    metrics.object_count = objects.iter().count();
    metrics.rounds_aborted = ctx.rounds_aborted;

    // Count each adjacency between distinct units once by scanning the
    // three forward directions per node.
    let mut bonds = 0usize;
    for (&node, occupant) in &index.map {
        for direction in [Direction::East, Direction::NorthEast, Direction::NorthWest] {
            if let Some(other) = index.map.get(&node.neighbor(direction)) {
                if other.unit != occupant.unit {
                    bonds += 1;
                }
            }
        }
    }
    metrics.bond_count = bonds;
}
