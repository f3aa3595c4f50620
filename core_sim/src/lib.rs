//! Core simulation crate for the headless amoebot engine.
//!
//! Particles live on a triangular lattice, run their programs in lock-step
//! rounds, and move jointly through a shared bond structure. Each call to
//! [`run_round`] drives the chained round pipeline configured in
//! [`build_headless_app`]: bond refresh → move activations → joint-movement
//! resolution → collision/connectivity validation → commit → communication
//! phase → snapshot capture. A failed round commits nothing and halts the
//! simulation with a structured [`RoundError`].

mod collision;
mod components;
mod grid;
mod history;
mod intents;
mod movement;
mod programs;
mod resources;
mod scenario;
mod snapshot;
mod systems;
pub mod metrics;
pub mod network;
pub mod timeline;

use std::sync::Arc;

use bevy::prelude::*;

pub use collision::{edges_collide, segments_intersect, CollisionReport, EdgeMovement};
pub use components::{
    BondFlags, BondTable, ObjectBoundary, ObjectId, Part, Particle, ParticleId, ParticleObject,
    ProgramSlot, UnitId, DEFAULT_PARTICLE_COLOR,
};
pub use grid::{Chirality, Compass, Direction, GridPos, GridVec};
pub use history::ValueHistory;
pub use intents::{
    BeepActivation, BeepIntent, IntentQueue, MoveActivation, MoveAction, MoveIntent, NeighborInfo,
    ParticleProgram, ParticleView, ProgramError,
};
pub use metrics::SimulationMetrics;
pub use movement::{
    resolve as resolve_joint_movement, EdgeProvenance, MoveRequest, MovementError, Resolution,
    ResolvedAction, UnitBody, UnitPlacement,
};
pub use programs::{FaultyProgram, IdleProgram, ScriptedProgram, ScriptedStep, WalkerProgram};
pub use resources::{
    Anchor, MovementArena, NodeIndex, Occupant, SimulationConfig, SimulationRound, TimelineCursor,
};
pub use scenario::{
    load_scenario_from_env, random_connected_scenario, spawn_initial_world, ObjectSeed,
    ParticleSeed, ProgramSeed, Scenario, ScenarioError, ScenarioFile, ScenarioHandle,
    BUILTIN_SCENARIO,
};
pub use snapshot::{
    capture_snapshot, history_export, marked_snapshot, restore_from_history, SnapshotHistory,
    StoredSnapshot,
};
pub use systems::{RoundContext, RoundError};

/// Construct a headless [`App`] running the scenario named by
/// `SCENARIO_PATH` (or the builtin default).
pub fn build_headless_app() -> App {
    build_app_from_scenario((*load_scenario_from_env()).clone())
}

/// Construct a headless [`App`] for an explicit scenario.
pub fn build_app_from_scenario(scenario: Scenario) -> App {
    let mut app = App::new();

    let config = SimulationConfig::default();
    let snapshot_history = SnapshotHistory::with_capacity(config.snapshot_history_limit.max(1));

    app.insert_resource(config)
        .insert_resource(SimulationRound::default())
        .insert_resource(TimelineCursor::default())
        .insert_resource(Anchor::default())
        .insert_resource(RoundContext::default())
        .insert_resource(NodeIndex::default())
        .insert_resource(IntentQueue::default())
        .insert_resource(MovementArena::default())
        .insert_resource(SimulationMetrics::default())
        .insert_resource(snapshot_history)
        .insert_resource(ScenarioHandle(Arc::new(scenario)))
        .add_plugins(MinimalPlugins)
        .add_systems(Startup, scenario::spawn_initial_world)
        .add_systems(
            Update,
            (
                systems::refresh_bonds,
                systems::collect_move_intents,
                systems::stage_bond_flags,
                systems::resolve_movements,
                systems::validate_movements,
                systems::commit_movements,
                systems::run_beep_phase,
                systems::advance_round,
                snapshot::capture_snapshot,
                metrics::collect_metrics,
            )
                .chain(),
        );

    app
}

/// Execute a single simulation round.
///
/// The movement phase fully resolves (commit or abort) before the
/// communication phase, and nothing is written to any history tracker until
/// validation passes. On failure the round's staged state is discarded, the
/// simulation halts, and the error is returned; rewinding and resuming
/// through [`timeline::continue_tracking`] clears the halt.
pub fn run_round(app: &mut App) -> Result<(), RoundError> {
    {
        let world = &mut app.world;
        let ctx = world.resource::<RoundContext>();
        if ctx.halted {
            return Err(RoundError::Halted);
        }
        let cursor = *world.resource::<TimelineCursor>();
        let latest = world.resource::<SimulationRound>().0;
        if cursor.paused {
            return Err(RoundError::HistoryPaused {
                view: cursor.view,
                latest,
            });
        }
        world.resource_mut::<RoundContext>().failure = None;
    }

    app.update();

    let failure = app.world.resource::<RoundContext>().failure.clone();
    match failure {
        Some(error) => {
            {
                let mut ctx = app.world.resource_mut::<RoundContext>();
                ctx.halted = true;
                ctx.rounds_aborted += 1;
            }
            app.world.resource_mut::<IntentQueue>().clear();
            app.world.resource_mut::<MovementArena>().clear();
            Err(error)
        }
        None => Ok(()),
    }
}
