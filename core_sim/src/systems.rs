use std::collections::HashMap;

use bevy::prelude::*;
use rayon::prelude::*;
use thiserror::Error;

use crate::{
    collision::{edges_collide, CollisionReport},
    components::{Part, Particle, ParticleId, ParticleObject, ProgramSlot, UnitId},
    grid::{Compass, Direction, GridPos},
    intents::{
        BeepActivation, BeepIntent, IntentQueue, MoveActivation, MoveAction, MoveIntent,
        ParticleView,
    },
    movement::{self, MoveRequest, MovementError, ResolvedAction, UnitBody, UnitPlacement},
    resources::{Anchor, MovementArena, NodeIndex, Occupant, SimulationRound, TimelineCursor},
};

/// Round-fatal failures. Any detected inconsistency aborts the round before
/// a single history write; the simulation then halts awaiting operator
/// intervention.
#[derive(Debug, Clone, Error)]
pub enum RoundError {
    #[error("movement rejected: {0}")]
    Movement(#[from] MovementError),
    #[error("edge movements collide: {0}")]
    Collision(CollisionReport),
    #[error("program fault in particle {id}: {message}")]
    ProgramFault { id: ParticleId, message: String },
    #[error("history marker parked at round {view} of {latest}; resume tracking first")]
    HistoryPaused { view: u64, latest: u64 },
    #[error("simulation halted by a failed round; rewind and resume to continue")]
    Halted,
}

/// Outcome slot for the in-flight round. Systems downstream of a recorded
/// failure become no-ops, which gives the round commit-or-abort atomicity.
#[derive(Resource, Debug, Default)]
pub struct RoundContext {
    pub failure: Option<RoundError>,
    pub halted: bool,
    pub rounds_aborted: u64,
}

impl RoundContext {
    fn abandoned(&self) -> bool {
        self.failure.is_some() || self.halted
    }

    fn fail(&mut self, error: RoundError) {
        tracing::error!(target: "amoebot::round", error = %error, "round.aborted");
        self.failure = Some(error);
    }
}

/// Snapshot of one particle's committed state used during activations.
#[derive(Debug, Clone, Copy)]
struct ParticleLite {
    id: ParticleId,
    compass: Compass,
    head: GridPos,
    tail: GridPos,
    heard: u16,
}

fn particle_lite(particle: &Particle) -> ParticleLite {
    ParticleLite {
        id: particle.id,
        compass: particle.compass,
        head: particle.head_pos(),
        tail: particle.tail_pos(),
        heard: *particle.heard_beeps.latest_value(),
    }
}

fn occupancy_of(
    particles: impl Iterator<Item = (Entity, ParticleLite)>,
    objects: impl Iterator<Item = (Entity, UnitId, Vec<GridPos>)>,
) -> HashMap<GridPos, Occupant> {
    let mut map = HashMap::new();
    for (entity, lite) in particles {
        let expanded = lite.head != lite.tail;
        map.insert(
            lite.head,
            Occupant {
                entity,
                unit: UnitId::Particle(lite.id),
                expanded,
                is_head: true,
            },
        );
        if expanded {
            map.insert(
                lite.tail,
                Occupant {
                    entity,
                    unit: UnitId::Particle(lite.id),
                    expanded,
                    is_head: false,
                },
            );
        }
    }
    for (entity, unit, nodes) in objects {
        for node in nodes {
            map.insert(
                node,
                Occupant {
                    entity,
                    unit,
                    expanded: false,
                    is_head: false,
                },
            );
        }
    }
    map
}

/// Rebuild the node index and re-derive every bond slot from adjacency.
pub fn refresh_bonds(
    ctx: Res<RoundContext>,
    mut index: ResMut<NodeIndex>,
    mut particles: Query<(Entity, &mut Particle)>,
    objects: Query<(Entity, &ParticleObject)>,
) {
    if ctx.abandoned() {
        return;
    }
    index.map = occupancy_of(
        particles
            .iter()
            .map(|(entity, particle)| (entity, particle_lite(particle))),
        objects
            .iter()
            .map(|(entity, object)| (entity, UnitId::Object(object.id), object.nodes())),
    );

    for (_, mut particle) in particles.iter_mut() {
        let own = UnitId::Particle(particle.id);
        let nodes = particle.nodes();
        particle.bonds.clear();
        for (node, part) in nodes {
            for direction in Direction::ALL {
                if let Some(occupant) = index.map.get(&node.neighbor(direction)) {
                    if occupant.unit != own {
                        particle.bonds.set_active(part, direction);
                    }
                }
            }
        }
    }
}

/// First activation pass: run every particle's move callback against the
/// committed pre-round state, recording intentions only.
pub fn collect_move_intents(
    mut ctx: ResMut<RoundContext>,
    round: Res<SimulationRound>,
    index: Res<NodeIndex>,
    mut queue: ResMut<IntentQueue>,
    particles: Query<(Entity, &Particle)>,
    mut programs: Query<&mut ProgramSlot>,
) {
    if ctx.abandoned() {
        return;
    }
    let mut ordered: Vec<(ParticleId, Entity, ParticleLite)> = particles
        .iter()
        .map(|(entity, particle)| (particle.id, entity, particle_lite(particle)))
        .collect();
    ordered.sort_by_key(|(id, _, _)| *id);

    for (id, entity, lite) in ordered {
        let Ok(mut program) = programs.get_mut(entity) else {
            continue;
        };
        let mut intent = MoveIntent::default();
        let view = ParticleView {
            id: lite.id,
            compass: lite.compass,
            head: lite.head,
            tail: lite.tail,
            heard: lite.heard,
            round: round.0,
            occupancy: &index.map,
        };
        let mut activation = MoveActivation {
            view,
            intent: &mut intent,
        };
        if let Err(error) = program.0.activate_move(&mut activation) {
            ctx.fail(RoundError::ProgramFault {
                id,
                message: error.to_string(),
            });
            return;
        }
        queue.stage_move(id, intent);
    }
}

/// Mirror staged releases and marks into the per-particle bond tables.
pub fn stage_bond_flags(
    ctx: Res<RoundContext>,
    queue: Res<IntentQueue>,
    mut particles: Query<&mut Particle>,
) {
    if ctx.abandoned() {
        return;
    }
    for mut particle in particles.iter_mut() {
        let Some(intent) = queue.move_intent(particle.id) else {
            continue;
        };
        let compass = particle.compass;
        for &(part, local) in &intent.releases {
            particle.bonds.release(part, compass.local_to_global(local));
        }
        for &local in &intent.marks {
            particle.bonds.mark(Part::Head, compass.local_to_global(local));
        }
    }
}

fn resolved_action(compass: Compass, intent: &MoveIntent) -> ResolvedAction {
    match intent.action {
        MoveAction::Idle => ResolvedAction::Idle,
        MoveAction::Expand { direction } => ResolvedAction::Expand {
            direction: compass.local_to_global(direction),
        },
        MoveAction::Contract { into_head } => ResolvedAction::Contract { into_head },
        MoveAction::Pull { partner, into_head } => ResolvedAction::Pull { partner, into_head },
        MoveAction::Push { partner, direction } => ResolvedAction::Push {
            partner,
            direction: compass.local_to_global(direction),
        },
    }
}

/// Second pass: translate intents through the bond/movement model into the
/// round's full edge-movement set.
pub fn resolve_movements(
    mut ctx: ResMut<RoundContext>,
    queue: Res<IntentQueue>,
    anchor: Res<Anchor>,
    mut arena: ResMut<MovementArena>,
    particles: Query<&Particle>,
    objects: Query<&ParticleObject>,
) {
    if ctx.abandoned() {
        return;
    }

    let mut requests: Vec<MoveRequest> = Vec::new();
    let mut sorted_particles: Vec<&Particle> = particles.iter().collect();
    sorted_particles.sort_by_key(|particle| particle.id);
    for particle in &sorted_particles {
        let body = if particle.is_expanded() {
            UnitBody::Expanded {
                head: particle.head_pos(),
                tail: particle.tail_pos(),
            }
        } else {
            UnitBody::Contracted(particle.head_pos())
        };
        let mut request = MoveRequest::idle(UnitId::Particle(particle.id), body);
        if let Some(intent) = queue.move_intent(particle.id) {
            let compass = particle.compass;
            request.action = resolved_action(compass, intent);
            for &(part, local) in &intent.releases {
                request
                    .released
                    .insert((part, compass.local_to_global(local)));
            }
            for &local in &intent.marks {
                request.marked.insert(compass.local_to_global(local));
            }
        }
        requests.push(request);
    }

    let mut sorted_objects: Vec<&ParticleObject> = objects.iter().collect();
    sorted_objects.sort_by_key(|object| object.id);
    for object in sorted_objects {
        requests.push(MoveRequest::idle(
            UnitId::Object(object.id),
            UnitBody::Rigid(object.nodes()),
        ));
    }

    if requests.is_empty() {
        arena.resolution = None;
        return;
    }

    let anchor_index = anchor
        .particle
        .and_then(|id| {
            requests
                .iter()
                .position(|request| request.id == UnitId::Particle(id))
        })
        .unwrap_or(0);

    match movement::resolve(&requests, anchor_index) {
        Ok(resolution) => arena.resolution = Some(resolution),
        Err(error) => ctx.fail(RoundError::Movement(error)),
    }
}

/// Pairwise collision validation over every edge movement of the round.
///
/// The pair scan runs in parallel; the reported pair is the first in index
/// order, so the verdict and the diagnostic match exhaustive sequential
/// checking.
pub fn validate_movements(mut ctx: ResMut<RoundContext>, arena: Res<MovementArena>) {
    if ctx.abandoned() {
        return;
    }
    let Some(resolution) = arena.resolution.as_ref() else {
        return;
    };
    let edges = &resolution.edges;
    let count = edges.len();
    let hit = (0..count)
        .into_par_iter()
        .flat_map(|i| ((i + 1)..count).into_par_iter().map(move |j| (i, j)))
        .find_first(|&(i, j)| edges_collide(&edges[i], &edges[j]));

    if let Some((i, j)) = hit {
        let mut units: Vec<UnitId> = resolution.provenance[i]
            .units()
            .into_iter()
            .chain(resolution.provenance[j].units())
            .collect();
        units.sort();
        units.dedup();
        let report = CollisionReport {
            first: edges[i],
            second: edges[j],
            units,
        };
        tracing::debug!(
            target: "amoebot::round",
            first = ?report.first.to_state(),
            second = ?report.second.to_state(),
            "collision.detected"
        );
        ctx.fail(RoundError::Collision(report));
    }
}

/// Write the validated placements into every entity's history trackers.
pub fn commit_movements(
    ctx: Res<RoundContext>,
    round: Res<SimulationRound>,
    queue: Res<IntentQueue>,
    arena: Res<MovementArena>,
    mut particles: Query<&mut Particle>,
    mut objects: Query<&mut ParticleObject>,
) {
    if ctx.abandoned() {
        return;
    }
    let Some(resolution) = arena.resolution.as_ref() else {
        return;
    };
    let commit_round = round.0 + 1;
    let placements: HashMap<UnitId, &UnitPlacement> = resolution
        .placements
        .iter()
        .map(|placement| (placement.id, placement))
        .collect();

    for mut particle in particles.iter_mut() {
        let Some(placement) = placements.get(&UnitId::Particle(particle.id)) else {
            continue;
        };
        let (head, tail) = match &placement.body {
            UnitBody::Contracted(pos) => (*pos, *pos),
            UnitBody::Expanded { head, tail } => (*head, *tail),
            UnitBody::Rigid(_) => unreachable!("particles never resolve to rigid bodies"),
        };
        particle.head.record(commit_round, head);
        particle.tail.record(commit_round, tail);
        if let Some(color) = queue.move_intent(particle.id).and_then(|intent| intent.color) {
            particle.color.record(commit_round, color);
        }
    }

    for mut object in objects.iter_mut() {
        let Some(placement) = placements.get(&UnitId::Object(object.id)) else {
            continue;
        };
        if let UnitBody::Rigid(nodes) = &placement.body {
            // The anchor node is always the first offset's image.
            let shift = nodes[0] - object.nodes()[0];
            let anchor = object.anchor_pos() + shift;
            object.anchor.record(commit_round, anchor);
        }
    }

    tracing::debug!(
        target: "amoebot::round",
        round = commit_round,
        moved = resolution.moved_units,
        bonds = resolution.bond_count,
        edges = resolution.edges.len(),
        "round.committed"
    );
}

/// Communication phase: activate beep callbacks against the post-movement
/// structure and commit deliveries with the same discipline as positions.
pub fn run_beep_phase(
    mut ctx: ResMut<RoundContext>,
    round: Res<SimulationRound>,
    mut queue: ResMut<IntentQueue>,
    mut particles: Query<(Entity, &mut Particle)>,
    mut programs: Query<&mut ProgramSlot>,
) {
    if ctx.abandoned() {
        return;
    }
    let commit_round = round.0 + 1;

    let occupancy = occupancy_of(
        particles
            .iter()
            .map(|(entity, particle)| (entity, particle_lite(particle))),
        std::iter::empty(),
    );

    let mut ordered: Vec<(ParticleId, Entity, ParticleLite)> = particles
        .iter()
        .map(|(entity, particle)| (particle.id, entity, particle_lite(particle)))
        .collect();
    ordered.sort_by_key(|(id, _, _)| *id);

    for (id, entity, lite) in &ordered {
        let Ok(mut program) = programs.get_mut(*entity) else {
            continue;
        };
        let mut intent = BeepIntent::default();
        let view = ParticleView {
            id: lite.id,
            compass: lite.compass,
            head: lite.head,
            tail: lite.tail,
            heard: lite.heard,
            round: round.0,
            occupancy: &occupancy,
        };
        let mut activation = BeepActivation {
            view,
            intent: &mut intent,
        };
        if let Err(error) = program.0.activate_beep(&mut activation) {
            ctx.fail(RoundError::ProgramFault {
                id: *id,
                message: error.to_string(),
            });
            return;
        }
        queue.stage_beep(*id, intent);
    }

    // Deliver every staged beep across the post-movement adjacency.
    let lites: HashMap<ParticleId, ParticleLite> = ordered
        .iter()
        .map(|(id, _, lite)| (*id, *lite))
        .collect();
    let mut heard: HashMap<ParticleId, u16> = HashMap::new();
    for (sender, intent) in queue.sorted_beeps() {
        let lite = &lites[&sender];
        for &(part, local) in &intent.sends {
            let node = match part {
                Part::Head => lite.head,
                Part::Tail => lite.tail,
            };
            let global = lite.compass.local_to_global(local);
            let Some(occupant) = occupancy.get(&node.neighbor(global)) else {
                continue;
            };
            let UnitId::Particle(receiver) = occupant.unit else {
                continue;
            };
            if receiver == sender {
                continue;
            }
            let bit = if occupant.is_head {
                global.opposite().index()
            } else {
                6 + global.opposite().index()
            };
            *heard.entry(receiver).or_default() |= 1 << bit;
        }
    }

    for (_, mut particle) in particles.iter_mut() {
        let value = heard.get(&particle.id).copied().unwrap_or(0);
        particle.heard_beeps.record(commit_round, value);
    }
}

/// Close out a committed round: advance the counter and clear per-round
/// staging state.
pub fn advance_round(
    ctx: Res<RoundContext>,
    mut round: ResMut<SimulationRound>,
    mut cursor: ResMut<TimelineCursor>,
    mut queue: ResMut<IntentQueue>,
    mut arena: ResMut<MovementArena>,
) {
    if ctx.abandoned() {
        return;
    }
    round.0 += 1;
    cursor.view = round.0;
    queue.clear();
    arena.clear();
}
