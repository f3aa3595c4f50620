use std::collections::VecDeque;
use std::sync::Arc;

use bevy::prelude::*;
use sim_schema::{
    encode_snapshot, GridPointState, HistoryExport, ObjectHistoryState, ObjectState,
    ParticleHistoryState, ParticleState, SnapshotHeader, WorldSnapshot,
};

use crate::{
    components::{ObjectId, Particle, ParticleId, ParticleObject},
    grid::{Chirality, Compass, GridPos, GridVec},
    history::ValueHistory,
    resources::{Anchor, SimulationRound, TimelineCursor},
    systems::RoundContext,
};

/// One retained committed snapshot.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub round: u64,
    pub snapshot: Arc<WorldSnapshot>,
    pub encoded: Arc<Vec<u8>>,
}

/// Bounded ring of committed snapshots, newest last.
///
/// This is the pull surface for renderers and inspectors; the authoritative
/// timeline lives in the per-entity history trackers.
#[derive(Resource, Debug)]
pub struct SnapshotHistory {
    pub last_snapshot: Option<Arc<WorldSnapshot>>,
    pub encoded_snapshot: Option<Arc<Vec<u8>>>,
    stored: VecDeque<StoredSnapshot>,
    limit: usize,
}

impl SnapshotHistory {
    pub fn with_capacity(limit: usize) -> Self {
        Self {
            last_snapshot: None,
            encoded_snapshot: None,
            stored: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, snapshot: WorldSnapshot, encoded: Vec<u8>) {
        let entry = StoredSnapshot {
            round: snapshot.header.round,
            snapshot: Arc::new(snapshot),
            encoded: Arc::new(encoded),
        };
        self.last_snapshot = Some(Arc::clone(&entry.snapshot));
        self.encoded_snapshot = Some(Arc::clone(&entry.encoded));
        if self.stored.len() == self.limit {
            self.stored.pop_front();
        }
        self.stored.push_back(entry);
    }

    pub fn entry(&self, round: u64) -> Option<StoredSnapshot> {
        self.stored
            .iter()
            .find(|entry| entry.round == round)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    /// Drop retained snapshots later than `round`; used when a rewound
    /// timeline resumes and the old future is discarded.
    pub fn prune_after(&mut self, round: u64) {
        while matches!(self.stored.back(), Some(entry) if entry.round > round) {
            self.stored.pop_back();
        }
        self.last_snapshot = self.stored.back().map(|entry| Arc::clone(&entry.snapshot));
        self.encoded_snapshot = self.stored.back().map(|entry| Arc::clone(&entry.encoded));
    }

    pub fn shift_rounds(&mut self, delta: i64) {
        for entry in &mut self.stored {
            entry.round = (entry.round as i64 + delta) as u64;
            let mut snapshot = (*entry.snapshot).clone();
            snapshot.header.round = entry.round;
            let snapshot = snapshot.finalize();
            let encoded = encode_snapshot(&snapshot).expect("snapshot serialization failed");
            entry.snapshot = Arc::new(snapshot);
            entry.encoded = Arc::new(encoded);
        }
        self.last_snapshot = self.stored.back().map(|entry| Arc::clone(&entry.snapshot));
        self.encoded_snapshot = self.stored.back().map(|entry| Arc::clone(&entry.encoded));
    }
}

fn particle_state(particle: &Particle, marked: bool) -> ParticleState {
    let pick = |history: &ValueHistory<GridPos>| -> GridPos {
        if marked {
            *history.marked_value()
        } else {
            *history.latest_value()
        }
    };
    let head = pick(&particle.head);
    let tail = pick(&particle.tail);
    ParticleState {
        id: particle.id.0,
        head: head.into(),
        tail: tail.into(),
        expanded: head != tail,
        chirality_ccw: particle.compass.chirality == Chirality::CounterClockwise,
        compass_offset: particle.compass.offset.index(),
        color: if marked {
            *particle.color.marked_value()
        } else {
            *particle.color.latest_value()
        },
        heard_beeps: if marked {
            *particle.heard_beeps.marked_value()
        } else {
            *particle.heard_beeps.latest_value()
        },
    }
}

fn object_state(object: &ParticleObject, marked: bool) -> ObjectState {
    let anchor = if marked {
        *object.anchor.marked_value()
    } else {
        *object.anchor.latest_value()
    };
    ObjectState {
        id: object.id.0,
        anchor: anchor.into(),
        offsets: object
            .offsets
            .iter()
            .map(|offset| GridPointState::new(offset.x, offset.y))
            .collect(),
    }
}

fn assemble_snapshot(
    round: u64,
    mut particles: Vec<ParticleState>,
    mut objects: Vec<ObjectState>,
) -> WorldSnapshot {
    particles.sort_unstable_by_key(|state| state.id);
    objects.sort_unstable_by_key(|state| state.id);
    let header = SnapshotHeader::new(round, particles.len(), objects.len());
    WorldSnapshot {
        header,
        particles,
        objects,
    }
    .finalize()
}

/// Capture the committed world state into the snapshot ring after every
/// successful round.
pub fn capture_snapshot(
    ctx: Res<RoundContext>,
    round: Res<SimulationRound>,
    particles: Query<&Particle>,
    objects: Query<&ParticleObject>,
    mut history: ResMut<SnapshotHistory>,
) {
    if ctx.failure.is_some() || ctx.halted {
        return;
    }
    let snapshot = assemble_snapshot(
        round.0,
        particles
            .iter()
            .map(|particle| particle_state(particle, false))
            .collect(),
        objects
            .iter()
            .map(|object| object_state(object, false))
            .collect(),
    );
    let encoded = encode_snapshot(&snapshot).expect("snapshot serialization failed");
    history.push(snapshot, encoded);
}

/// Build a snapshot of the values visible at the current history marker,
/// for scrubbing without re-simulating.
pub fn marked_snapshot(world: &mut World) -> WorldSnapshot {
    let view = world.resource::<TimelineCursor>().view;
    let mut particles = Vec::new();
    let mut query = world.query::<&Particle>();
    for particle in query.iter(world) {
        particles.push(particle_state(particle, true));
    }
    let mut objects = Vec::new();
    let mut query = world.query::<&ParticleObject>();
    for object in query.iter(world) {
        objects.push(object_state(object, true));
    }
    assemble_snapshot(view, particles, objects)
}

/// Serialize every history tracker plus each entity's static configuration.
pub fn history_export(world: &mut World) -> HistoryExport {
    let round = world.resource::<SimulationRound>().0;
    let anchor = world.resource::<Anchor>().particle.map(|id| id.0);

    let mut particles = Vec::new();
    let mut query = world.query::<&Particle>();
    for particle in query.iter(world) {
        particles.push(ParticleHistoryState {
            id: particle.id.0,
            chirality_ccw: particle.compass.chirality == Chirality::CounterClockwise,
            compass_offset: particle.compass.offset.index(),
            head: particle.head.export(|pos| (*pos).into()),
            tail: particle.tail.export(|pos| (*pos).into()),
            color: particle.color.export(|color| *color),
            heard_beeps: particle.heard_beeps.export(|heard| *heard),
        });
    }
    particles.sort_by_key(|state| state.id);

    let mut objects = Vec::new();
    let mut query = world.query::<&ParticleObject>();
    for object in query.iter(world) {
        objects.push(ObjectHistoryState {
            id: object.id.0,
            offsets: object
                .offsets
                .iter()
                .map(|offset| GridPointState::new(offset.x, offset.y))
                .collect(),
            anchor: object.anchor.export(|pos| (*pos).into()),
        });
    }
    objects.sort_by_key(|state| state.id);

    HistoryExport {
        round,
        anchor,
        particles,
        objects,
    }
}

/// Rebuild the tracked world from an export: despawns every current entity
/// and respawns them with their full recorded timelines.
pub fn restore_from_history(world: &mut World, export: &HistoryExport) {
    let stale: Vec<Entity> = {
        let mut entities = Vec::new();
        let mut query = world.query::<(Entity, &Particle)>();
        entities.extend(query.iter(world).map(|(entity, _)| entity));
        let mut query = world.query::<(Entity, &ParticleObject)>();
        entities.extend(query.iter(world).map(|(entity, _)| entity));
        entities
    };
    for entity in stale {
        world.despawn(entity);
    }

    for state in &export.particles {
        let chirality = if state.chirality_ccw {
            Chirality::CounterClockwise
        } else {
            Chirality::Clockwise
        };
        let offset = crate::grid::Direction::from_index(state.compass_offset)
            .unwrap_or(crate::grid::Direction::East);
        let compass = Compass::new(chirality, offset);
        let head = ValueHistory::from_state(&state.head, |p| GridPos::from(*p));
        let tail = ValueHistory::from_state(&state.tail, |p| GridPos::from(*p));
        let color = ValueHistory::from_state(&state.color, |c| *c);
        let heard = ValueHistory::from_state(&state.heard_beeps, |h| *h);
        let (Some(head), Some(tail), Some(color), Some(heard)) = (head, tail, color, heard) else {
            tracing::warn!(
                target: "amoebot::snapshot",
                particle = state.id,
                "history_import.empty_tracker_skipped"
            );
            continue;
        };
        world.spawn(Particle {
            id: ParticleId(state.id),
            compass,
            head,
            tail,
            color,
            heard_beeps: heard,
            bonds: Default::default(),
        });
    }

    for state in &export.objects {
        let Some(anchor) = ValueHistory::from_state(&state.anchor, |p| GridPos::from(*p)) else {
            continue;
        };
        world.spawn(ParticleObject {
            id: ObjectId(state.id),
            offsets: state
                .offsets
                .iter()
                .map(|offset| GridVec::new(offset.x, offset.y))
                .collect(),
            anchor,
        });
    }

    world.resource_mut::<SimulationRound>().0 = export.round;
    {
        let mut cursor = world.resource_mut::<TimelineCursor>();
        cursor.view = export.round;
        cursor.paused = false;
    }
    world.resource_mut::<Anchor>().particle = export.anchor.map(ParticleId);
}
