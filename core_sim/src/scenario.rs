use std::collections::HashSet;
use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::*;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    components::{ObjectId, Particle, ParticleId, ParticleObject, ProgramSlot},
    grid::{Chirality, Compass, Direction, GridPos, GridVec},
    intents::ParticleProgram,
    programs::{IdleProgram, WalkerProgram},
    resources::Anchor,
};

pub const BUILTIN_SCENARIO: &str = include_str!("data/default_scenario.json");

/// On-disk scenario description: initial placement, programs and anchor.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioFile {
    pub name: String,
    #[serde(default)]
    pub anchor: Option<u32>,
    #[serde(default)]
    pub particles: Vec<ParticleSeed>,
    #[serde(default)]
    pub objects: Vec<ObjectSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticleSeed {
    pub x: i32,
    pub y: i32,
    /// Optional expanded head node; must adjoin `(x, y)`.
    #[serde(default)]
    pub head: Option<[i32; 2]>,
    #[serde(default)]
    pub chirality: Chirality,
    /// Global direction index of local direction 0.
    #[serde(default)]
    pub compass: u8,
    #[serde(default)]
    pub program: ProgramSeed,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgramSeed {
    #[default]
    Idle,
    Walker {
        /// Local travel direction index.
        direction: u8,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectSeed {
    pub x: i32,
    pub y: i32,
    /// Occupied nodes relative to the anchor node.
    #[serde(default)]
    pub offsets: Vec<[i32; 2]>,
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read scenario from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid direction index {0}")]
    InvalidDirection(u8),
    #[error("particle head {head:?} does not adjoin its tail ({x}, {y})")]
    DetachedHead { x: i32, y: i32, head: [i32; 2] },
    #[error("node ({0}, {1}) is occupied twice")]
    DuplicateNode(i32, i32),
    #[error("scenario places no particles")]
    Empty,
}

/// A validated scenario ready to spawn.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub anchor: Option<ParticleId>,
    pub particles: Vec<ParticleSeed>,
    pub objects: Vec<ObjectSeed>,
}

impl Scenario {
    pub fn from_file(file: ScenarioFile) -> Result<Self, ScenarioError> {
        if file.particles.is_empty() {
            return Err(ScenarioError::Empty);
        }
        let mut occupied: HashSet<GridPos> = HashSet::new();
        let mut claim = |pos: GridPos| -> Result<(), ScenarioError> {
            if !occupied.insert(pos) {
                return Err(ScenarioError::DuplicateNode(pos.x, pos.y));
            }
            Ok(())
        };
        for seed in &file.particles {
            let tail = GridPos::new(seed.x, seed.y);
            claim(tail)?;
            if let Some(head) = seed.head {
                let head_pos = GridPos::new(head[0], head[1]);
                if tail.direction_to(head_pos).is_none() {
                    return Err(ScenarioError::DetachedHead {
                        x: seed.x,
                        y: seed.y,
                        head,
                    });
                }
                claim(head_pos)?;
            }
            if Direction::from_index(seed.compass).is_none() {
                return Err(ScenarioError::InvalidDirection(seed.compass));
            }
            if let ProgramSeed::Walker { direction } = seed.program {
                if Direction::from_index(direction).is_none() {
                    return Err(ScenarioError::InvalidDirection(direction));
                }
            }
        }
        for seed in &file.objects {
            let anchor = GridPos::new(seed.x, seed.y);
            claim(anchor)?;
            for offset in &seed.offsets {
                let node = anchor + GridVec::new(offset[0], offset[1]);
                if node != anchor {
                    claim(node)?;
                }
            }
        }
        Ok(Self {
            name: file.name,
            anchor: file.anchor.map(ParticleId),
            particles: file.particles,
            objects: file.objects,
        })
    }

    pub fn from_str(data: &str) -> Result<Self, ScenarioError> {
        Self::from_file(serde_json::from_str(data)?)
    }
}

/// Resource handle to the scenario the startup system spawns from.
#[derive(Resource, Debug, Clone)]
pub struct ScenarioHandle(pub Arc<Scenario>);

/// Load the scenario named by `SCENARIO_PATH`, falling back to the builtin
/// default on any failure.
pub fn load_scenario_from_env() -> Arc<Scenario> {
    if let Ok(path) = env::var("SCENARIO_PATH") {
        let path = PathBuf::from(path);
        match read_scenario_from_file(&path) {
            Ok(scenario) => return Arc::new(scenario),
            Err(err) => {
                tracing::warn!(
                    target: "amoebot::scenario",
                    path = %path.display(),
                    error = %err,
                    "scenario.load_failed"
                );
            }
        }
    }
    Arc::new(Scenario::from_str(BUILTIN_SCENARIO).expect("builtin scenario should parse"))
}

fn read_scenario_from_file(path: &Path) -> Result<Scenario, ScenarioError> {
    let contents = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Scenario::from_str(&contents)
}

fn build_program(seed: &ProgramSeed) -> Box<dyn ParticleProgram> {
    match seed {
        ProgramSeed::Idle => Box::new(IdleProgram),
        ProgramSeed::Walker { direction } => Box::new(WalkerProgram {
            direction: Direction::from_index(*direction)
                .expect("validated at scenario construction"),
        }),
    }
}

/// Startup system: spawn the scenario's particles and objects at round zero.
pub fn spawn_initial_world(
    mut commands: Commands,
    scenario: Res<ScenarioHandle>,
    mut anchor: ResMut<Anchor>,
) {
    let scenario = Arc::clone(&scenario.0);
    for (index, seed) in scenario.particles.iter().enumerate() {
        let id = ParticleId(index as u32);
        let compass = Compass::new(
            seed.chirality,
            Direction::from_index(seed.compass).expect("validated at scenario construction"),
        );
        let tail = GridPos::new(seed.x, seed.y);
        let particle = match seed.head {
            Some(head) => {
                Particle::expanded(id, GridPos::new(head[0], head[1]), tail, compass, 0)
            }
            None => Particle::contracted(id, tail, compass, 0),
        };
        commands.spawn((particle, ProgramSlot(build_program(&seed.program))));
    }
    for (index, seed) in scenario.objects.iter().enumerate() {
        commands.spawn(ParticleObject::new(
            ObjectId(index as u32),
            GridPos::new(seed.x, seed.y),
            seed.offsets
                .iter()
                .map(|offset| GridVec::new(offset[0], offset[1]))
                .collect(),
            0,
        ));
    }
    anchor.particle = scenario.anchor;
    tracing::info!(
        target: "amoebot::scenario",
        name = %scenario.name,
        particles = scenario.particles.len(),
        objects = scenario.objects.len(),
        "scenario.spawned"
    );
}

/// Generate a connected configuration of `count` contracted idle particles
/// by seeded random accretion. Deterministic for a given seed.
pub fn random_connected_scenario(seed: u64, count: usize) -> Scenario {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut nodes: Vec<GridPos> = vec![GridPos::new(0, 0)];
    let mut occupied: HashSet<GridPos> = nodes.iter().copied().collect();
    while nodes.len() < count.max(1) {
        let &base = nodes.choose(&mut rng).expect("accretion starts non-empty");
        let direction = Direction::ALL[rng.gen_range(0..Direction::COUNT)];
        let candidate = base.neighbor(direction);
        if occupied.insert(candidate) {
            nodes.push(candidate);
        }
    }
    Scenario {
        name: format!("random-{seed}"),
        anchor: Some(ParticleId(0)),
        particles: nodes
            .into_iter()
            .map(|node| ParticleSeed {
                x: node.x,
                y: node.y,
                head: None,
                chirality: Chirality::CounterClockwise,
                compass: 0,
                program: ProgramSeed::Idle,
            })
            .collect(),
        objects: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_scenario_parses_and_validates() {
        let scenario = Scenario::from_str(BUILTIN_SCENARIO).expect("builtin is valid");
        assert!(!scenario.particles.is_empty());
    }

    #[test]
    fn duplicate_nodes_are_rejected() {
        let data = r#"{
            "name": "overlap",
            "particles": [
                {"x": 0, "y": 0},
                {"x": 0, "y": 0}
            ]
        }"#;
        assert!(matches!(
            Scenario::from_str(data),
            Err(ScenarioError::DuplicateNode(0, 0))
        ));
    }

    #[test]
    fn detached_heads_are_rejected() {
        let data = r#"{
            "name": "detached",
            "particles": [{"x": 0, "y": 0, "head": [2, 0]}]
        }"#;
        assert!(matches!(
            Scenario::from_str(data),
            Err(ScenarioError::DetachedHead { .. })
        ));
    }

    #[test]
    fn random_accretion_is_connected_and_deterministic() {
        let a = random_connected_scenario(7, 24);
        let b = random_connected_scenario(7, 24);
        assert_eq!(a.particles.len(), 24);
        assert_eq!(
            a.particles.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>(),
            b.particles.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>()
        );

        // Every node joined adjacent to an existing one, so a flood fill
        // from the first reaches all of them.
        let occupied: HashSet<GridPos> = a
            .particles
            .iter()
            .map(|p| GridPos::new(p.x, p.y))
            .collect();
        let mut seen = HashSet::new();
        let mut queue = vec![GridPos::new(0, 0)];
        while let Some(node) = queue.pop() {
            if !occupied.contains(&node) || !seen.insert(node) {
                continue;
            }
            for dir in Direction::ALL {
                queue.push(node.neighbor(dir));
            }
        }
        assert_eq!(seen.len(), occupied.len());
    }
}
