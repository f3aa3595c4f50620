#![allow(dead_code)]

use bevy::prelude::App;

use core_sim::{
    build_app_from_scenario, Compass, GridPos, IdleProgram, MoveAction, MoveIntent, Particle,
    ParticleId, ParticleObject, ParticleProgram, ProgramSlot, Scenario, ScriptedProgram,
    ScriptedStep,
};

/// Build an app with an empty scenario and spawn the given particles and
/// objects directly, so tests can attach scripted programs.
pub fn app_with(
    anchor: Option<u32>,
    particles: Vec<(Particle, Box<dyn ParticleProgram>)>,
    objects: Vec<ParticleObject>,
) -> App {
    let scenario = Scenario {
        name: "test".to_string(),
        anchor: anchor.map(ParticleId),
        particles: Vec::new(),
        objects: Vec::new(),
    };
    let mut app = build_app_from_scenario(scenario);
    for (particle, program) in particles {
        app.world.spawn((particle, ProgramSlot(program)));
    }
    for object in objects {
        app.world.spawn(object);
    }
    app
}

pub fn contracted(id: u32, x: i32, y: i32) -> Particle {
    Particle::contracted(ParticleId(id), GridPos::new(x, y), Compass::default(), 0)
}

pub fn expanded(id: u32, head: (i32, i32), tail: (i32, i32)) -> Particle {
    Particle::expanded(
        ParticleId(id),
        GridPos::new(head.0, head.1),
        GridPos::new(tail.0, tail.1),
        Compass::default(),
        0,
    )
}

pub fn idle() -> Box<dyn ParticleProgram> {
    Box::new(IdleProgram)
}

/// One scripted round per entry, idling afterwards. The default compass
/// (counter-clockwise, offset east) makes local directions read as global.
pub fn script(actions: Vec<MoveIntent>) -> Box<dyn ParticleProgram> {
    Box::new(ScriptedProgram::new(
        actions.into_iter().map(ScriptedStep::from_intent).collect(),
    ))
}

pub fn script_steps(steps: Vec<ScriptedStep>) -> Box<dyn ParticleProgram> {
    Box::new(ScriptedProgram::new(steps))
}

pub fn intent(action: MoveAction) -> MoveIntent {
    MoveIntent {
        action,
        ..Default::default()
    }
}

/// Committed head/tail positions of a particle by id.
pub fn positions_of(app: &mut App, id: u32) -> (GridPos, GridPos) {
    let mut query = app.world.query::<&Particle>();
    let particle = query
        .iter(&app.world)
        .find(|particle| particle.id == ParticleId(id))
        .expect("particle exists");
    (particle.head_pos(), particle.tail_pos())
}
