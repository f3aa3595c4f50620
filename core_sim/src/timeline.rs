//! World-level history navigation.
//!
//! Every stateful entity owns its trackers; these helpers move all markers
//! in lock-step so the whole simulation scrubs as one timeline. While the
//! cursor is parked in the past the engine refuses to execute rounds;
//! resuming discards the stale future from every tracker and from the
//! snapshot ring.

use bevy::prelude::*;

use crate::{
    components::{Particle, ParticleObject},
    resources::{SimulationRound, TimelineCursor},
    snapshot::SnapshotHistory,
    systems::RoundContext,
};

pub fn view_round(world: &World) -> u64 {
    world.resource::<TimelineCursor>().view
}

pub fn latest_round(world: &World) -> u64 {
    world.resource::<SimulationRound>().0
}

/// Park every tracker's marker at `round`, clamped to the recorded range.
/// Returns the view round actually reached.
pub fn jump_to_round(world: &mut World, round: u64) -> u64 {
    let target = round.min(latest_round(world));
    let mut particles = world.query::<&mut Particle>();
    for mut particle in particles.iter_mut(world) {
        particle.head.set_marker_to_round(target);
        particle.tail.set_marker_to_round(target);
        particle.color.set_marker_to_round(target);
        particle.heard_beeps.set_marker_to_round(target);
    }
    let mut objects = world.query::<&mut ParticleObject>();
    for mut object in objects.iter_mut(world) {
        object.anchor.set_marker_to_round(target);
    }
    let mut cursor = world.resource_mut::<TimelineCursor>();
    cursor.view = target;
    cursor.paused = true;
    tracing::debug!(target: "amoebot::timeline", view = target, "timeline.jumped");
    target
}

/// Step the view one round back.
pub fn step_back(world: &mut World) -> u64 {
    let view = view_round(world);
    jump_to_round(world, view.saturating_sub(1))
}

/// Step the view one round forward, clamped to the latest committed round.
pub fn step_forward(world: &mut World) -> u64 {
    let view = view_round(world);
    jump_to_round(world, view + 1)
}

/// Resume forward simulation from the current view, discarding every
/// recording later than the view. Clears a halt left by a failed round.
pub fn continue_tracking(world: &mut World) {
    let view = view_round(world);
    let mut particles = world.query::<&mut Particle>();
    for mut particle in particles.iter_mut(world) {
        particle.head.continue_tracking();
        particle.tail.continue_tracking();
        particle.color.continue_tracking();
        particle.heard_beeps.continue_tracking();
    }
    let mut objects = world.query::<&mut ParticleObject>();
    for mut object in objects.iter_mut(world) {
        object.anchor.continue_tracking();
    }
    world.resource_mut::<SimulationRound>().0 = view;
    {
        let mut cursor = world.resource_mut::<TimelineCursor>();
        cursor.view = view;
        cursor.paused = false;
    }
    {
        let mut ctx = world.resource_mut::<RoundContext>();
        ctx.failure = None;
        ctx.halted = false;
    }
    world.resource_mut::<SnapshotHistory>().prune_after(view);
    tracing::info!(target: "amoebot::timeline", round = view, "timeline.resumed");
}

/// Truncate recordings after the view without resuming.
pub fn cut_off(world: &mut World) {
    let view = view_round(world);
    let mut particles = world.query::<&mut Particle>();
    for mut particle in particles.iter_mut(world) {
        particle.head.cut_off_at_marker();
        particle.tail.cut_off_at_marker();
        particle.color.cut_off_at_marker();
        particle.heard_beeps.cut_off_at_marker();
    }
    let mut objects = world.query::<&mut ParticleObject>();
    for mut object in objects.iter_mut(world) {
        object.anchor.cut_off_at_marker();
    }
    world.resource_mut::<SimulationRound>().0 = view;
    world.resource_mut::<SnapshotHistory>().prune_after(view);
    tracing::info!(target: "amoebot::timeline", round = view, "timeline.cut_off");
}

/// Re-index the whole simulation's round counter by a constant offset,
/// clamped so no recording moves below round zero.
pub fn shift_timescale(world: &mut World, delta: i64) -> i64 {
    let mut earliest = u64::MAX;
    let mut particles = world.query::<&Particle>();
    for particle in particles.iter(world) {
        earliest = earliest.min(particle.head.first_round());
    }
    let mut objects = world.query::<&ParticleObject>();
    for object in objects.iter(world) {
        earliest = earliest.min(object.anchor.first_round());
    }
    if earliest == u64::MAX {
        earliest = 0;
    }
    let applied = delta.max(-(earliest as i64));

    let mut particles = world.query::<&mut Particle>();
    for mut particle in particles.iter_mut(world) {
        particle.head.shift_timescale(applied);
        particle.tail.shift_timescale(applied);
        particle.color.shift_timescale(applied);
        particle.heard_beeps.shift_timescale(applied);
    }
    let mut objects = world.query::<&mut ParticleObject>();
    for mut object in objects.iter_mut(world) {
        object.anchor.shift_timescale(applied);
    }
    {
        let mut round = world.resource_mut::<SimulationRound>();
        round.0 = (round.0 as i64 + applied) as u64;
    }
    {
        let mut cursor = world.resource_mut::<TimelineCursor>();
        cursor.view = (cursor.view as i64 + applied) as u64;
    }
    world.resource_mut::<SnapshotHistory>().shift_rounds(applied);
    tracing::info!(target: "amoebot::timeline", delta = applied, "timeline.shifted");
    applied
}
