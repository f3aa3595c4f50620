use bevy::prelude::App;
use core_sim::{
    build_app_from_scenario, history_export, marked_snapshot, restore_from_history, run_round,
    timeline, Particle, RoundError, Scenario, SimulationRound, SnapshotHistory, BUILTIN_SCENARIO,
};

fn walker_app(rounds: usize) -> App {
    let scenario = Scenario::from_str(BUILTIN_SCENARIO).expect("builtin scenario parses");
    let mut app = build_app_from_scenario(scenario);
    for _ in 0..rounds {
        run_round(&mut app).expect("builtin scenario never faults");
    }
    app
}

#[test]
fn marked_snapshot_matches_the_stored_snapshot_of_that_round() {
    let mut app = walker_app(8);
    timeline::jump_to_round(&mut app.world, 5);

    let marked = marked_snapshot(&mut app.world);
    let stored = app
        .world
        .resource::<SnapshotHistory>()
        .entry(5)
        .expect("round 5 retained");

    assert_eq!(marked.header.round, 5);
    assert_eq!(marked.particles, stored.snapshot.particles);
    assert_eq!(marked.header.hash, stored.snapshot.header.hash);
}

#[test]
fn stepping_back_and_forward_restores_the_latest_view() {
    let mut app = walker_app(6);
    let latest = marked_snapshot(&mut app.world);

    timeline::step_back(&mut app.world);
    timeline::step_back(&mut app.world);
    assert_eq!(timeline::view_round(&app.world), 4);
    timeline::step_forward(&mut app.world);
    timeline::step_forward(&mut app.world);

    let replayed = marked_snapshot(&mut app.world);
    assert_eq!(latest.particles, replayed.particles);
    assert_eq!(timeline::latest_round(&app.world), 6);
}

#[test]
fn rounds_refuse_to_run_while_the_view_is_parked() {
    let mut app = walker_app(4);
    timeline::jump_to_round(&mut app.world, 2);

    let error = run_round(&mut app).expect_err("paused timeline");
    assert!(matches!(
        error,
        RoundError::HistoryPaused { view: 2, latest: 4 }
    ));
}

#[test]
fn resuming_from_the_past_discards_the_stale_future() {
    let mut app = walker_app(10);
    timeline::jump_to_round(&mut app.world, 4);
    timeline::continue_tracking(&mut app.world);

    assert_eq!(app.world.resource::<SimulationRound>().0, 4);
    let mut query = app.world.query::<&Particle>();
    for particle in query.iter(&app.world) {
        assert!(particle.head.latest_round() <= 4);
        assert!(particle.tail.latest_round() <= 4);
    }
    assert!(app
        .world
        .resource::<SnapshotHistory>()
        .entry(5)
        .is_none());

    run_round(&mut app).expect("forward simulation resumes");
    assert_eq!(app.world.resource::<SimulationRound>().0, 5);
    let mut query = app.world.query::<&Particle>();
    for particle in query.iter(&app.world) {
        assert!(particle.head.latest_round() <= 5);
    }
}

#[test]
fn cut_off_truncates_but_stays_paused() {
    let mut app = walker_app(6);
    timeline::jump_to_round(&mut app.world, 3);
    timeline::cut_off(&mut app.world);

    assert_eq!(timeline::latest_round(&app.world), 3);
    assert!(matches!(
        run_round(&mut app),
        Err(RoundError::HistoryPaused { .. })
    ));
    timeline::continue_tracking(&mut app.world);
    run_round(&mut app).expect("resumed after cut off");
}

#[test]
fn shifting_the_timescale_rebases_every_round_index() {
    let mut app = walker_app(5);
    let before = marked_snapshot(&mut app.world);

    let applied = timeline::shift_timescale(&mut app.world, 100);
    assert_eq!(applied, 100);
    assert_eq!(timeline::latest_round(&app.world), 105);
    assert!(app
        .world
        .resource::<SnapshotHistory>()
        .entry(105)
        .is_some());

    // Shifting further into the past than round zero is clamped.
    let applied = timeline::shift_timescale(&mut app.world, -1000);
    assert_eq!(applied, -100);
    assert_eq!(timeline::latest_round(&app.world), 5);
    let after = marked_snapshot(&mut app.world);
    assert_eq!(before.particles, after.particles);
}

#[test]
fn history_export_restores_an_identical_timeline() -> anyhow::Result<()> {
    let mut app = walker_app(7);
    let export = history_export(&mut app.world);
    let reference = marked_snapshot(&mut app.world);

    // The persistence surface is plain serde data; ship it through JSON the
    // way a save file would.
    let serialized = serde_json::to_string(&export)?;
    let export: sim_runtime::HistoryExport = serde_json::from_str(&serialized)?;

    let scenario = Scenario::from_str(BUILTIN_SCENARIO).expect("builtin scenario parses");
    let mut restored_app = build_app_from_scenario(scenario);
    // Initialize the fresh world, then replace its contents wholesale.
    restored_app.update();
    restore_from_history(&mut restored_app.world, &export);

    assert_eq!(restored_app.world.resource::<SimulationRound>().0, 7);
    let round_trip = history_export(&mut restored_app.world);
    assert_eq!(export, round_trip);
    let snapshot = marked_snapshot(&mut restored_app.world);
    assert_eq!(reference.particles, snapshot.particles);
    assert_eq!(reference.objects, snapshot.objects);
    Ok(())
}
