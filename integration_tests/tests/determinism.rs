use core_sim::{
    build_app_from_scenario, run_round, Scenario, SnapshotHistory, BUILTIN_SCENARIO,
};
use sim_runtime::WorldSnapshot;

fn run_simulation(rounds: usize) -> WorldSnapshot {
    let scenario = Scenario::from_str(BUILTIN_SCENARIO).expect("builtin scenario parses");
    let mut app = build_app_from_scenario(scenario);
    for _ in 0..rounds {
        run_round(&mut app).expect("builtin scenario never faults");
    }
    app.world
        .resource::<SnapshotHistory>()
        .last_snapshot
        .as_deref()
        .cloned()
        .expect("snapshot available")
}

#[test]
fn identical_runs_commit_identical_snapshots() {
    let snapshot_a = run_simulation(40);
    let snapshot_b = run_simulation(40);

    assert_eq!(snapshot_a.header.hash, snapshot_b.header.hash);
    assert_eq!(snapshot_a.particles, snapshot_b.particles);
    assert_eq!(snapshot_a.objects, snapshot_b.objects);
}

#[test]
fn walkers_make_forward_progress() {
    let snapshot = run_simulation(30);
    // Every walker started at x <= 3 and the caterpillar gait moves the
    // chain east round over round.
    assert!(snapshot
        .particles
        .iter()
        .all(|particle| particle.head.x > 5));
}
