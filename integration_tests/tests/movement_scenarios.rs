mod common;

use common::{app_with, contracted, expanded, idle, intent, positions_of, script};
use core_sim::{
    run_round, timeline, Direction, GridPos, MoveAction, MovementError, ParticleId, RoundError,
};

#[test]
fn expansion_without_marking_leaves_the_bond_and_neighbor_in_place() {
    let mut app = app_with(
        Some(0),
        vec![
            (
                contracted(0, 0, 0),
                script(vec![intent(MoveAction::Expand {
                    direction: Direction::NorthEast,
                })]),
            ),
            (contracted(1, 1, 0), idle()),
        ],
        vec![],
    );

    run_round(&mut app).expect("expansion commits");

    let (head, tail) = positions_of(&mut app, 0);
    assert_eq!(head, GridPos::new(0, 1));
    assert_eq!(tail, GridPos::new(0, 0));
    let (n_head, n_tail) = positions_of(&mut app, 1);
    assert_eq!(n_head, GridPos::new(1, 0));
    assert_eq!(n_tail, GridPos::new(1, 0));
}

#[test]
fn middle_contraction_with_one_bond_per_side_succeeds() {
    let mut app = app_with(
        Some(0),
        vec![
            (contracted(0, 0, 0), idle()),
            (
                expanded(1, (1, 0), (2, 0)),
                script(vec![intent(MoveAction::Contract { into_head: true })]),
            ),
            (contracted(2, 3, 0), idle()),
        ],
        vec![],
    );

    run_round(&mut app).expect("contraction commits");

    let (head, tail) = positions_of(&mut app, 1);
    assert_eq!((head, tail), (GridPos::new(1, 0), GridPos::new(1, 0)));
    // The trailing neighbor is pulled one step along the carried bond.
    let (t_head, _) = positions_of(&mut app, 2);
    assert_eq!(t_head, GridPos::new(2, 0));
}

#[test]
fn three_bonds_to_one_neighbor_abort_the_round() {
    let mut app = app_with(
        Some(0),
        vec![
            (
                expanded(0, (1, 0), (2, 0)),
                script(vec![intent(MoveAction::Contract { into_head: true })]),
            ),
            (expanded(1, (1, 1), (2, 1)), idle()),
        ],
        vec![],
    );

    let error = run_round(&mut app).expect_err("conflicting drags");
    assert!(matches!(
        error,
        RoundError::Movement(MovementError::ConflictingOffsets { .. })
    ));

    // Nothing committed: both particles still at their pre-round nodes.
    assert_eq!(
        positions_of(&mut app, 0),
        (GridPos::new(1, 0), GridPos::new(2, 0))
    );
    assert_eq!(
        positions_of(&mut app, 1),
        (GridPos::new(1, 1), GridPos::new(2, 1))
    );

    // The simulation halts until the operator resumes.
    assert!(matches!(run_round(&mut app), Err(RoundError::Halted)));
    timeline::continue_tracking(&mut app.world);
    run_round(&mut app).expect("idle round after the contraction is withdrawn");
}

#[test]
fn disjoint_pairs_are_rejected_as_disconnected() {
    let mut app = app_with(
        Some(0),
        vec![
            (contracted(0, 0, 0), idle()),
            (contracted(1, 1, 0), idle()),
            (contracted(2, 10, 0), idle()),
            (contracted(3, 11, 0), idle()),
        ],
        vec![],
    );

    let error = run_round(&mut app).expect_err("split structure");
    assert!(matches!(
        error,
        RoundError::Movement(MovementError::Disconnected {
            unreachable: 2,
            total: 4
        })
    ));
}

#[test]
fn handover_pair_exchanges_occupancy() {
    let mut app = app_with(
        Some(0),
        vec![
            (contracted(0, 0, 0), idle()),
            (
                expanded(1, (1, 0), (2, 0)),
                script(vec![intent(MoveAction::Pull {
                    partner: ParticleId(2),
                    into_head: true,
                })]),
            ),
            (
                contracted(2, 3, 0),
                script(vec![intent(MoveAction::Push {
                    partner: ParticleId(1),
                    direction: Direction::West,
                })]),
            ),
        ],
        vec![],
    );

    run_round(&mut app).expect("handover commits");

    assert_eq!(
        positions_of(&mut app, 1),
        (GridPos::new(1, 0), GridPos::new(1, 0))
    );
    assert_eq!(
        positions_of(&mut app, 2),
        (GridPos::new(2, 0), GridPos::new(3, 0))
    );
}

#[test]
fn one_sided_handover_aborts_with_mismatch() {
    let mut app = app_with(
        Some(0),
        vec![
            (contracted(0, 0, 0), idle()),
            (
                expanded(1, (1, 0), (2, 0)),
                script(vec![intent(MoveAction::Pull {
                    partner: ParticleId(2),
                    into_head: true,
                })]),
            ),
            (contracted(2, 3, 0), idle()),
        ],
        vec![],
    );

    let error = run_round(&mut app).expect_err("partner never pushes");
    assert!(matches!(
        error,
        RoundError::Movement(MovementError::HandoverMismatch { .. })
    ));
}
