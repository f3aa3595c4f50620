use std::collections::VecDeque;

use crate::{
    components::{Part, UnitId},
    grid::Direction,
    intents::{
        BeepActivation, MoveActivation, MoveIntent, ParticleProgram, ProgramError,
    },
};

/// A particle that never stages anything.
#[derive(Debug, Default, Clone)]
pub struct IdleProgram;

impl ParticleProgram for IdleProgram {
    fn activate_move(&mut self, _ctx: &mut MoveActivation<'_>) -> Result<(), ProgramError> {
        Ok(())
    }
}

/// One pre-planned round of a [`ScriptedProgram`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedStep {
    pub intent: MoveIntent,
    /// Beeps to send in the communication phase of the same round.
    pub beeps: Vec<(Part, Direction)>,
}

impl ScriptedStep {
    pub fn from_intent(intent: MoveIntent) -> Self {
        Self {
            intent,
            beeps: Vec::new(),
        }
    }
}

/// Plays back a fixed sequence of intents, one per round, then idles.
///
/// The test harness counterpart of real algorithm code: deterministic,
/// stateless beyond its queue, and useful for steering exact scenarios.
#[derive(Debug, Default, Clone)]
pub struct ScriptedProgram {
    steps: VecDeque<ScriptedStep>,
    current: Option<ScriptedStep>,
}

impl ScriptedProgram {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: steps.into(),
            current: None,
        }
    }
}

impl ParticleProgram for ScriptedProgram {
    fn activate_move(&mut self, ctx: &mut MoveActivation<'_>) -> Result<(), ProgramError> {
        self.current = self.steps.pop_front();
        if let Some(step) = &self.current {
            *ctx.intent = step.intent.clone();
        }
        Ok(())
    }

    fn activate_beep(&mut self, ctx: &mut BeepActivation<'_>) -> Result<(), ProgramError> {
        if let Some(step) = &self.current {
            for &(part, direction) in &step.beeps {
                ctx.beep(part, direction);
            }
        }
        Ok(())
    }
}

/// A program that fails on its first activation; exercises fault
/// attribution.
#[derive(Debug, Clone)]
pub struct FaultyProgram {
    pub message: String,
}

impl ParticleProgram for FaultyProgram {
    fn activate_move(&mut self, _ctx: &mut MoveActivation<'_>) -> Result<(), ProgramError> {
        Err(ProgramError(self.message.clone()))
    }
}

/// Two-phase walker: expands into free space along its travel direction and
/// hands over with the neighbor behind it.
///
/// A chain of walkers facing the same way crawls caterpillar-style: the
/// front particle expands, each expanded particle pulls the contracted
/// neighbor behind its tail, and lone expanded particles contract forward.
#[derive(Debug, Clone)]
pub struct WalkerProgram {
    /// Travel direction, local.
    pub direction: Direction,
}

impl ParticleProgram for WalkerProgram {
    fn activate_move(&mut self, ctx: &mut MoveActivation<'_>) -> Result<(), ProgramError> {
        let forward = self.direction;
        let backward = forward.opposite();
        if !ctx.view().is_expanded() {
            match ctx.view().neighbor(Part::Head, forward) {
                // The expanded neighbor ahead is retracting its tail toward
                // us; push into the node it vacates.
                Some(ahead) if ahead.expanded && !ahead.is_head => {
                    if let UnitId::Particle(partner) = ahead.unit {
                        ctx.push(partner, forward);
                    }
                }
                Some(_) => {}
                None => {
                    if ctx.view().node_is_empty(Part::Head, forward) {
                        ctx.expand(forward);
                    }
                }
            }
            return Ok(());
        }

        match ctx.view().neighbor(Part::Tail, backward) {
            Some(behind) if !behind.expanded => {
                if let UnitId::Particle(partner) = behind.unit {
                    ctx.pull(partner, true);
                }
            }
            _ => ctx.contract_into_head(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_program_drains_steps_in_order() {
        let mut program = ScriptedProgram::new(vec![
            ScriptedStep::from_intent(MoveIntent {
                action: crate::intents::MoveAction::Expand {
                    direction: Direction::East,
                },
                ..Default::default()
            }),
        ]);
        assert_eq!(program.steps.len(), 1);
        program.current = program.steps.pop_front();
        assert!(program.steps.is_empty());
        assert!(program.current.is_some());
    }
}
