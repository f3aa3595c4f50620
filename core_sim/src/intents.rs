use std::collections::HashMap;

use bevy::prelude::Resource;
use thiserror::Error;

use crate::{
    components::{Part, ParticleId, UnitId},
    grid::{Compass, Direction, GridPos},
    resources::Occupant,
};

/// Movement requested by a particle for the current round.
///
/// Directions are local to the particle; the engine converts them through
/// the compass when the round resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveAction {
    #[default]
    Idle,
    Expand {
        direction: Direction,
    },
    Contract {
        into_head: bool,
    },
    /// Expanded side of a handover: contract and let `partner` expand into
    /// the vacated node.
    Pull {
        partner: ParticleId,
        into_head: bool,
    },
    /// Contracted side of a handover: expand toward `partner`'s retracting
    /// part.
    Push {
        partner: ParticleId,
        direction: Direction,
    },
}

/// Everything a particle stages during its movement activation.
#[derive(Debug, Clone, Default)]
pub struct MoveIntent {
    pub action: MoveAction,
    /// Bond slots released this round (local directions).
    pub releases: Vec<(Part, Direction)>,
    /// Bonds marked to travel with the head on expansion (local directions).
    pub marks: Vec<Direction>,
    pub color: Option<u32>,
}

/// Beep sends staged during the communication phase (local directions).
#[derive(Debug, Clone, Default)]
pub struct BeepIntent {
    pub sends: Vec<(Part, Direction)>,
}

/// Error raised from inside a particle's program.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ProgramError(pub String);

impl From<&str> for ProgramError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for ProgramError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// The activation contract the engine consumes from algorithm code.
///
/// Both callbacks run under the two-pass discipline: they observe the
/// committed pre-round state and may only stage intentions through the
/// context they are handed. They must run to completion synchronously.
pub trait ParticleProgram: Send + Sync {
    fn activate_move(&mut self, ctx: &mut MoveActivation<'_>) -> Result<(), ProgramError>;

    fn activate_beep(&mut self, _ctx: &mut BeepActivation<'_>) -> Result<(), ProgramError> {
        Ok(())
    }
}

/// What a particle can learn about an adjacent occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborInfo {
    pub unit: UnitId,
    pub expanded: bool,
    /// Whether the adjacent node is the occupant's head.
    pub is_head: bool,
}

/// Read-only local view of one particle during an activation.
#[derive(Debug, Clone, Copy)]
pub struct ParticleView<'a> {
    pub(crate) id: ParticleId,
    pub(crate) compass: Compass,
    pub(crate) head: GridPos,
    pub(crate) tail: GridPos,
    pub(crate) heard: u16,
    pub(crate) round: u64,
    pub(crate) occupancy: &'a HashMap<GridPos, Occupant>,
}

impl<'a> ParticleView<'a> {
    pub fn id(&self) -> ParticleId {
        self.id
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn is_expanded(&self) -> bool {
        self.head != self.tail
    }

    /// Local direction from tail to head, when expanded.
    pub fn head_direction(&self) -> Option<Direction> {
        self.tail
            .direction_to(self.head)
            .map(|global| self.compass.global_to_local(global))
    }

    fn part_pos(&self, part: Part) -> GridPos {
        match part {
            Part::Head => self.head,
            Part::Tail => self.tail,
        }
    }

    fn slot_node(&self, part: Part, local: Direction) -> GridPos {
        self.part_pos(part)
            .neighbor(self.compass.local_to_global(local))
    }

    /// Occupant adjacent to the given bond slot, excluding this particle's
    /// own other part.
    pub fn neighbor(&self, part: Part, local: Direction) -> Option<NeighborInfo> {
        let occupant = self.occupancy.get(&self.slot_node(part, local))?;
        if occupant.unit == UnitId::Particle(self.id) {
            return None;
        }
        Some(NeighborInfo {
            unit: occupant.unit,
            expanded: occupant.expanded,
            is_head: occupant.is_head,
        })
    }

    /// Whether the node adjacent to the slot is unoccupied.
    pub fn node_is_empty(&self, part: Part, local: Direction) -> bool {
        !self.occupancy.contains_key(&self.slot_node(part, local))
    }

    /// Whether a beep arrived on the slot in the previous round.
    pub fn heard_beep(&self, part: Part, local: Direction) -> bool {
        let global = self.compass.local_to_global(local);
        let bit = match part {
            Part::Head => global.index(),
            Part::Tail => 6 + global.index(),
        };
        self.heard & (1 << bit) != 0
    }

    pub fn heard_any_beep(&self) -> bool {
        self.heard != 0
    }
}

/// Staging context for the movement phase.
pub struct MoveActivation<'a> {
    pub(crate) view: ParticleView<'a>,
    pub(crate) intent: &'a mut MoveIntent,
}

impl<'a> MoveActivation<'a> {
    pub fn view(&self) -> &ParticleView<'a> {
        &self.view
    }

    pub fn expand(&mut self, direction: Direction) {
        self.intent.action = MoveAction::Expand { direction };
    }

    pub fn contract_into_head(&mut self) {
        self.intent.action = MoveAction::Contract { into_head: true };
    }

    pub fn contract_into_tail(&mut self) {
        self.intent.action = MoveAction::Contract { into_head: false };
    }

    pub fn pull(&mut self, partner: ParticleId, into_head: bool) {
        self.intent.action = MoveAction::Pull { partner, into_head };
    }

    pub fn push(&mut self, partner: ParticleId, direction: Direction) {
        self.intent.action = MoveAction::Push { partner, direction };
    }

    pub fn release_bond(&mut self, part: Part, direction: Direction) {
        self.intent.releases.push((part, direction));
    }

    pub fn mark_bond(&mut self, direction: Direction) {
        self.intent.marks.push(direction);
    }

    pub fn set_color(&mut self, color: u32) {
        self.intent.color = Some(color);
    }
}

/// Staging context for the communication phase.
pub struct BeepActivation<'a> {
    pub(crate) view: ParticleView<'a>,
    pub(crate) intent: &'a mut BeepIntent,
}

impl<'a> BeepActivation<'a> {
    pub fn view(&self) -> &ParticleView<'a> {
        &self.view
    }

    pub fn beep(&mut self, part: Part, direction: Direction) {
        self.intent.sends.push((part, direction));
    }

    /// Beep on every slot of the given part.
    pub fn beep_all(&mut self, part: Part) {
        for direction in Direction::ALL {
            self.intent.sends.push((part, direction));
        }
    }
}

/// Per-round collection of staged intentions.
///
/// Programs stage through their activation contexts; the resolution pass
/// drains in ascending particle-id order so outcomes never depend on
/// iteration order.
#[derive(Resource, Debug, Default)]
pub struct IntentQueue {
    moves: HashMap<ParticleId, MoveIntent>,
    beeps: HashMap<ParticleId, BeepIntent>,
}

impl IntentQueue {
    pub fn stage_move(&mut self, particle: ParticleId, intent: MoveIntent) {
        self.moves.insert(particle, intent);
    }

    pub fn stage_beep(&mut self, particle: ParticleId, intent: BeepIntent) {
        self.beeps.insert(particle, intent);
    }

    pub fn move_intent(&self, particle: ParticleId) -> Option<&MoveIntent> {
        self.moves.get(&particle)
    }

    pub fn sorted_moves(&self) -> Vec<(ParticleId, &MoveIntent)> {
        let mut collected: Vec<_> = self.moves.iter().map(|(id, intent)| (*id, intent)).collect();
        collected.sort_by_key(|(id, _)| *id);
        collected
    }

    pub fn sorted_beeps(&self) -> Vec<(ParticleId, &BeepIntent)> {
        let mut collected: Vec<_> = self.beeps.iter().map(|(id, intent)| (*id, intent)).collect();
        collected.sort_by_key(|(id, _)| *id);
        collected
    }

    pub fn clear(&mut self) {
        self.moves.clear();
        self.beeps.clear();
    }
}
