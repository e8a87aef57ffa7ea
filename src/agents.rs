// ============================================================================
// agents.rs — slimetrail
// Agent state and the fixed-size Agent Store with its step counter.
// ============================================================================

use std::collections::TryReserveError;
use std::f32::consts::TAU;

use bytemuck::{Pod, Zeroable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Agents spawn inside this half-extent so nobody starts against a wall.
pub const SPAWN_EXTENT: f32 = 0.9;

/// One agent; layout matches `struct Agent` in `agents.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Agent {
    pub x: f32,
    pub y: f32,
    /// Radians. Never normalised.
    pub heading: f32,
}

impl Agent {
    pub fn new(x: f32, y: f32, heading: f32) -> Self {
        Self { x, y, heading }
    }

    pub fn position(&self) -> [f32; 2] {
        [self.x, self.y]
    }
}

/// Fixed population plus the approximate step counter used to seed jitter.
#[derive(Clone, Debug)]
pub struct AgentStore {
    agents: Vec<Agent>,
    step: u32,
}

impl AgentStore {
    /// Uniform positions in the spawn square and uniform headings. The
    /// store is reserved up front so an oversized population is an error,
    /// not an abort.
    pub fn try_random(population: u32, seed: Option<u64>) -> Result<Self, TryReserveError> {
        let mut agents = reserve_agents(population as usize)?;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        agents.extend((0..population).map(|_| Agent {
            x: rng.gen_range(-SPAWN_EXTENT..SPAWN_EXTENT),
            y: rng.gen_range(-SPAWN_EXTENT..SPAWN_EXTENT),
            heading: rng.gen_range(0.0..TAU),
        }));
        Ok(Self { agents, step: 0 })
    }

    pub fn from_agents(agents: Vec<Agent>) -> Self {
        Self { agents, step: 0 }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Bumped once per frame on behalf of agent 0. Wraps on overflow.
    pub fn advance_step(&mut self) {
        self.step = self.step.wrapping_add(1);
    }
}

fn reserve_agents(count: usize) -> Result<Vec<Agent>, TryReserveError> {
    let mut agents = Vec::new();
    agents.try_reserve_exact(count)?;
    Ok(agents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_agents_spawn_inside_safe_interior() {
        let store = AgentStore::try_random(2000, Some(7)).unwrap();
        assert_eq!(store.len(), 2000);
        assert_eq!(store.step(), 0);
        for a in store.agents() {
            assert!(a.x.abs() <= SPAWN_EXTENT && a.y.abs() <= SPAWN_EXTENT);
            assert!((0.0..TAU).contains(&a.heading));
        }
    }

    #[test]
    fn seeded_init_is_repeatable() {
        let a = AgentStore::try_random(16, Some(42)).unwrap();
        let b = AgentStore::try_random(16, Some(42)).unwrap();
        assert_eq!(a.agents(), b.agents());
    }

    #[test]
    fn oversized_reservation_is_an_error() {
        assert!(reserve_agents(usize::MAX).is_err());
        assert_eq!(reserve_agents(0).unwrap().capacity(), 0);
    }

    #[test]
    fn agent_is_three_packed_floats() {
        assert_eq!(std::mem::size_of::<Agent>(), 12);
    }
}
