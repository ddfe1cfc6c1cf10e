use bevy::math::Vec3;
use rand::{Rng, rngs::StdRng};

use super::planar;
use crate::agent::FlockAgent;

/// Move towards the center of the neighbors. An agent with no neighbors
/// heads for a random other member of the flock instead, so stragglers
/// drift back to the group. An agent alone in its flock gets zero.
pub fn steer(
    agent: &FlockAgent,
    neighbors: &[&FlockAgent],
    flock: &[FlockAgent],
    rng: &mut StdRng,
) -> Vec3 {
    if neighbors.is_empty() {
        return seek_random_member(agent, flock, rng);
    }

    let center = neighbors
        .iter()
        .fold(Vec3::ZERO, |acc, neighbor| acc + neighbor.position)
        / neighbors.len() as f32;
    planar(center - agent.position)
}

fn seek_random_member(agent: &FlockAgent, flock: &[FlockAgent], rng: &mut StdRng) -> Vec3 {
    let others = flock
        .iter()
        .filter(|other| other.id != agent.id)
        .collect::<Vec<_>>();
    if others.is_empty() {
        return Vec3::ZERO;
    }
    let pick = others[rng.random_range(0..others.len())];
    planar(pick.position - agent.position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use rand::SeedableRng;

    fn agent_at(id: u64, position: Vec3) -> FlockAgent {
        FlockAgent::new(AgentId(id), position, Vec3::Z)
    }

    #[test]
    fn test_moves_towards_center() {
        let me = agent_at(0, Vec3::ZERO);
        let a = agent_at(1, Vec3::new(2.0, 0.0, 1.0));
        let b = agent_at(2, Vec3::new(2.0, 0.0, -1.0));
        let mut rng = StdRng::seed_from_u64(1);
        let dir = steer(&me, &[&a, &b], &[me, a, b], &mut rng);
        assert!(dir.abs_diff_eq(Vec3::X, 0.0001), "Got {:?}", dir);
    }

    #[test]
    fn test_lone_agent_seeks_other_member() {
        let me = agent_at(0, Vec3::ZERO);
        let far = agent_at(1, Vec3::new(0.0, 0.0, -20.0));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let dir = steer(&me, &[], &[me, far], &mut rng);
            assert!(dir.abs_diff_eq(Vec3::NEG_Z, 0.0001), "Got {:?}", dir);
        }
    }

    #[test]
    fn test_alone_in_flock_is_zero() {
        let me = agent_at(0, Vec3::ZERO);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(steer(&me, &[], &[me], &mut rng), Vec3::ZERO);
        assert_eq!(steer(&me, &[], &[], &mut rng), Vec3::ZERO);
    }

    #[test]
    fn test_fallback_is_deterministic_for_seed() {
        let flock = (0..6)
            .map(|i| agent_at(i, Vec3::new(i as f32 * 3.0, 0.0, (i * i) as f32)))
            .collect::<Vec<_>>();
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        for _ in 0..20 {
            assert_eq!(
                steer(&flock[0], &[], &flock, &mut rng_a),
                steer(&flock[0], &[], &flock, &mut rng_b)
            );
        }
    }
}
