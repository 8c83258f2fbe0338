use crate::types::{Player, Role};
use rand::seq::SliceRandom;

/// Deal roles for a new game: shuffle the roster uniformly, make the first
/// `num_cyborgs` players cyborgs and everyone else an agent. The shuffled
/// order becomes the new canonical player order.
///
/// Callers must have validated `num_cyborgs` against the roster size
/// beforehand; this function deals exactly what it is told to.
pub fn assign_roles(mut players: Vec<Player>, num_cyborgs: usize) -> Vec<Player> {
    players.shuffle(&mut rand::rng());
    for (i, player) in players.iter_mut().enumerate() {
        player.role = Some(if i < num_cyborgs {
            Role::Cyborg
        } else {
            Role::Agent
        });
    }
    players
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn roster(n: usize) -> Vec<Player> {
        (0..n)
            .map(|i| Player::new(format!("p{i}"), format!("Player {i}")))
            .collect()
    }

    #[test]
    fn exact_role_counts_for_all_valid_configurations() {
        for n in 3..=10usize {
            for c in 1..n.div_ceil(2) {
                let players = assign_roles(roster(n), c);
                assert_eq!(players.len(), n);
                let cyborgs = players
                    .iter()
                    .filter(|p| p.role == Some(Role::Cyborg))
                    .count();
                let agents = players
                    .iter()
                    .filter(|p| p.role == Some(Role::Agent))
                    .count();
                assert_eq!(cyborgs, c, "n={n} c={c}");
                assert_eq!(agents, n - c, "n={n} c={c}");
                assert!(players.iter().all(|p| p.role.is_some()));
            }
        }
    }

    #[test]
    fn ids_are_preserved() {
        let players = assign_roles(roster(7), 3);
        let ids: HashSet<_> = players.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), 7);
        for i in 0..7 {
            assert!(ids.contains(format!("p{i}").as_str()));
        }
    }

    #[test]
    fn every_player_ends_up_cyborg_somewhere() {
        // With one cyborg among four players, 200 shuffles should put the
        // cyborg role on every seat at least once.
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let players = assign_roles(roster(4), 1);
            let cyborg = players
                .iter()
                .find(|p| p.role == Some(Role::Cyborg))
                .unwrap();
            seen.insert(cyborg.id.clone());
        }
        assert_eq!(seen.len(), 4, "shuffle looks biased: {seen:?}");
    }
}
