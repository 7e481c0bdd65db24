//! Pseudo-user identity derivation.

use rand::Rng;

/// Identity space for steady-state traffic. Draws collide across clients,
/// which models returning users.
pub const STEADY_STATE_USERS: u64 = 100_000;

/// Identity for steady-state traffic: a uniform draw over the fixed user
/// universe, scoped to a single operation.
pub fn steady_state_id<R: Rng>(rng: &mut R) -> String {
    format!("user_{}", rng.gen_range(0..STEADY_STATE_USERS))
}

/// Identity for seeding traffic: a pure function of the global iteration
/// index, so a full seeding pass of N iterations produces exactly the
/// identities `user_0..user_{N-1}` with no collisions.
pub fn seeded_id(iteration: u64) -> String {
    format!("user_{}", iteration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_seeded_ids_are_a_bijection() {
        let ids: Vec<String> = (0..5).map(seeded_id).collect();
        assert_eq!(ids, vec!["user_0", "user_1", "user_2", "user_3", "user_4"]);
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_steady_state_id_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let id = steady_state_id(&mut rng);
            let n: u64 = id.strip_prefix("user_").unwrap().parse().unwrap();
            assert!(n < STEADY_STATE_USERS);
        }
    }
}
