//! Deterministic-shape `adjective-noun` environment IDs.
//!
//! The teacher's dependency set has no RNG crate (it never needed random
//! data), so this generator draws its entropy from
//! [`std::collections::hash_map::RandomState`] — already in `std`, already
//! seeded per-process by the OS, and plenty for a low-stakes, low-collision
//! pick among a fixed word list. Pulling in `rand` for this would be adding
//! a dependency the rest of the crate has no other use for.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};

const ADJECTIVES: &[&str] = &[
    "agile", "amber", "brave", "calm", "clever", "cosmic", "crimson", "curious", "dapper",
    "eager", "fuzzy", "gentle", "golden", "happy", "hidden", "humble", "jolly", "keen", "lively",
    "lucky", "merry", "mighty", "misty", "nimble", "noble", "placid", "quiet", "rapid", "sage",
    "silent", "silver", "solid", "spry", "steady", "stormy", "sunny", "swift", "tidy", "vivid",
    "witty",
];

const NOUNS: &[&str] = &[
    "badger", "beacon", "breeze", "canyon", "cedar", "comet", "condor", "coral", "delta", "ember",
    "falcon", "fern", "fjord", "glacier", "harbor", "heron", "island", "jasper", "kestrel",
    "lagoon", "lantern", "lynx", "maple", "meadow", "otter", "panther", "pebble", "phoenix",
    "plateau", "quail", "raven", "reef", "ridge", "river", "sparrow", "summit", "tundra",
    "viper", "willow", "wren",
];

fn random_index(bound: usize) -> usize {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    (hasher.finish() as usize) % bound
}

fn random_pair() -> String {
    let adjective = ADJECTIVES[random_index(ADJECTIVES.len())];
    let noun = NOUNS[random_index(NOUNS.len())];
    format!("{adjective}-{noun}")
}

/// Generate an ID that doesn't collide with `existing` (a set of branch/ID
/// names already in the fork). Retries a handful of random pairs, then
/// falls back to a numeric suffix on the last attempted pair so the
/// function always terminates.
pub fn generate(existing: &[String]) -> String {
    const MAX_RETRIES: usize = 20;

    let mut candidate = random_pair();
    for _ in 0..MAX_RETRIES {
        if !existing.iter().any(|e| e == &candidate) {
            return candidate;
        }
        candidate = random_pair();
    }

    let mut suffix = 2u32;
    loop {
        let candidate = format!("{candidate}-{suffix}");
        if !existing.iter().any(|e| e == &candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::validate_name;

    #[test]
    fn generated_ids_satisfy_naming_rules() {
        for _ in 0..500 {
            let id = random_pair();
            assert!(validate_name(&id).is_ok(), "generated invalid id: {id}");
        }
    }

    #[test]
    fn generate_avoids_existing_names() {
        let existing: Vec<String> = ADJECTIVES
            .iter()
            .flat_map(|a| NOUNS.iter().map(move |n| format!("{a}-{n}")))
            .collect();
        // Every combination already taken: must fall back to a numeric suffix.
        let id = generate(&existing);
        assert!(!existing.contains(&id));
        assert!(id.contains('-'));
    }

    #[test]
    fn generate_returns_a_fresh_id_when_nothing_exists() {
        let id = generate(&[]);
        assert!(validate_name(&id).is_ok());
    }
}
