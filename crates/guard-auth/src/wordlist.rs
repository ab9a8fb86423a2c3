//! Recovery-phrase vocabulary
//!
//! Short, common, unambiguous words. Phrase entropy comes from the word
//! count, not the vocabulary size.

pub const WORDLIST: &[&str] = &[
    "acid", "acorn", "alarm", "amber", "anchor", "apple", "arrow", "aspen",
    "atlas", "autumn", "badge", "bamboo", "barrel", "basket", "beacon", "berry",
    "birch", "blade", "bloom", "bolt", "border", "bottle", "branch", "breeze",
    "brick", "bridge", "bronze", "bucket", "butter", "cabin", "cable", "candle",
    "canyon", "carbon", "castle", "cedar", "chalk", "cherry", "circle", "claw",
    "cliff", "clover", "cobalt", "comet", "copper", "coral", "cotton", "cradle",
    "crane", "crater", "crystal", "dagger", "daisy", "dawn", "delta", "desert",
    "diamond", "dune", "eagle", "ember", "fable", "falcon", "feather", "fern",
    "field", "flame", "flint", "forest", "fossil", "fountain", "frost", "galaxy",
    "garden", "garnet", "geyser", "ginger", "glacier", "globe", "grain", "granite",
    "grove", "harbor", "hazel", "hollow", "honey", "horizon", "island", "ivory",
    "jade", "jasper", "jungle", "kernel", "lagoon", "lantern", "ledge", "lemon",
    "lily", "linen", "lunar", "magnet", "maple", "marble", "meadow", "mesa",
    "mint", "mirror", "molten", "morning", "mosaic", "moss", "mountain", "nectar",
    "needle", "north", "oasis", "ocean", "olive", "onyx", "orchard", "osprey",
    "otter", "pearl", "pebble", "pepper", "pine", "planet", "plume", "pond",
    "poppy", "prairie", "prism", "quartz", "quill", "raven", "reef", "ridge",
    "river", "rocket", "rustic", "saddle", "sage", "sand", "sapphire", "shadow",
    "shell", "silver", "slate", "snow", "spark", "spruce", "stone", "storm",
    "summit", "sunset", "thistle", "thunder", "timber", "torch", "trail", "tulip",
    "tundra", "valley", "velvet", "violet", "walnut", "wave", "willow", "winter",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn words_are_lowercase_and_unique() {
        let unique: HashSet<&str> = WORDLIST.iter().copied().collect();
        assert_eq!(unique.len(), WORDLIST.len());
        for word in WORDLIST {
            assert!(word.chars().all(|c| c.is_ascii_lowercase()), "{word:?}");
        }
    }
}
