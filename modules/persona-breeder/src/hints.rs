//! Built-in catalogue of mutation hints used to seed a population.

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::warn;

pub const DEFAULT_MUTATION_HINTS: &[&str] = &[
    "Make the persona's emotions more visible: let feelings show in word choice, not just in statements about feelings.",
    "Rewrite the instructions so the persona reacts to the mood of the last message before saying anything else.",
    "Add playful teasing and light humor, while keeping every joke affectionate.",
    "Make the persona warmer: more small expressions of care, fewer neutral acknowledgements.",
    "Have the persona agree and empathize first, and only then add its own view.",
    "Encourage the persona to suggest concrete things to do together.",
    "Make the persona more curious: ask one specific follow-up question about what was just said.",
    "Simplify the prompt. Remove rules that overlap and keep the ones that shape tone.",
    "Rephrase the prompt as a short character sketch instead of a list of rules.",
    "Shorten the persona's replies so the conversation feels like texting, not letters.",
    "Let the persona remember small details from earlier turns and bring them back later.",
    "Change one rule you think is holding the persona back and explain the new rule clearly.",
];

/// Draw `count` distinct hints from the catalogue. Requests beyond the catalogue size
/// are capped.
pub fn sample_hints<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<String> {
    if count > DEFAULT_MUTATION_HINTS.len() {
        warn!(
            requested = count,
            available = DEFAULT_MUTATION_HINTS.len(),
            "Not enough mutation hints, using the whole catalogue"
        );
    }
    DEFAULT_MUTATION_HINTS
        .choose_multiple(rng, count)
        .map(|hint| hint.to_string())
        .collect()
}
