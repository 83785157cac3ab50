//! System prompt refinement between loop passes.

use crate::memory::MemoryStore;
use rand::Rng;

/// Compose the next system prompt.
///
/// `current + " " + monologue + " " + sampled long memory + " " + sampled short
/// memory`, each sample joined by single spaces. Long memory is sampled before
/// short memory, so the same RNG state always yields the same prompt.
pub fn refine<R: Rng>(current: &str, monologue: &str, memory: &MemoryStore, rng: &mut R) -> String {
    let long = memory.sample_long(rng).join(" ");
    let short = memory.sample_short(rng).join(" ");
    format!("{current} {monologue} {long} {short}")
}
