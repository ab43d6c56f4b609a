//! Filtering raw recognition output into a submittable challenge code.

/// Length the target page requires of a challenge code.
pub const CHALLENGE_CODE_LEN: usize = 6;

/// Character whitelist handed to the recognition backend.
pub const UPPERCASE_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Reduce raw recognized text to the candidate code: keep only uppercase
/// ASCII letters, in order, and at most the first [`CHALLENGE_CODE_LEN`].
///
/// Recognition output is noisy -- it may contain digits the whitelist did
/// not fully suppress, whitespace, or trailing newlines. Anything that is
/// not `A..=Z` is dropped before truncation.
pub fn extract_candidate(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_uppercase())
        .take(CHALLENGE_CODE_LEN)
        .collect()
}

/// Whether a candidate may be typed into the challenge input. Only codes of
/// exactly [`CHALLENGE_CODE_LEN`] letters are ever submitted; shorter output
/// means the recognition missed characters and the challenge is refreshed
/// instead.
pub fn is_submittable(candidate: &str) -> bool {
    candidate.len() == CHALLENGE_CODE_LEN && candidate.chars().all(|c| c.is_ascii_uppercase())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
