//! Shareable workspace codes.

use rand::distributions::Alphanumeric;
use rand::Rng;

use legalflow_core::TeamCode;

pub const PREFIX: &str = "TEAM-";
pub const SUFFIX_LEN: usize = 7;

/// `TEAM-` followed by seven upper-case alphanumerics, e.g. `TEAM-K3X9Q2M`.
pub fn generate() -> TeamCode {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    TeamCode(format!("{PREFIX}{suffix}"))
}

/// Normalise a code typed by a user. Case is ignored; codes from older
/// clients may carry a shorter suffix.
pub fn parse(input: &str) -> Option<TeamCode> {
    let upper = input.trim().to_ascii_uppercase();
    let suffix = upper.strip_prefix(PREFIX)?;
    let valid = (1..=SUFFIX_LEN).contains(&suffix.len())
        && suffix.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| TeamCode(upper.clone()))
}
