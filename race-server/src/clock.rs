//! ID and token generation.

use rand::distr::Alphanumeric;
use rand::Rng;

/// An opaque, unguessable mod token — not derived from the participant id.
pub fn new_mod_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mod_tokens_are_unique_and_bounded() {
        let a = new_mod_token();
        let b = new_mod_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 40);
        assert!(a.len() <= race_contracts::limits::MAX_TOKEN_LEN);
    }
}
