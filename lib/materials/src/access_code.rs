//! Access-code candidates.
//!
//! Codes are upper-case hex. The generator yields `max_attempts` candidates
//! of 4 random bytes (8 characters) and then `max_attempts` candidates of
//! 6 random bytes (12 characters). Callers check each candidate against the
//! active materials and give up when the sequence runs out.

/// Random bytes in a standard code.
pub const BASE_BYTES: usize = 4;
/// Random bytes in a widened code.
pub const WIDE_BYTES: usize = 6;

/// Produces access-code candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessCodeGenerator {
    max_attempts: u32,
}

impl Default for AccessCodeGenerator {
    fn default() -> Self {
        Self { max_attempts: 16 }
    }
}

impl AccessCodeGenerator {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Total candidates yielded before giving up.
    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts * 2
    }

    /// Candidates in the order they should be tried.
    pub fn candidates(&self) -> impl Iterator<Item = String> + use<> {
        let n = self.max_attempts as usize;
        std::iter::repeat_with(random_code::<BASE_BYTES>)
            .take(n)
            .chain(std::iter::repeat_with(random_code::<WIDE_BYTES>).take(n))
    }
}

fn random_code<const N: usize>() -> String {
    hex::encode_upper(rand::random::<[u8; N]>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_candidate_is_eight_upper_hex_chars() {
        let code = AccessCodeGenerator::default()
            .candidates()
            .next()
            .expect("candidate");
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn widens_after_max_attempts() {
        let lengths: Vec<usize> = AccessCodeGenerator::new(3)
            .candidates()
            .map(|c| c.len())
            .collect();
        assert_eq!(lengths, vec![8, 8, 8, 12, 12, 12]);
    }

    #[test]
    fn zero_attempts_is_clamped() {
        let generator = AccessCodeGenerator::new(0);
        assert_eq!(generator.total_attempts(), 2);
        assert_eq!(generator.candidates().count(), 2);
    }
}
